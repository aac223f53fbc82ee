//! Bounded, age-filtered list used for the connection log, latency samples
//! and invalidation history.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// Items that carry the instant they were captured.
pub(crate) trait Timestamped {
  fn timestamp(&self) -> DateTime<Utc>;
}

/// Which end new items are inserted at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Order {
  NewestFirst,
  OldestFirst,
}

/// Ring-buffer-like list that prunes by age and capacity on every insert.
#[derive(Debug, Clone)]
pub(crate) struct RetentionBuffer<T> {
  items: VecDeque<T>,
  capacity: usize,
  retention: Option<Duration>,
  order: Order,
}

impl<T: Timestamped> RetentionBuffer<T> {
  pub fn new(capacity: usize, retention: Option<Duration>, order: Order) -> Self {
    Self {
      items: VecDeque::with_capacity(capacity),
      capacity,
      retention,
      order,
    }
  }

  /// Replace contents with previously persisted items, already in buffer order.
  /// Anything past capacity is dropped from the old end.
  pub fn restore(&mut self, items: Vec<T>) {
    self.items = items.into();
    self.trim_to_capacity();
  }

  /// Insert one item, then drop anything past the retention window or capacity.
  pub fn insert(&mut self, item: T, now: DateTime<Utc>) {
    match self.order {
      Order::NewestFirst => self.items.push_front(item),
      Order::OldestFirst => self.items.push_back(item),
    }
    self.prune(now);
  }

  fn prune(&mut self, now: DateTime<Utc>) {
    if let Some(retention) = self.retention {
      let cutoff = now - retention;
      self.items.retain(|item| item.timestamp() >= cutoff);
    }
    self.trim_to_capacity();
  }

  fn trim_to_capacity(&mut self) {
    while self.items.len() > self.capacity {
      match self.order {
        Order::NewestFirst => self.items.pop_back(),
        Order::OldestFirst => self.items.pop_front(),
      };
    }
  }

  pub fn clear(&mut self) {
    self.items.clear();
  }

  pub fn iter(&self) -> impl Iterator<Item = &T> {
    self.items.iter()
  }
}

impl<T: Timestamped + Clone> RetentionBuffer<T> {
  pub fn to_vec(&self) -> Vec<T> {
    self.iter().cloned().collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug, Clone, PartialEq)]
  struct Sample(DateTime<Utc>, u32);

  impl Timestamped for Sample {
    fn timestamp(&self) -> DateTime<Utc> {
      self.0
    }
  }

  #[test]
  fn test_newest_first_drops_oldest_over_capacity() {
    let now = Utc::now();
    let mut buffer = RetentionBuffer::new(3, None, Order::NewestFirst);
    for i in 0..5 {
      buffer.insert(Sample(now, i), now);
    }
    let ids: Vec<u32> = buffer.iter().map(|s| s.1).collect();
    assert_eq!(ids, vec![4, 3, 2]);
  }

  #[test]
  fn test_oldest_first_drops_front_over_capacity() {
    let now = Utc::now();
    let mut buffer = RetentionBuffer::new(2, None, Order::OldestFirst);
    for i in 0..4 {
      buffer.insert(Sample(now, i), now);
    }
    let ids: Vec<u32> = buffer.iter().map(|s| s.1).collect();
    assert_eq!(ids, vec![2, 3]);
  }

  #[test]
  fn test_restore_trims_to_capacity() {
    let now = Utc::now();
    let mut newest_first = RetentionBuffer::new(2, None, Order::NewestFirst);
    newest_first.restore((0..5).rev().map(|i| Sample(now, i)).collect());
    let ids: Vec<u32> = newest_first.iter().map(|s| s.1).collect();
    assert_eq!(ids, vec![4, 3]);

    let mut oldest_first = RetentionBuffer::new(2, None, Order::OldestFirst);
    oldest_first.restore((0..5).map(|i| Sample(now, i)).collect());
    let ids: Vec<u32> = oldest_first.iter().map(|s| s.1).collect();
    assert_eq!(ids, vec![3, 4]);
  }

  #[test]
  fn test_retention_applies_on_insert() {
    let now = Utc::now();
    let mut buffer = RetentionBuffer::new(10, Some(Duration::hours(1)), Order::OldestFirst);
    buffer.insert(Sample(now - Duration::hours(2), 1), now);
    assert_eq!(buffer.iter().count(), 0);

    buffer.insert(Sample(now, 2), now);
    let later = now + Duration::minutes(61);
    buffer.insert(Sample(later, 3), later);
    let ids: Vec<u32> = buffer.iter().map(|s| s.1).collect();
    assert_eq!(ids, vec![3]);
  }
}
