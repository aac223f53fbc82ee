//! Persisted connection event log and latency samples.

use chrono::Duration;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

use super::state::{ConnectionEvent, LatencyPoint};
use crate::buffer::{Order, RetentionBuffer};
use crate::clock::Clock;
use crate::store::{keys, LocalStore};

pub const MAX_EVENTS: usize = 100;
pub const EVENT_RETENTION_DAYS: i64 = 7;
pub const MAX_LATENCY_POINTS: usize = 50;
pub const LATENCY_RETENTION_HOURS: i64 = 24;

struct Lists {
  events: RetentionBuffer<ConnectionEvent>,
  latency: RetentionBuffer<LatencyPoint>,
}

/// Bounded, time-windowed store for connection events (newest first) and
/// latency samples (oldest first).
///
/// Age and count limits are applied on every write, and every write is
/// persisted before returning. Persistence failures are logged, not raised.
pub struct EventLog {
  lists: Mutex<Lists>,
  clock: Arc<dyn Clock>,
  store: Option<Arc<LocalStore>>,
}

impl EventLog {
  /// A log that lives only in memory.
  pub fn new(clock: Arc<dyn Clock>) -> Self {
    Self {
      lists: Mutex::new(Lists {
        events: RetentionBuffer::new(
          MAX_EVENTS,
          Some(Duration::days(EVENT_RETENTION_DAYS)),
          Order::NewestFirst,
        ),
        latency: RetentionBuffer::new(
          MAX_LATENCY_POINTS,
          Some(Duration::hours(LATENCY_RETENTION_HOURS)),
          Order::OldestFirst,
        ),
      }),
      clock,
      store: None,
    }
  }

  /// A log persisted to `store`, restored from whatever it already holds.
  pub fn persistent(store: Arc<LocalStore>, clock: Arc<dyn Clock>) -> Self {
    let mut log = Self::new(clock);
    {
      let lists = log.lists.get_mut().unwrap_or_else(|e| e.into_inner());
      match store.get::<Vec<ConnectionEvent>>(keys::EVENT_LOG) {
        Ok(Some(events)) => lists.events.restore(events),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Discarding unreadable connection log"),
      }
      match store.get::<Vec<LatencyPoint>>(keys::LATENCY_POINTS) {
        Ok(Some(points)) => lists.latency.restore(points),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Discarding unreadable latency data"),
      }
    }
    log.store = Some(store);
    log
  }

  fn lists(&self) -> MutexGuard<'_, Lists> {
    self.lists.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Prepend an event, prune by age and count, and persist.
  pub fn log_event(&self, event: ConnectionEvent) {
    let mut lists = self.lists();
    lists.events.insert(event, self.clock.now());
    self.persist(keys::EVENT_LOG, &lists.events.to_vec());
  }

  /// Events, newest first.
  pub fn logs(&self) -> Vec<ConnectionEvent> {
    self.lists().events.to_vec()
  }

  /// Append a latency sample, prune by age and count, and persist.
  pub fn add_latency_point(&self, point: LatencyPoint) {
    let mut lists = self.lists();
    lists.latency.insert(point, self.clock.now());
    self.persist(keys::LATENCY_POINTS, &lists.latency.to_vec());
  }

  /// Latency samples, oldest first.
  pub fn latency_points(&self) -> Vec<LatencyPoint> {
    self.lists().latency.to_vec()
  }

  pub fn clear_logs(&self) {
    self.lists().events.clear();
    self.erase(keys::EVENT_LOG);
  }

  pub fn clear_latency_data(&self) {
    self.lists().latency.clear();
    self.erase(keys::LATENCY_POINTS);
  }

  fn persist<T: serde::Serialize>(&self, key: &str, items: &[T]) {
    if let Some(store) = &self.store {
      if let Err(e) = store.put(key, items) {
        warn!(key, error = %e, "Failed to persist connection log");
      }
    }
  }

  fn erase(&self, key: &str) {
    if let Some(store) = &self.store {
      if let Err(e) = store.remove(key) {
        warn!(key, error = %e, "Failed to erase connection log");
      }
    }
  }
}
