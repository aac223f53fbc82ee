//! Fetch timestamps per cache key, and staleness derived from them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

use super::key::CacheKey;
use crate::clock::Clock;
use crate::store::{keys, LocalStore};

/// Default staleness threshold: five minutes.
pub const DEFAULT_STALE_TIME_MS: i64 = 300_000;

/// When a key was last fetched successfully, and how long that stays fresh.
///
/// Replaced whole on every successful fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
  pub key: CacheKey,
  pub fetched_at: DateTime<Utc>,
  pub ttl_ms: i64,
}

/// Tracks fetch age per cache key.
///
/// Never fails: persistence problems are logged and the in-memory map stays
/// authoritative. Unknown keys are stale.
pub struct AgeTracker {
  entries: RwLock<HashMap<CacheKey, CacheEntry>>,
  default_ttl: Duration,
  /// TTL overrides by first key segment
  key_ttls: HashMap<String, Duration>,
  clock: Arc<dyn Clock>,
  store: Option<Arc<LocalStore>>,
}

impl AgeTracker {
  pub fn new(clock: Arc<dyn Clock>) -> Self {
    Self {
      entries: RwLock::new(HashMap::new()),
      default_ttl: Duration::milliseconds(DEFAULT_STALE_TIME_MS),
      key_ttls: HashMap::new(),
      clock,
      store: None,
    }
  }

  pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
    self.default_ttl = ttl;
    self
  }

  /// Give every key under `root` its own threshold.
  pub fn with_key_ttl(mut self, root: impl Into<String>, ttl: Duration) -> Self {
    self.key_ttls.insert(root.into(), ttl);
    self
  }

  /// Persist entries to `store`, loading whatever it already holds.
  pub fn with_store(mut self, store: Arc<LocalStore>) -> Self {
    match store.scan_prefix::<CacheEntry>(keys::QUERY_AGE_PREFIX) {
      Ok(rows) => {
        let entries = self.entries.get_mut().unwrap_or_else(|e| e.into_inner());
        for (_, entry) in rows {
          entries.insert(entry.key.clone(), entry);
        }
      }
      Err(e) => warn!(error = %e, "Failed to load cache ages"),
    }
    self.store = Some(store);
    self
  }

  fn read(&self) -> RwLockReadGuard<'_, HashMap<CacheKey, CacheEntry>> {
    self.entries.read().unwrap_or_else(|e| e.into_inner())
  }

  fn write(&self) -> RwLockWriteGuard<'_, HashMap<CacheKey, CacheEntry>> {
    self.entries.write().unwrap_or_else(|e| e.into_inner())
  }

  /// Threshold that applies to `key` when the caller gives none.
  pub fn ttl_for(&self, key: &CacheKey) -> Duration {
    key
      .first()
      .and_then(|root| self.key_ttls.get(root))
      .copied()
      .unwrap_or(self.default_ttl)
  }

  /// Record a successful fetch of `key` now.
  pub fn record_fetch(&self, key: &CacheKey) {
    let entry = CacheEntry {
      key: key.clone(),
      fetched_at: self.clock.now(),
      ttl_ms: self.ttl_for(key).num_milliseconds(),
    };

    if let Some(store) = &self.store {
      if let Err(e) = store.put(&keys::query_age(&key.cache_hash()), &entry) {
        warn!(key = %key, error = %e, "Failed to persist cache age");
      }
    }

    self.write().insert(key.clone(), entry);
  }

  pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
    self.read().get(key).cloned()
  }

  /// Time since the last successful fetch, or `None` if never fetched.
  pub fn age(&self, key: &CacheKey) -> Option<Duration> {
    let fetched_at = self.read().get(key).map(|e| e.fetched_at)?;
    Some((self.clock.now() - fetched_at).max(Duration::zero()))
  }

  /// Whether `key` should be refetched.
  ///
  /// Stale when never fetched, or when its age is strictly greater than
  /// `threshold` (or the key's current TTL when no threshold is given).
  pub fn is_stale(&self, key: &CacheKey, threshold: Option<Duration>) -> bool {
    let Some(age) = self.age(key) else {
      return true;
    };
    age > threshold.unwrap_or_else(|| self.ttl_for(key))
  }

  /// Drop the entry for `key`. Returns whether one existed.
  pub fn forget(&self, key: &CacheKey) -> bool {
    let removed = self.write().remove(key).is_some();
    if removed {
      self.unpersist(key);
    }
    removed
  }

  /// Drop every entry whose key matches `pattern`.
  pub fn forget_matching(&self, pattern: &str) -> Vec<CacheKey> {
    let removed: Vec<CacheKey> = {
      let mut entries = self.write();
      let matching: Vec<CacheKey> = entries.keys().filter(|k| k.matches(pattern)).cloned().collect();
      for key in &matching {
        entries.remove(key);
      }
      matching
    };

    for key in &removed {
      self.unpersist(key);
    }
    removed
  }

  pub fn clear(&self) {
    self.write().clear();
    if let Some(store) = &self.store {
      if let Err(e) = store.remove_prefix(keys::QUERY_AGE_PREFIX) {
        warn!(error = %e, "Failed to clear persisted cache ages");
      }
    }
  }

  pub fn len(&self) -> usize {
    self.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.read().is_empty()
  }

  fn unpersist(&self, key: &CacheKey) {
    if let Some(store) = &self.store {
      if let Err(e) = store.remove(&keys::query_age(&key.cache_hash())) {
        warn!(key = %key, error = %e, "Failed to remove persisted cache age");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::ManualClock;

  fn tracker() -> (Arc<ManualClock>, AgeTracker) {
    let clock = Arc::new(ManualClock::default());
    let tracker = AgeTracker::new(clock.clone());
    (clock, tracker)
  }

  #[test]
  fn test_never_fetched_is_stale_without_age() {
    let (_, tracker) = tracker();
    let key = CacheKey::root("vendas");
    assert_eq!(tracker.age(&key), None);
    assert!(tracker.is_stale(&key, None));
    assert!(tracker.is_stale(&key, Some(Duration::days(365))));
  }

  #[test]
  fn test_threshold_boundary_is_strictly_greater() {
    let (clock, tracker) = tracker();
    let key = CacheKey::root("vendas");
    let threshold = Duration::milliseconds(10_000);

    tracker.record_fetch(&key);
    clock.advance(threshold);
    assert_eq!(tracker.age(&key), Some(threshold));
    assert!(!tracker.is_stale(&key, Some(threshold)));

    clock.advance(Duration::milliseconds(1));
    assert!(tracker.is_stale(&key, Some(threshold)));
  }

  #[test]
  fn test_default_threshold_is_five_minutes() {
    let (clock, tracker) = tracker();
    let key = CacheKey::root("clientes");
    tracker.record_fetch(&key);

    clock.advance(Duration::milliseconds(DEFAULT_STALE_TIME_MS));
    assert!(!tracker.is_stale(&key, None));
    clock.advance(Duration::milliseconds(1));
    assert!(tracker.is_stale(&key, None));
  }

  #[test]
  fn test_key_ttl_override() {
    let clock = Arc::new(ManualClock::default());
    let tracker = AgeTracker::new(clock.clone()).with_key_ttl("estoque", Duration::seconds(30));
    let stock = CacheKey::root("estoque").page(1);
    let sales = CacheKey::root("vendas");
    tracker.record_fetch(&stock);
    tracker.record_fetch(&sales);

    clock.advance(Duration::seconds(31));
    assert!(tracker.is_stale(&stock, None));
    assert!(!tracker.is_stale(&sales, None));
    assert_eq!(tracker.entry(&stock).unwrap().ttl_ms, 30_000);
  }

  #[test]
  fn test_changed_ttl_applies_to_existing_entries() {
    let store = Arc::new(LocalStore::in_memory().unwrap());
    let clock = Arc::new(ManualClock::default());
    let key = CacheKey::root("estoque");

    AgeTracker::new(clock.clone()).with_store(store.clone()).record_fetch(&key);
    clock.advance(Duration::seconds(90));

    let reloaded = AgeTracker::new(clock)
      .with_key_ttl("estoque", Duration::seconds(60))
      .with_store(store);
    assert_eq!(reloaded.entry(&key).unwrap().ttl_ms, 300_000);
    assert!(reloaded.is_stale(&key, None));
  }

  #[test]
  fn test_refetch_replaces_timestamp() {
    let (clock, tracker) = tracker();
    let key = CacheKey::root("vendas");
    tracker.record_fetch(&key);
    clock.advance(Duration::minutes(10));
    assert!(tracker.is_stale(&key, None));

    tracker.record_fetch(&key);
    assert_eq!(tracker.age(&key), Some(Duration::zero()));
    assert!(!tracker.is_stale(&key, None));
    assert_eq!(tracker.len(), 1);
  }

  #[test]
  fn test_forget_matching() {
    let (_, tracker) = tracker();
    let products = CacheKey::root("produtos");
    tracker.record_fetch(&products.page(1));
    tracker.record_fetch(&products.page(2));
    tracker.record_fetch(&CacheKey::root("vendas"));

    let removed = tracker.forget_matching("produtos:*");
    assert_eq!(removed.len(), 2);
    assert_eq!(tracker.len(), 1);
    assert!(tracker.is_stale(&products.page(1), None));
  }

  #[test]
  fn test_entries_survive_reload() {
    let store = Arc::new(LocalStore::in_memory().unwrap());
    let clock = Arc::new(ManualClock::default());
    let key = CacheKey::root("vendas");

    let first = AgeTracker::new(clock.clone()).with_store(store.clone());
    first.record_fetch(&key);
    clock.advance(Duration::seconds(42));

    let second = AgeTracker::new(clock.clone()).with_store(store.clone());
    assert_eq!(second.age(&key), Some(Duration::seconds(42)));

    second.forget(&key);
    let third = AgeTracker::new(clock).with_store(store);
    assert!(third.is_empty());
  }
}
