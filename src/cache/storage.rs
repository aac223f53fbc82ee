//! Cached collection items, kept in the local store by key hash.

use color_eyre::Result;
use serde::{Deserialize, Serialize};

use super::key::CacheKey;
use super::pages::PaginationMeta;
use super::traits::Cacheable;
use crate::store::{keys, LocalStore};

/// Items last fetched for a cache key, in server order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedList<T> {
  pub items: Vec<T>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub pagination: Option<PaginationMeta>,
}

impl<T> CachedList<T> {
  pub fn new(items: Vec<T>, pagination: Option<PaginationMeta>) -> Self {
    Self { items, pagination }
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

impl<T: Cacheable> CachedList<T> {
  pub fn find(&self, id: &str) -> Option<&T> {
    self.items.iter().find(|item| item.cache_key() == id)
  }
}

/// Stored row: the list plus the key it belongs to, so pattern
/// invalidation can find it again.
#[derive(Serialize, Deserialize)]
struct StoredList<T> {
  key: CacheKey,
  #[serde(flatten)]
  list: CachedList<T>,
}

#[derive(Deserialize)]
struct StoredKey {
  key: CacheKey,
}

pub(crate) fn store_list<T: Cacheable>(
  store: &LocalStore,
  key: &CacheKey,
  list: &CachedList<T>,
) -> Result<()> {
  #[derive(Serialize)]
  struct Borrowed<'a, T> {
    key: &'a CacheKey,
    #[serde(flatten)]
    list: &'a CachedList<T>,
  }

  store.put(&keys::query_data(&key.cache_hash()), &Borrowed { key, list })
}

pub(crate) fn load_list<T: Cacheable>(
  store: &LocalStore,
  key: &CacheKey,
) -> Result<Option<CachedList<T>>> {
  Ok(
    store
      .get::<StoredList<T>>(&keys::query_data(&key.cache_hash()))?
      .map(|stored| stored.list),
  )
}

pub(crate) fn remove_list(store: &LocalStore, key: &CacheKey) -> Result<bool> {
  store.remove(&keys::query_data(&key.cache_hash()))
}

/// Remove every stored list whose key matches `pattern`.
pub(crate) fn remove_matching(store: &LocalStore, pattern: &str) -> Result<Vec<CacheKey>> {
  let stored: Vec<(String, StoredKey)> = store.scan_prefix(keys::QUERY_DATA_PREFIX)?;
  let mut removed = Vec::new();

  for (row_key, StoredKey { key }) in stored {
    if key.matches(pattern) {
      store.remove(&row_key)?;
      removed.push(key);
    }
  }

  Ok(removed)
}
