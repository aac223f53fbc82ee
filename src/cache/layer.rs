//! Cache layer that orchestrates caching logic with network fetching.

use color_eyre::Result;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::age::AgeTracker;
use super::key::CacheKey;
use super::pages::{FetchOptions, PageFetcher, PageResponse};
use super::storage::{self, CachedList};
use super::traits::{CacheResult, Cacheable};
use crate::error::{BoxError, LoaderError};
use crate::store::LocalStore;

/// Cache layer for the data-loading call sites.
///
/// Cache-first: fresh stored items are returned without touching the
/// network; stale or missing keys are loaded, stored and their fetch time
/// recorded. When loading fails and items are stored, those are served as
/// offline data; otherwise the [`LoaderError`] propagates.
pub struct CollectionCache {
  store: Arc<LocalStore>,
  ages: Arc<AgeTracker>,
}

impl CollectionCache {
  pub fn new(store: Arc<LocalStore>, ages: Arc<AgeTracker>) -> Self {
    Self { store, ages }
  }

  pub fn ages(&self) -> &AgeTracker {
    &self.ages
  }

  /// Load every page of a collection, walking pages with `loader`.
  pub async fn fetch_all<T, F, Fut, E>(
    &self,
    key: &CacheKey,
    options: FetchOptions,
    force: bool,
    loader: F,
  ) -> Result<CacheResult<CachedList<T>>>
  where
    T: Cacheable,
    F: FnMut(u32, u32) -> Fut,
    Fut: Future<Output = Result<PageResponse<T>, E>>,
    E: Into<BoxError>,
  {
    self
      .load_through(key, force, || async move {
        let pages = PageFetcher::new(options).fetch_all(loader).await?;
        debug!(key = %key, pages = pages.pages_fetched, items = pages.items.len(), "Loaded collection");
        Ok(CachedList::new(pages.items, pages.pagination))
      })
      .await
  }

  /// Load one page of a collection, cached under `key.page(page)`.
  pub async fn fetch_page<T, F, Fut, E>(
    &self,
    key: &CacheKey,
    page: u32,
    limit: u32,
    force: bool,
    loader: F,
  ) -> Result<CacheResult<CachedList<T>>>
  where
    T: Cacheable,
    F: FnOnce(u32, u32) -> Fut,
    Fut: Future<Output = Result<PageResponse<T>, E>>,
    E: Into<BoxError>,
  {
    let page_key = key.page(page);
    let options = FetchOptions {
      limit,
      max_pages: 1,
    };

    self
      .load_through(&page_key, force, || async move {
        let single = PageFetcher::new(options).fetch_page(page, loader).await?;
        Ok(CachedList::new(single.items, single.pagination))
      })
      .await
  }

  async fn load_through<T, F, Fut>(
    &self,
    key: &CacheKey,
    force: bool,
    fetch: F,
  ) -> Result<CacheResult<CachedList<T>>>
  where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<CachedList<T>, LoaderError>>,
  {
    let cached = storage::load_list::<T>(&self.store, key).unwrap_or_else(|e| {
      warn!(key = %key, error = %e, "Discarding unreadable cached items");
      None
    });

    if let Some(list) = &cached {
      if !force && !self.ages.is_stale(key, None) {
        if let Some(entry) = self.ages.entry(key) {
          return Ok(CacheResult::from_cache(list.clone(), entry.fetched_at, false));
        }
      }
    }

    match fetch().await {
      Ok(list) => {
        if let Err(e) = storage::store_list(&self.store, key, &list) {
          warn!(key = %key, error = %e, "Failed to persist fetched items");
        }
        self.ages.record_fetch(key);
        Ok(CacheResult::from_network(list))
      }
      Err(e) => match cached {
        Some(list) => {
          warn!(key = %key, error = %e, "Loader failed, serving cached items");
          let cached_at = self.ages.entry(key).map(|entry| entry.fetched_at);
          Ok(CacheResult::offline(list, cached_at))
        }
        None => Err(e.into()),
      },
    }
  }

  /// Stored items for `key` without loading, flagged stale or fresh.
  pub fn cached<T: Cacheable>(&self, key: &CacheKey) -> Result<Option<CacheResult<CachedList<T>>>> {
    let list = match storage::load_list::<T>(&self.store, key)? {
      Some(list) => list,
      None => return Ok(None),
    };

    Ok(self.ages.entry(key).map(|entry| {
      let stale = self.ages.is_stale(key, None);
      CacheResult::from_cache(list, entry.fetched_at, stale)
    }))
  }

  /// Find one entity by id in the items stored for `key`.
  pub fn cached_entity<T: Cacheable>(&self, key: &CacheKey, id: &str) -> Result<Option<T>> {
    Ok(
      storage::load_list::<T>(&self.store, key)?
        .and_then(|list| list.find(id).cloned()),
    )
  }

  /// Drop the stored items and fetch age for `key`.
  pub fn invalidate(&self, key: &CacheKey) -> Result<()> {
    self.ages.forget(key);
    storage::remove_list(&self.store, key)?;
    Ok(())
  }

  /// Drop every key matching `pattern`. Returns how many keys were affected.
  pub fn invalidate_matching(&self, pattern: &str) -> Result<usize> {
    let mut affected = self.ages.forget_matching(pattern);
    for key in storage::remove_matching(&self.store, pattern)? {
      if !affected.contains(&key) {
        affected.push(key);
      }
    }
    Ok(affected.len())
  }
}

impl Clone for CollectionCache {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      ages: Arc::clone(&self.ages),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheSource;
  use crate::clock::ManualClock;
  use chrono::Duration;
  use serde::{Deserialize, Serialize};
  use std::sync::atomic::{AtomicU32, Ordering};

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Sale {
    id: u32,
  }

  impl Cacheable for Sale {
    fn cache_key(&self) -> String {
      self.id.to_string()
    }

    fn entity_type() -> &'static str {
      "vendas"
    }
  }

  fn setup() -> (Arc<ManualClock>, CollectionCache) {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(LocalStore::in_memory().unwrap());
    let ages = Arc::new(AgeTracker::new(clock.clone()));
    (clock, CollectionCache::new(store, ages))
  }

  fn sales(n: u32) -> Vec<Sale> {
    (1..=n).map(|id| Sale { id }).collect()
  }

  async fn load(
    cache: &CollectionCache,
    calls: &AtomicU32,
    fail: bool,
  ) -> Result<CacheResult<CachedList<Sale>>> {
    cache
      .fetch_all(
        &CacheKey::root("vendas"),
        FetchOptions::default(),
        false,
        |_, _| {
          calls.fetch_add(1, Ordering::SeqCst);
          async move {
            if fail {
              Err("backend unavailable".to_string())
            } else {
              Ok(PageResponse::Items(sales(3)))
            }
          }
        },
      )
      .await
  }

  #[derive(Debug, Clone, PartialEq, Deserialize)]
  struct Unencodable {
    id: u32,
  }

  impl Serialize for Unencodable {
    fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
      Err(serde::ser::Error::custom("cannot encode"))
    }
  }

  impl Cacheable for Unencodable {
    fn cache_key(&self) -> String {
      self.id.to_string()
    }

    fn entity_type() -> &'static str {
      "estoque"
    }
  }

  #[tokio::test]
  async fn test_fetched_items_returned_when_storing_fails() {
    let (_, cache) = setup();
    let key = CacheKey::root("estoque");

    let result = cache
      .fetch_all(&key, FetchOptions::default(), false, |_, _| async {
        Ok::<_, String>(PageResponse::Items(vec![Unencodable { id: 7 }]))
      })
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data.items, vec![Unencodable { id: 7 }]);
    assert!(cache.ages().age(&key).is_some());
  }

  #[tokio::test]
  async fn test_fresh_cache_skips_loader() {
    let (_, cache) = setup();
    let calls = AtomicU32::new(0);

    let first = load(&cache, &calls, false).await.unwrap();
    assert_eq!(first.source, CacheSource::Network);
    assert_eq!(first.data.len(), 3);

    let second = load(&cache, &calls, false).await.unwrap();
    assert_eq!(second.source, CacheSource::CacheFresh);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_stale_cache_refetches() {
    let (clock, cache) = setup();
    let calls = AtomicU32::new(0);

    load(&cache, &calls, false).await.unwrap();
    clock.advance(Duration::minutes(6));

    let refreshed = load(&cache, &calls, false).await.unwrap();
    assert_eq!(refreshed.source, CacheSource::Network);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_loader_failure_falls_back_to_cached_items() {
    let (clock, cache) = setup();
    let calls = AtomicU32::new(0);

    load(&cache, &calls, false).await.unwrap();
    clock.advance(Duration::minutes(6));

    let fallback = load(&cache, &calls, true).await.unwrap();
    assert_eq!(fallback.source, CacheSource::Offline);
    assert_eq!(fallback.data.items, sales(3));
    assert!(fallback.cached_at.is_some());
  }

  #[tokio::test]
  async fn test_loader_failure_without_cache_propagates() {
    let (_, cache) = setup();
    let calls = AtomicU32::new(0);

    let err = load(&cache, &calls, true).await.unwrap_err();
    let loader = err.downcast_ref::<LoaderError>().unwrap();
    assert_eq!(loader.page, 1);
  }

  #[tokio::test]
  async fn test_fetch_page_uses_page_key() {
    let (_, cache) = setup();
    let root = CacheKey::root("vendas");

    let result = cache
      .fetch_page(&root, 2, 25, false, |page, limit| async move {
        assert_eq!((page, limit), (2, 25));
        Ok::<_, String>(PageResponse::Items(sales(2)))
      })
      .await
      .unwrap();

    assert_eq!(result.data.len(), 2);
    assert!(cache.cached::<Sale>(&root).unwrap().is_none());
    let cached = cache.cached::<Sale>(&root.page(2)).unwrap().unwrap();
    assert_eq!(cached.source, CacheSource::CacheFresh);
  }

  #[tokio::test]
  async fn test_invalidate_matching_forces_reload() {
    let (_, cache) = setup();
    let calls = AtomicU32::new(0);
    load(&cache, &calls, false).await.unwrap();

    assert_eq!(
      cache.cached_entity::<Sale>(&CacheKey::root("vendas"), "2").unwrap(),
      Some(Sale { id: 2 })
    );
    assert_eq!(cache.invalidate_matching("vendas*").unwrap(), 1);
    assert!(cache.cached::<Sale>(&CacheKey::root("vendas")).unwrap().is_none());

    load(&cache, &calls, false).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }
}
