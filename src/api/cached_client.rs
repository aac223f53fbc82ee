//! Retail client with transparent, staleness-aware caching.

use color_eyre::Result;
use std::sync::Arc;

use super::client::RetailClient;
use super::collections::Collection;
use super::types::{Category, Customer, Entity, Product, Sale, StockItem, Supplier};
use crate::cache::{CacheResult, CachedList, CollectionCache, FetchOptions};
use crate::store::LocalStore;

/// Wraps [`RetailClient`] with the collection cache.
///
/// Page size per collection comes from the stored preference, so changing
/// it takes effect on the next load.
#[derive(Clone)]
pub struct CachedRetailClient {
  inner: RetailClient,
  cache: CollectionCache,
  store: Arc<LocalStore>,
  max_pages: u32,
}

impl CachedRetailClient {
  pub fn new(inner: RetailClient, cache: CollectionCache, store: Arc<LocalStore>, max_pages: u32) -> Self {
    Self {
      inner,
      cache,
      store,
      max_pages,
    }
  }

  pub fn inner(&self) -> &RetailClient {
    &self.inner
  }

  pub fn cache(&self) -> &CollectionCache {
    &self.cache
  }

  fn limit_for(&self, collection: Collection) -> u32 {
    self.store.page_size(collection.name()).get()
  }

  /// Every item of `T`'s collection, walking all pages when stale.
  pub async fn list_all<T: Entity>(&self, force: bool) -> Result<CacheResult<CachedList<T>>> {
    let collection = T::COLLECTION;
    let options = FetchOptions {
      limit: self.limit_for(collection),
      max_pages: self.max_pages,
    };

    self
      .cache
      .fetch_all(&collection.cache_key(), options, force, |page, limit| {
        let inner = self.inner.clone();
        async move { inner.list_page::<T>(collection, page, limit).await }
      })
      .await
  }

  /// One page of `T`'s collection.
  pub async fn list_page<T: Entity>(&self, page: u32, force: bool) -> Result<CacheResult<CachedList<T>>> {
    let collection = T::COLLECTION;
    let limit = self.limit_for(collection);

    self
      .cache
      .fetch_page(&collection.cache_key(), page, limit, force, |page, limit| {
        let inner = self.inner.clone();
        async move { inner.list_page::<T>(collection, page, limit).await }
      })
      .await
  }

  /// Load a whole collection by name. Returns the item count and source.
  pub async fn load(&self, collection: Collection, force: bool) -> Result<CacheResult<usize>> {
    let result = match collection {
      Collection::Customers => self.list_all::<Customer>(force).await?.map(|l| l.len()),
      Collection::Products => self.list_all::<Product>(force).await?.map(|l| l.len()),
      Collection::Stock => self.list_all::<StockItem>(force).await?.map(|l| l.len()),
      Collection::Sales => self.list_all::<Sale>(force).await?.map(|l| l.len()),
      Collection::Categories => self.list_all::<Category>(force).await?.map(|l| l.len()),
      Collection::Suppliers => self.list_all::<Supplier>(force).await?.map(|l| l.len()),
    };
    Ok(result)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::AgeTracker;
  use crate::clock::SystemClock;
  use crate::config::Config;
  use crate::store::PageSize;

  #[test]
  fn test_limit_follows_stored_preference() {
    let config = Config::from_yaml("api:\n  base_url: http://localhost:3000\n").unwrap();
    let store = Arc::new(LocalStore::in_memory().unwrap());
    let ages = Arc::new(AgeTracker::new(Arc::new(SystemClock)));
    let client = CachedRetailClient::new(
      RetailClient::new(&config, None).unwrap(),
      CollectionCache::new(store.clone(), ages),
      store.clone(),
      config.pagination.max_pages,
    );

    assert_eq!(client.limit_for(Collection::Sales), 50);
    store.set_page_size("vendas", PageSize::OneHundred).unwrap();
    assert_eq!(client.limit_for(Collection::Sales), 100);
    assert_eq!(client.limit_for(Collection::Customers), 50);
  }
}
