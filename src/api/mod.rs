mod cached_client;
mod client;
mod collections;
mod types;

pub use cached_client::CachedRetailClient;
pub use client::RetailClient;
pub use collections::Collection;
pub use types::{
  Category, Customer, Entity, FailedEndpoint, Product, RedisStats, Sale, StockItem, Supplier,
  WarmupReport,
};
