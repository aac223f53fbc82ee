//! Staleness-aware local cache for remote collections.
//!
//! - [`AgeTracker`] records when each key was last fetched and decides staleness
//! - [`PageFetcher`] walks paginated endpoints into a full item list
//! - [`CollectionCache`] ties both to the local store for the data-loading call sites

mod age;
mod key;
mod layer;
mod pages;
mod storage;
mod traits;

pub use age::{AgeTracker, CacheEntry, DEFAULT_STALE_TIME_MS};
pub use key::CacheKey;
pub use layer::CollectionCache;
pub use pages::{AllPages, FetchOptions, PageFetcher, PageResponse, PaginationMeta};
pub use storage::CachedList;
pub use traits::{CacheResult, CacheSource, Cacheable};
