//! Namespaced keys in the local store.

/// Persisted connection event log.
pub const EVENT_LOG: &str = "connection-monitor:logs";
/// Persisted latency samples.
pub const LATENCY_POINTS: &str = "connection-monitor:latency";
/// Stored access credential; gates the wake probe.
pub const ACCESS_TOKEN: &str = "auth:access-token";

pub const QUERY_AGE_PREFIX: &str = "query-age:";
pub const QUERY_DATA_PREFIX: &str = "query-data:";
pub const PAGE_LIMIT_PREFIX: &str = "pagination-limit:";

/// Fetch timestamp for a cache key, by the key's storage hash.
pub fn query_age(hash: &str) -> String {
  format!("{}{}", QUERY_AGE_PREFIX, hash)
}

/// Cached items for a cache key, by the key's storage hash.
pub fn query_data(hash: &str) -> String {
  format!("{}{}", QUERY_DATA_PREFIX, hash)
}

/// Page size preference for an entity.
pub fn page_limit(entity: &str) -> String {
  format!("{}{}", PAGE_LIMIT_PREFIX, entity)
}
