//! Client-side data-access layer for the retail management backend.
//!
//! Keeps a local, staleness-aware view of remote collections (customers,
//! products, stock, sales), watches connection health against a backend
//! that may be cold-started, prefetches on navigation intent, and surfaces
//! server-pushed cache lifecycle events.

pub mod api;
mod buffer;
pub mod cache;
pub mod clock;
pub mod config;
pub mod connection;
pub mod error;
pub mod notify;
pub mod prefetch;
pub mod realtime;
pub mod session;
pub mod store;
