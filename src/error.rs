//! Typed failures for probes, page walks, the REST client and the realtime
//! transport.
//!
//! Everything else in the crate reports through `color_eyre::Result`.

use std::time::Duration;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a health probe failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
  #[error("probe timed out after {}ms", .0.as_millis())]
  Timeout(Duration),
  #[error("network failure: {0}")]
  Network(String),
  #[error("unknown error: {0}")]
  Unknown(String),
}

/// A paginated walk was aborted because the loader failed.
///
/// Items accumulated from earlier pages are discarded.
#[derive(Debug, Error)]
#[error("failed to load page {page}: {source}")]
pub struct LoaderError {
  pub page: u32,
  pub source: BoxError,
}

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("HTTP error: {0}")]
  Http(#[from] reqwest::Error),
  #[error("{method} {path} returned HTTP {status}")]
  Status {
    method: &'static str,
    path: String,
    status: u16,
  },
  #[error("Failed to create HTTP client: {0}")]
  Config(String),
}

#[derive(Debug, Error)]
pub enum RealtimeError {
  #[error("websocket error: {0}")]
  WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
  #[error("failed to encode subscribe frame: {0}")]
  Encode(#[from] serde_json::Error),
  #[error("invalid realtime request: {0}")]
  InvalidRequest(String),
  #[error("realtime channel closed by server")]
  Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for RealtimeError {
  fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
    Self::WebSocket(Box::new(err))
  }
}
