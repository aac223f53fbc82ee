use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::buffer::Timestamped;

/// Connection health as last classified by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
  Online,
  Slow,
  Offline,
}

impl ConnectionState {
  pub fn label(&self) -> &'static str {
    match self {
      Self::Online => "online",
      Self::Slow => "slow",
      Self::Offline => "offline",
    }
  }
}

impl fmt::Display for ConnectionState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

/// What a logged connection event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
  Online,
  Offline,
  Slow,
  Timeout,
  Error,
}

impl EventKind {
  pub fn label(&self) -> &'static str {
    match self {
      Self::Online => "online",
      Self::Offline => "offline",
      Self::Slow => "slow",
      Self::Timeout => "timeout",
      Self::Error => "error",
    }
  }
}

/// One entry of the persisted connection log. Never modified once logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEvent {
  pub timestamp: DateTime<Utc>,
  #[serde(rename = "type")]
  pub kind: EventKind,
  pub message: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub details: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub response_time_ms: Option<u64>,
}

impl ConnectionEvent {
  pub fn new(timestamp: DateTime<Utc>, kind: EventKind, message: impl Into<String>) -> Self {
    Self {
      timestamp,
      kind,
      message: message.into(),
      details: None,
      response_time_ms: None,
    }
  }

  pub fn with_details(mut self, details: impl Into<String>) -> Self {
    self.details = Some(details.into());
    self
  }

  pub fn with_response_time(mut self, ms: u64) -> Self {
    self.response_time_ms = Some(ms);
    self
  }
}

impl Timestamped for ConnectionEvent {
  fn timestamp(&self) -> DateTime<Utc> {
    self.timestamp
  }
}

/// A successful probe's round-trip time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyPoint {
  pub timestamp: DateTime<Utc>,
  pub response_time_ms: u64,
  /// Local wall-clock label for charts, e.g. "14:03:22"
  pub label: String,
}

impl LatencyPoint {
  pub fn new(timestamp: DateTime<Utc>, response_time_ms: u64) -> Self {
    Self {
      timestamp,
      response_time_ms,
      label: timestamp
        .with_timezone(&chrono::Local)
        .format("%H:%M:%S")
        .to_string(),
    }
  }
}

impl Timestamped for LatencyPoint {
  fn timestamp(&self) -> DateTime<Utc> {
    self.timestamp
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_event_wire_format() {
    let ts = DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
      .unwrap()
      .with_timezone(&Utc);
    let event = ConnectionEvent::new(ts, EventKind::Slow, "Slow connection").with_response_time(6000);

    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "slow");
    assert_eq!(json["responseTimeMs"], 6000);
    assert!(json.get("details").is_none());

    let back: ConnectionEvent = serde_json::from_value(json).unwrap();
    assert_eq!(back, event);
  }
}
