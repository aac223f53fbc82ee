use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::notify::{Notification, NotificationLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
  HitRateDrop,
  MemoryHigh,
}

/// Server-pushed cache lifecycle change.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum InvalidationEvent {
  CacheCleared {
    #[serde(default)]
    message: Option<String>,
  },
  CacheWarmed {
    #[serde(rename = "warmedCount")]
    warmed_count: u64,
  },
  ConfigUpdated {
    endpoint: String,
  },
  PatternInvalidated {
    count: u64,
    pattern: String,
  },
  PerformanceAlert {
    #[serde(rename = "type")]
    alert: AlertKind,
    #[serde(rename = "hitRate", default)]
    hit_rate: Option<f64>,
    #[serde(rename = "cacheSize", default)]
    cache_size: Option<u64>,
  },
}

/// Broadcast frames carry `type: "broadcast"` next to `event`; `type` only
/// names the event when `event` is absent.
#[derive(Deserialize)]
struct Envelope {
  event: Option<String>,
  #[serde(rename = "type")]
  kind: Option<String>,
  #[serde(default)]
  payload: Value,
}

impl InvalidationEvent {
  /// Decode one text frame. Malformed frames and unknown kinds yield `None`.
  pub fn decode(text: &str) -> Option<Self> {
    let envelope: Envelope = match serde_json::from_str(text) {
      Ok(envelope) => envelope,
      Err(e) => {
        debug!(error = %e, "Ignoring malformed realtime frame");
        return None;
      }
    };

    let Some(name) = envelope.event.or(envelope.kind) else {
      debug!("Ignoring realtime frame without an event name");
      return None;
    };
    let payload = match envelope.payload {
      Value::Null => Value::Object(Default::default()),
      other => other,
    };
    let tagged = serde_json::json!({ "event": name, "payload": payload });

    match serde_json::from_value(tagged) {
      Ok(event) => Some(event),
      Err(e) => {
        debug!(kind = %name, error = %e, "Ignoring unrecognized realtime event");
        None
      }
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      Self::CacheCleared { .. } => "cache_cleared",
      Self::CacheWarmed { .. } => "cache_warmed",
      Self::ConfigUpdated { .. } => "config_updated",
      Self::PatternInvalidated { .. } => "pattern_invalidated",
      Self::PerformanceAlert { .. } => "performance_alert",
    }
  }

  pub fn level(&self) -> NotificationLevel {
    match self {
      Self::CacheWarmed { .. } => NotificationLevel::Success,
      Self::PerformanceAlert { .. } => NotificationLevel::Warning,
      _ => NotificationLevel::Info,
    }
  }

  pub fn title(&self) -> &'static str {
    match self {
      Self::CacheCleared { .. } => "Cache cleared",
      Self::CacheWarmed { .. } => "Cache warmed",
      Self::ConfigUpdated { .. } => "Cache config updated",
      Self::PatternInvalidated { .. } => "Cache invalidated",
      Self::PerformanceAlert { .. } => "Cache performance alert",
    }
  }

  pub fn summary(&self) -> String {
    match self {
      Self::CacheCleared { message: Some(message) } => message.clone(),
      Self::CacheCleared { message: None } => "The server cache was cleared".to_string(),
      Self::CacheWarmed { warmed_count } => format!("{} endpoints warmed", warmed_count),
      Self::ConfigUpdated { endpoint } => format!("Cache settings changed for {}", endpoint),
      Self::PatternInvalidated { count, pattern } => {
        format!("{} keys invalidated matching {}", count, pattern)
      }
      Self::PerformanceAlert {
        alert: AlertKind::HitRateDrop,
        hit_rate,
        ..
      } => match hit_rate {
        Some(rate) => format!("Hit rate dropped to {:.1}%", rate),
        None => "Hit rate dropped".to_string(),
      },
      Self::PerformanceAlert {
        alert: AlertKind::MemoryHigh,
        cache_size,
        ..
      } => match cache_size {
        Some(size) => format!("Cache memory usage is high ({} keys)", size),
        None => "Cache memory usage is high".to_string(),
      },
    }
  }

  /// Keys the server reports as invalidated by this event.
  pub fn invalidated_keys(&self) -> u64 {
    match self {
      Self::PatternInvalidated { count, .. } => *count,
      _ => 0,
    }
  }

  pub fn to_notification(&self) -> Notification {
    Notification::new(self.level(), self.title(), self.summary())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_decode_each_kind() {
    assert_eq!(
      InvalidationEvent::decode(r#"{"event":"cache_cleared"}"#),
      Some(InvalidationEvent::CacheCleared { message: None })
    );
    assert_eq!(
      InvalidationEvent::decode(r#"{"event":"cache_warmed","payload":{"warmedCount":8}}"#),
      Some(InvalidationEvent::CacheWarmed { warmed_count: 8 })
    );
    assert_eq!(
      InvalidationEvent::decode(r#"{"event":"config_updated","payload":{"endpoint":"/produtos"}}"#),
      Some(InvalidationEvent::ConfigUpdated {
        endpoint: "/produtos".into()
      })
    );
    assert_eq!(
      InvalidationEvent::decode(
        r#"{"type":"performance_alert","payload":{"type":"hit_rate_drop","hitRate":42.5}}"#
      ),
      Some(InvalidationEvent::PerformanceAlert {
        alert: AlertKind::HitRateDrop,
        hit_rate: Some(42.5),
        cache_size: None,
      })
    );
  }

  #[test]
  fn test_broadcast_frame_uses_event_name() {
    assert_eq!(
      InvalidationEvent::decode(
        r#"{"type":"broadcast","event":"pattern_invalidated","payload":{"count":12,"pattern":"produtos:*"}}"#
      ),
      Some(InvalidationEvent::PatternInvalidated {
        count: 12,
        pattern: "produtos:*".into(),
      })
    );
    assert_eq!(InvalidationEvent::decode(r#"{"payload":{}}"#), None);
  }

  #[test]
  fn test_unknown_and_malformed_frames_are_ignored() {
    assert_eq!(InvalidationEvent::decode("not json"), None);
    assert_eq!(InvalidationEvent::decode(r#"{"event":"cache_exploded"}"#), None);
    assert_eq!(
      InvalidationEvent::decode(r#"{"event":"pattern_invalidated","payload":{"count":"x"}}"#),
      None
    );
  }

  #[test]
  fn test_pattern_summary() {
    let event = InvalidationEvent::PatternInvalidated {
      count: 12,
      pattern: "produtos:*".into(),
    };
    assert_eq!(event.summary(), "12 keys invalidated matching produtos:*");
    assert_eq!(event.invalidated_keys(), 12);
    assert_eq!(event.level(), NotificationLevel::Info);
  }
}
