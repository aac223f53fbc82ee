//! WebSocket source with reconnect backoff.

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::config::ReconnectConfig;
use crate::error::RealtimeError;

/// Text frames from one connection. Ends when the connection does.
pub type FrameStream = BoxStream<'static, Result<String, RealtimeError>>;

/// Something that can open a subscription to the broadcast channel.
pub trait ChannelSource: Send + Sync + 'static {
  fn connect(&self) -> BoxFuture<'_, Result<FrameStream, RealtimeError>>;
}

#[derive(Serialize)]
struct Subscribe<'a> {
  #[serde(rename = "type")]
  kind: &'static str,
  channel: &'a str,
}

pub struct WebSocketSource {
  url: String,
  channel: String,
  token: Option<String>,
}

impl WebSocketSource {
  pub fn new(url: impl Into<String>, channel: impl Into<String>, token: Option<String>) -> Self {
    Self {
      url: url.into(),
      channel: channel.into(),
      token,
    }
  }

  async fn open(&self) -> Result<FrameStream, RealtimeError> {
    let mut request = self.url.as_str().into_client_request()?;
    if let Some(token) = &self.token {
      let value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| RealtimeError::InvalidRequest(e.to_string()))?;
      request.headers_mut().insert(AUTHORIZATION, value);
    }

    let (mut stream, _) = tokio_tungstenite::connect_async(request).await?;
    let frame = serde_json::to_string(&Subscribe {
      kind: "subscribe",
      channel: &self.channel,
    })?;
    stream.send(Message::Text(frame)).await?;
    debug!(url = %self.url, channel = %self.channel, "Subscribed to realtime channel");

    let frames = stream
      .take_while(|message| futures::future::ready(!matches!(message, Ok(Message::Close(_)))))
      .filter_map(|message| async move {
        match message {
          Ok(Message::Text(text)) => Some(Ok(text)),
          Ok(_) => None,
          Err(e) => Some(Err(RealtimeError::from(e))),
        }
      });

    Ok(frames.boxed())
  }
}

impl ChannelSource for WebSocketSource {
  fn connect(&self) -> BoxFuture<'_, Result<FrameStream, RealtimeError>> {
    Box::pin(self.open())
  }
}

/// Jittered exponential reconnect delay.
#[derive(Debug, Clone)]
pub struct Backoff {
  config: ReconnectConfig,
  current_ms: u64,
}

impl Backoff {
  pub fn new(config: ReconnectConfig) -> Self {
    let current_ms = config.initial_ms;
    Self { config, current_ms }
  }

  pub fn reset(&mut self) {
    self.current_ms = self.config.initial_ms;
  }

  /// Delay before the next attempt. Grows toward `max_ms` on every call.
  pub fn next_delay(&mut self) -> Duration {
    let delay = jittered(self.current_ms, self.config.jitter_ms);
    let next = (self.current_ms as f64 * self.config.multiplier) as u64;
    self.current_ms = next.min(self.config.max_ms);
    Duration::from_millis(delay)
  }
}

fn jittered(base_ms: u64, jitter_ms: u64) -> u64 {
  if jitter_ms == 0 {
    return base_ms;
  }
  let nanos = SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_else(|_| Duration::from_nanos(0))
    .subsec_nanos() as u64;
  base_ms.saturating_add(nanos % jitter_ms)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_backoff_grows_to_max_and_resets() {
    let mut backoff = Backoff::new(ReconnectConfig {
      initial_ms: 1000,
      max_ms: 5000,
      multiplier: 2.0,
      jitter_ms: 0,
    });

    let delays: Vec<u64> = (0..5).map(|_| backoff.next_delay().as_millis() as u64).collect();
    assert_eq!(delays, vec![1000, 2000, 4000, 5000, 5000]);

    backoff.reset();
    assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
  }

  #[test]
  fn test_jitter_stays_in_range() {
    for _ in 0..20 {
      let delay = jittered(1000, 250);
      assert!((1000..1250).contains(&delay));
    }
  }

  #[test]
  fn test_subscribe_frame() {
    let frame = serde_json::to_string(&Subscribe {
      kind: "subscribe",
      channel: "cache-events-realtime",
    })
    .unwrap();
    assert_eq!(frame, r#"{"type":"subscribe","channel":"cache-events-realtime"}"#);
  }
}
