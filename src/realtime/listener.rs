use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::events::InvalidationEvent;
use super::transport::{Backoff, ChannelSource};
use crate::buffer::{Order, RetentionBuffer, Timestamped};
use crate::clock::Clock;
use crate::config::RealtimeConfig;
use crate::error::RealtimeError;
use crate::notify::Notifier;

/// One received event with its capture time.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
  pub received_at: DateTime<Utc>,
  pub event: InvalidationEvent,
}

impl Timestamped for HistoryEntry {
  fn timestamp(&self) -> DateTime<Utc> {
    self.received_at
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListenerStats {
  pub connected: bool,
  pub events: u64,
  pub by_kind: BTreeMap<&'static str, u64>,
  /// Sum of `count` over pattern invalidations
  pub invalidated_keys: u64,
  pub ignored_frames: u64,
  pub disconnects: u64,
  pub last_event_at: Option<DateTime<Utc>>,
}

/// Messages from the reader task to the dispatch loop.
#[derive(Debug)]
enum Inbound {
  Connected,
  Frame(String),
  Disconnected(String),
}

/// Surfaces server cache lifecycle events as notifications and an in-session
/// history. It never touches local cache state.
pub struct InvalidationListener {
  notifier: Arc<dyn Notifier>,
  clock: Arc<dyn Clock>,
  history: Mutex<RetentionBuffer<HistoryEntry>>,
  stats: Mutex<ListenerStats>,
}

impl InvalidationListener {
  pub fn new(notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>, history_capacity: usize) -> Self {
    Self {
      notifier,
      clock,
      history: Mutex::new(RetentionBuffer::new(
        history_capacity,
        None,
        Order::NewestFirst,
      )),
      stats: Mutex::new(ListenerStats::default()),
    }
  }

  /// Notify about `event` and append it to the history.
  pub fn dispatch(&self, event: InvalidationEvent) {
    let now = self.clock.now();
    info!(kind = event.kind(), "{}", event.summary());
    self.notifier.notify(event.to_notification());

    {
      let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
      stats.events += 1;
      *stats.by_kind.entry(event.kind()).or_default() += 1;
      stats.invalidated_keys += event.invalidated_keys();
      stats.last_event_at = Some(now);
    }

    self
      .history
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .insert(
        HistoryEntry {
          received_at: now,
          event,
        },
        now,
      );
  }

  /// Decode and dispatch one raw frame. Returns whether it was recognized.
  pub fn handle_frame(&self, text: &str) -> bool {
    match InvalidationEvent::decode(text) {
      Some(event) => {
        self.dispatch(event);
        true
      }
      None => {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).ignored_frames += 1;
        false
      }
    }
  }

  /// Received events, newest first.
  pub fn history(&self) -> Vec<HistoryEntry> {
    self
      .history
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .to_vec()
  }

  pub fn stats(&self) -> ListenerStats {
    self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }

  fn set_connected(&self, connected: bool) {
    let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
    if stats.connected && !connected {
      stats.disconnects += 1;
    }
    stats.connected = connected;
  }

  /// Subscribe through `source` until the returned handle is dropped.
  ///
  /// A reader task owns the connection and reconnects with backoff; frames
  /// are handed to a single dispatch loop over a channel.
  pub fn spawn(self: &Arc<Self>, source: Arc<dyn ChannelSource>, config: &RealtimeConfig) -> ListenerHandle {
    let (tx, mut rx) = mpsc::channel(64);
    let backoff = Backoff::new(config.reconnect.clone());
    let reader = tokio::spawn(read_frames(source, backoff, tx));

    let listener = Arc::clone(self);
    let dispatcher = tokio::spawn(async move {
      while let Some(message) = rx.recv().await {
        match message {
          Inbound::Connected => {
            info!("Realtime channel connected");
            listener.set_connected(true);
          }
          Inbound::Frame(text) => {
            listener.handle_frame(&text);
          }
          Inbound::Disconnected(reason) => {
            warn!(reason = %reason, "Realtime channel disconnected");
            listener.set_connected(false);
          }
        }
      }
      debug!("Realtime dispatch loop stopped");
    });

    ListenerHandle { reader, dispatcher }
  }
}

async fn read_frames(source: Arc<dyn ChannelSource>, mut backoff: Backoff, tx: mpsc::Sender<Inbound>) {
  loop {
    let reason = match source.connect().await {
      Ok(mut frames) => {
        if tx.send(Inbound::Connected).await.is_err() {
          return;
        }
        backoff.reset();

        let mut reason = RealtimeError::Closed.to_string();
        while let Some(frame) = frames.next().await {
          match frame {
            Ok(text) => {
              if tx.send(Inbound::Frame(text)).await.is_err() {
                return;
              }
            }
            Err(e) => {
              reason = e.to_string();
              break;
            }
          }
        }
        reason
      }
      Err(e) => e.to_string(),
    };

    if tx.send(Inbound::Disconnected(reason)).await.is_err() {
      return;
    }
    tokio::time::sleep(backoff.next_delay()).await;
  }
}

/// Running subscription. Dropping it unsubscribes.
pub struct ListenerHandle {
  reader: JoinHandle<()>,
  dispatcher: JoinHandle<()>,
}

impl ListenerHandle {
  pub async fn shutdown(mut self) {
    self.reader.abort();
    self.dispatcher.abort();
    let _ = (&mut self.reader).await;
    let _ = (&mut self.dispatcher).await;
  }
}

impl Drop for ListenerHandle {
  fn drop(&mut self) {
    self.reader.abort();
    self.dispatcher.abort();
  }
}
