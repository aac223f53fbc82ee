//! User-facing notifications.

use chrono::{DateTime, Utc};
use std::fmt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
  Info,
  Success,
  Warning,
  Error,
}

impl NotificationLevel {
  pub fn label(&self) -> &'static str {
    match self {
      Self::Info => "info",
      Self::Success => "success",
      Self::Warning => "warning",
      Self::Error => "error",
    }
  }
}

/// Follow-up offered alongside a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
  Retry,
  Reconnect,
  Dismiss,
}

impl NotificationAction {
  pub fn label(&self) -> &'static str {
    match self {
      Self::Retry => "retry",
      Self::Reconnect => "reconnect",
      Self::Dismiss => "dismiss",
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
  pub level: NotificationLevel,
  pub title: String,
  pub message: String,
  pub action: Option<NotificationAction>,
  pub created_at: DateTime<Utc>,
}

impl Notification {
  pub fn new(level: NotificationLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      level,
      title: title.into(),
      message: message.into(),
      action: None,
      created_at: Utc::now(),
    }
  }

  pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
    Self::new(NotificationLevel::Info, title, message)
  }

  pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
    Self::new(NotificationLevel::Success, title, message)
  }

  pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
    Self::new(NotificationLevel::Warning, title, message)
  }

  pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
    Self::new(NotificationLevel::Error, title, message)
  }

  pub fn with_action(mut self, action: NotificationAction) -> Self {
    self.action = Some(action);
    self
  }
}

impl fmt::Display for Notification {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.title, self.message)?;
    if let Some(action) = self.action {
      write!(f, " [{}]", action.label())?;
    }
    Ok(())
  }
}

/// Where notifications go. Delivery never fails the caller.
pub trait Notifier: Send + Sync {
  fn notify(&self, notification: Notification);
}

/// Writes notifications to the log. Used by one-shot commands.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
  fn notify(&self, notification: Notification) {
    let action = notification.action.map(|a| a.label());
    match notification.level {
      NotificationLevel::Info | NotificationLevel::Success => {
        info!(action, "{}: {}", notification.title, notification.message)
      }
      NotificationLevel::Warning => {
        warn!(action, "{}: {}", notification.title, notification.message)
      }
      NotificationLevel::Error => {
        error!(action, "{}: {}", notification.title, notification.message)
      }
    }
  }
}

/// Forwards notifications to a UI loop.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
  pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { tx }, rx)
  }
}

impl Notifier for ChannelNotifier {
  fn notify(&self, notification: Notification) {
    // Receiver gone means the UI has shut down
    let _ = self.tx.send(notification);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_display_includes_action() {
    let n = Notification::error("Falha ao carregar clientes", "HTTP 500")
      .with_action(NotificationAction::Retry);
    assert_eq!(n.to_string(), "Falha ao carregar clientes: HTTP 500 [retry]");
  }

  #[tokio::test]
  async fn test_channel_notifier_forwards() {
    let (notifier, mut rx) = ChannelNotifier::new();
    notifier.notify(Notification::success("Cache", "warmed 12 keys"));

    let received = rx.recv().await.unwrap();
    assert_eq!(received.level, NotificationLevel::Success);
    assert_eq!(received.message, "warmed 12 keys");
  }

  #[test]
  fn test_channel_notifier_ignores_closed_receiver() {
    let (notifier, rx) = ChannelNotifier::new();
    drop(rx);
    notifier.notify(Notification::info("ignored", ""));
  }
}
