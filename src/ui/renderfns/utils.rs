use ratatui::prelude::Color;
use vitrine::connection::{ConnectionState, EventKind};
use vitrine::notify::NotificationLevel;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Display color for the connection state; unknown until the first check
pub fn state_color(state: Option<ConnectionState>) -> Color {
  match state {
    Some(ConnectionState::Online) => Color::Green,
    Some(ConnectionState::Slow) => Color::Yellow,
    Some(ConnectionState::Offline) => Color::Red,
    None => Color::DarkGray,
  }
}

pub fn event_kind_color(kind: EventKind) -> Color {
  match kind {
    EventKind::Online => Color::Green,
    EventKind::Slow => Color::Yellow,
    EventKind::Timeout => Color::Magenta,
    EventKind::Offline | EventKind::Error => Color::Red,
  }
}

pub fn level_color(level: NotificationLevel) -> Color {
  match level {
    NotificationLevel::Info => Color::Cyan,
    NotificationLevel::Success => Color::Green,
    NotificationLevel::Warning => Color::Yellow,
    NotificationLevel::Error => Color::Red,
  }
}
