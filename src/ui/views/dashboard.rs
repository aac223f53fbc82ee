use crate::ui::renderfns::{event_kind_color, truncate};
use chrono::Local;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph, Sparkline};
use vitrine::connection::{ConnectionEvent, LatencyPoint};
use vitrine::realtime::{HistoryEntry, ListenerStats};

/// Latency samples as a sparkline, newest on the right
pub fn draw_latency(frame: &mut Frame, area: Rect, points: &[LatencyPoint]) {
  let title = match points.last() {
    Some(last) => format!(" Latency ({}ms @ {}) ", last.response_time_ms, last.label),
    None => " Latency ".to_string(),
  };
  let block = Block::default()
    .title(title)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  if points.is_empty() {
    let paragraph = Paragraph::new("No latency data yet.")
      .block(block)
      .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
    return;
  }

  // Only what fits inside the borders
  let width = area.width.saturating_sub(2) as usize;
  let skip = points.len().saturating_sub(width);
  let data: Vec<u64> = points[skip..].iter().map(|p| p.response_time_ms).collect();

  let sparkline = Sparkline::default()
    .block(block)
    .data(&data)
    .style(Style::default().fg(Color::Cyan));
  frame.render_widget(sparkline, area);
}

pub fn draw_connection_log(frame: &mut Frame, area: Rect, events: &[ConnectionEvent]) {
  let block = Block::default()
    .title(format!(" Connection log ({}) ", events.len()))
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  if events.is_empty() {
    let paragraph = Paragraph::new("No connection events.")
      .block(block)
      .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
    return;
  }

  let width = area.width.saturating_sub(2) as usize;
  let items: Vec<ListItem> = events
    .iter()
    .map(|event| {
      let mut message = event.message.clone();
      if let Some(details) = &event.details {
        message.push_str(&format!(" ({})", details));
      }
      let line = Line::from(vec![
        Span::styled(
          format!("{} ", event.timestamp.with_timezone(&Local).format("%H:%M:%S")),
          Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
          format!("{:<8}", event.kind.label()),
          Style::default().fg(event_kind_color(event.kind)),
        ),
        Span::raw(" "),
        Span::raw(truncate(&message, width.saturating_sub(18))),
      ]);
      ListItem::new(line)
    })
    .collect();

  frame.render_widget(List::new(items).block(block), area);
}

pub fn draw_cache_events(
  frame: &mut Frame,
  area: Rect,
  history: &[HistoryEntry],
  stats: &ListenerStats,
) {
  let block = Block::default()
    .title(format!(
      " Cache events ({}, {} keys invalidated) ",
      stats.events, stats.invalidated_keys
    ))
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  if history.is_empty() {
    let content = if stats.connected {
      "Waiting for server events."
    } else {
      "Not connected to the event feed."
    };
    let paragraph = Paragraph::new(content)
      .block(block)
      .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
    return;
  }

  let width = area.width.saturating_sub(2) as usize;
  let items: Vec<ListItem> = history
    .iter()
    .map(|entry| {
      let line = Line::from(vec![
        Span::styled(
          format!("{} ", entry.received_at.with_timezone(&Local).format("%H:%M:%S")),
          Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
          format!("{:<20}", entry.event.title()),
          Style::default().fg(Color::Cyan),
        ),
        Span::raw(" "),
        Span::raw(truncate(&entry.event.summary(), width.saturating_sub(30))),
      ]);
      ListItem::new(line)
    })
    .collect();

  frame.render_widget(List::new(items).block(block), area);
}
