mod renderfns;
mod views;

use crate::app::App;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;
use renderfns::{draw_footer, draw_header, level_color};

/// Main draw function
pub fn draw(frame: &mut Frame, app: &App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Length(8), // Latency
      Constraint::Min(1),    // Logs
      Constraint::Length(1), // Latest notification
      Constraint::Length(1), // Footer
    ])
    .split(frame.area());

  let status = app.status();
  let stats = app.listener_stats();
  draw_header(frame, chunks[0], app.base_url(), &status, &stats);

  views::dashboard::draw_latency(frame, chunks[1], &app.latency_points());

  let columns = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
    .split(chunks[2]);
  views::dashboard::draw_connection_log(frame, columns[0], &app.connection_events());
  views::dashboard::draw_cache_events(frame, columns[1], &app.invalidation_history(), &stats);

  draw_notification_line(frame, chunks[3], app);
  draw_footer(frame, chunks[4]);
}

fn draw_notification_line(frame: &mut Frame, area: Rect, app: &App) {
  let Some(latest) = app.notifications().front() else {
    return;
  };

  let mut content = format!(" {}", latest);
  let older = app.notifications().len() - 1;
  if older > 0 {
    content.push_str(&format!("  (+{} earlier)", older));
  }

  let paragraph = Paragraph::new(content).style(Style::default().fg(level_color(latest.level)));
  frame.render_widget(paragraph, area);
}
