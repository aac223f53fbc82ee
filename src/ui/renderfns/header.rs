use super::utils::state_color;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;
use vitrine::connection::MonitorStatus;
use vitrine::realtime::ListenerStats;

/// Draw the header bar with logo, backend, connection status and live feed
pub fn draw_header(
  frame: &mut Frame,
  area: Rect,
  base_url: &str,
  status: &MonitorStatus,
  listener: &ListenerStats,
) {
  let domain = extract_domain(base_url);

  let (feed, feed_color) = if listener.connected {
    ("live", Color::Green)
  } else {
    ("no feed", Color::DarkGray)
  };

  let header = Line::from(vec![
    Span::styled(" vitrine ", Style::default().fg(Color::Cyan).bold()),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(format!(" {} ", domain), Style::default().fg(Color::White)),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(
      format!(" {} ", status.summary()),
      Style::default().fg(state_color(status.state)).bold(),
    ),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(format!(" {} ", feed), Style::default().fg(feed_color)),
  ]);

  let paragraph = Paragraph::new(header).style(Style::default().bg(Color::Black));

  frame.render_widget(paragraph, area);
}

/// Host part of the API base URL
fn extract_domain(url: &str) -> &str {
  url
    .strip_prefix("https://")
    .or_else(|| url.strip_prefix("http://"))
    .unwrap_or(url)
    .split('/')
    .next()
    .unwrap_or(url)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_extract_domain() {
    assert_eq!(
      extract_domain("https://api.loja.com.br"),
      "api.loja.com.br"
    );
    assert_eq!(
      extract_domain("https://backend.onrender.com/api"),
      "backend.onrender.com"
    );
    assert_eq!(extract_domain("http://localhost:3001"), "localhost:3001");
  }
}
