use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

const HINTS: [(&str, &str); 7] = [
  ("<r>", "reconnect"),
  ("<w>", "warmup"),
  ("<p>", "prefetch"),
  ("<c>", "clear log"),
  ("<l>", "clear latency"),
  ("<q>", "quit"),
  ("<Ctrl-C>", "quit"),
];

/// Draw the footer bar with key hints
pub fn draw_footer(frame: &mut Frame, area: Rect) {
  let mut spans = vec![Span::raw(" ")];

  for (i, (key, action)) in HINTS.iter().enumerate() {
    if i > 0 {
      spans.push(Span::raw("   "));
    }
    // Keys highlighted, descriptions dimmed
    spans.push(Span::styled(*key, Style::default().fg(Color::Cyan)));
    spans.push(Span::styled(
      format!(" {}", action),
      Style::default().fg(Color::DarkGray),
    ));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));

  frame.render_widget(paragraph, area);
}
