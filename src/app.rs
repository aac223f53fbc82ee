use crate::event::{Event, EventHandler};
use crate::ui;
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::collections::VecDeque;
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::info;
use vitrine::connection::{ConnectionEvent, LatencyPoint, MonitorStatus};
use vitrine::notify::Notification;
use vitrine::prefetch::{Activation, PrefetchIntent, PrefetchTrigger};
use vitrine::realtime::{HistoryEntry, ListenerStats};
use vitrine::session::{RunningSession, Session};

/// Notifications kept on screen
const RECENT_NOTIFICATIONS: usize = 5;

/// Dashboard state
pub struct App {
  session: Arc<Session>,

  /// Background tasks, stopped on drop
  running: RunningSession,

  /// Prefetch for the landing route
  prefetch: PrefetchTrigger,

  status: watch::Receiver<MonitorStatus>,

  /// Newest first
  notifications: VecDeque<Notification>,

  should_quit: bool,
}

impl App {
  pub fn new(session: Arc<Session>) -> Result<Self> {
    let running = session.start()?;
    let orchestrator = Arc::new(session.prefetcher());
    let prefetch = PrefetchTrigger::new(orchestrator, PrefetchIntent::parse("/"), Activation::BOTH);
    let status = session.monitor().subscribe();

    Ok(Self {
      session,
      running,
      prefetch,
      status,
      notifications: VecDeque::with_capacity(RECENT_NOTIFICATIONS),
      should_quit: false,
    })
  }

  pub async fn run(&mut self, notifications: mpsc::UnboundedReceiver<Notification>) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut events = EventHandler::new(Duration::from_millis(250));
    events.forward_notifications(notifications);

    self.prefetch.mount();

    // Main loop
    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      if let Some(event) = events.next().await {
        self.handle_event(event);
      }
    }

    // Cleanup terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    info!("Dashboard closed");
    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => {} // UI refresh happens automatically
      Event::Notification(notification) => self.push_notification(notification),
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Char('q') => self.should_quit = true,
      KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.should_quit = true;
      }
      KeyCode::Char('r') => self.running.reconnect(),
      KeyCode::Char('w') => {
        let session = self.session.clone();
        // Outcome arrives as notifications
        tokio::spawn(async move {
          let _ = session.warmup().await;
        });
      }
      KeyCode::Char('c') => self.session.log().clear_logs(),
      KeyCode::Char('l') => self.session.log().clear_latency_data(),
      KeyCode::Char('p') => {
        self.prefetch.signal_intent();
      }
      _ => {}
    }
  }

  fn push_notification(&mut self, notification: Notification) {
    if self.notifications.len() == RECENT_NOTIFICATIONS {
      self.notifications.pop_back();
    }
    self.notifications.push_front(notification);
  }

  // Accessors for UI

  pub fn base_url(&self) -> &str {
    self.session.config().base_url()
  }

  pub fn status(&self) -> MonitorStatus {
    self.status.borrow().clone()
  }

  pub fn connection_events(&self) -> Vec<ConnectionEvent> {
    self.session.log().logs()
  }

  pub fn latency_points(&self) -> Vec<LatencyPoint> {
    self.session.log().latency_points()
  }

  pub fn invalidation_history(&self) -> Vec<HistoryEntry> {
    self.running.listener().history()
  }

  pub fn listener_stats(&self) -> ListenerStats {
    self.running.listener().stats()
  }

  pub fn notifications(&self) -> &VecDeque<Notification> {
    &self.notifications
  }
}
