//! Periodic health probing and connection classification.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::log::EventLog;
use super::state::{ConnectionEvent, ConnectionState, EventKind, LatencyPoint};
use crate::clock::Clock;
use crate::config::MonitorConfig;
use crate::error::ProbeError;

/// Requests used to assess reachability and latency.
pub trait HealthProbe: Send + Sync + 'static {
  /// Cheap authenticated request against a known collection endpoint.
  fn check(&self, timeout: Duration) -> BoxFuture<'_, Result<(), ProbeError>>;

  /// Lightweight unauthenticated request that wakes a cold backend.
  fn wake(&self, timeout: Duration) -> BoxFuture<'_, Result<(), ProbeError>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
  pub interval: Duration,
  pub probe_timeout: Duration,
  pub wake_timeout: Duration,
  pub slow_threshold: Duration,
}

impl Default for MonitorSettings {
  fn default() -> Self {
    Self::from(&MonitorConfig::default())
  }
}

impl From<&MonitorConfig> for MonitorSettings {
  fn from(config: &MonitorConfig) -> Self {
    Self {
      interval: config.interval(),
      probe_timeout: config.probe_timeout(),
      wake_timeout: config.wake_timeout(),
      slow_threshold: config.slow_threshold(),
    }
  }
}

/// Latest classification, for display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorStatus {
  /// `None` until the first check completes
  pub state: Option<ConnectionState>,
  pub response_time_ms: Option<u64>,
  pub last_checked: Option<DateTime<Utc>>,
  pub last_error: Option<String>,
}

impl MonitorStatus {
  pub fn is_offline(&self) -> bool {
    self.state == Some(ConnectionState::Offline)
  }

  /// Human-readable one-liner.
  pub fn summary(&self) -> String {
    match (self.state, self.response_time_ms) {
      (None, _) => "Checking connection...".to_string(),
      (Some(ConnectionState::Online), Some(ms)) => format!("Connected ({}ms)", ms),
      (Some(ConnectionState::Online), None) => "Connected".to_string(),
      (Some(ConnectionState::Slow), Some(ms)) => format!("Slow connection ({}ms)", ms),
      (Some(ConnectionState::Slow), None) => "Slow connection".to_string(),
      (Some(ConnectionState::Offline), _) => match &self.last_error {
        Some(error) => format!("Offline: {}", error),
        None => "Offline".to_string(),
      },
    }
  }
}

/// What the one-shot wake call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeOutcome {
  /// No stored credential, nothing sent
  NoCredential,
  /// Already fired this session
  AlreadyFired,
  Awake { response_time_ms: u64 },
  Failed(ProbeError),
}

/// What one probe observed.
enum Observation {
  Reachable { elapsed: Duration },
  Failed(ProbeError),
}

/// Classifies connection health from periodic probes.
///
/// Sole writer of the connection state and of latency samples. A connection
/// event is logged only when the classified state differs from the last
/// logged one; every successful probe adds a latency sample.
pub struct ConnectionMonitor {
  probe: Arc<dyn HealthProbe>,
  log: Arc<EventLog>,
  clock: Arc<dyn Clock>,
  settings: MonitorSettings,
  status: watch::Sender<MonitorStatus>,
  /// Last state written to the event log
  recorded: Mutex<Option<ConnectionState>>,
  wake_fired: AtomicBool,
}

impl ConnectionMonitor {
  pub fn new(
    probe: Arc<dyn HealthProbe>,
    log: Arc<EventLog>,
    clock: Arc<dyn Clock>,
    settings: MonitorSettings,
  ) -> Self {
    let (status, _) = watch::channel(MonitorStatus::default());
    Self {
      probe,
      log,
      clock,
      settings,
      status,
      recorded: Mutex::new(None),
      wake_fired: AtomicBool::new(false),
    }
  }

  pub fn settings(&self) -> MonitorSettings {
    self.settings
  }

  pub fn log(&self) -> &Arc<EventLog> {
    &self.log
  }

  pub fn status(&self) -> MonitorStatus {
    self.status.borrow().clone()
  }

  pub fn state(&self) -> Option<ConnectionState> {
    self.status.borrow().state
  }

  /// Receive every status update.
  pub fn subscribe(&self) -> watch::Receiver<MonitorStatus> {
    self.status.subscribe()
  }

  /// Probe once and classify. Failures are absorbed into the returned state.
  pub async fn check_now(&self) -> ConnectionState {
    let timeout = self.settings.probe_timeout;
    let started = Instant::now();

    let observation = match tokio::time::timeout(timeout, self.probe.check(timeout)).await {
      Ok(Ok(())) => Observation::Reachable {
        elapsed: started.elapsed(),
      },
      Ok(Err(e)) => Observation::Failed(e),
      Err(_) => Observation::Failed(ProbeError::Timeout(timeout)),
    };

    let now = self.clock.now();
    let state = self.classify(&observation);

    if let Observation::Reachable { elapsed } = &observation {
      self
        .log
        .add_latency_point(LatencyPoint::new(now, elapsed.as_millis() as u64));
    }

    self.record_transition(state, &observation, now);

    self.status.send_modify(|status| {
      status.state = Some(state);
      status.last_checked = Some(now);
      match &observation {
        Observation::Reachable { elapsed } => {
          status.response_time_ms = Some(elapsed.as_millis() as u64);
          status.last_error = None;
        }
        Observation::Failed(e) => {
          status.response_time_ms = None;
          status.last_error = Some(failure_message(e).to_string());
        }
      }
    });

    state
  }

  fn classify(&self, observation: &Observation) -> ConnectionState {
    match observation {
      Observation::Reachable { elapsed } if *elapsed >= self.settings.slow_threshold => {
        ConnectionState::Slow
      }
      Observation::Reachable { .. } => ConnectionState::Online,
      Observation::Failed(_) => ConnectionState::Offline,
    }
  }

  fn record_transition(
    &self,
    state: ConnectionState,
    observation: &Observation,
    now: DateTime<Utc>,
  ) {
    let previous = {
      let mut recorded = self.recorded.lock().unwrap_or_else(|e| e.into_inner());
      if *recorded == Some(state) {
        debug!(state = %state, "Connection state unchanged");
        return;
      }
      recorded.replace(state)
    };

    let event = describe(state, previous, observation, now);
    match state {
      ConnectionState::Online => info!(previous = ?previous, "{}", event.message),
      ConnectionState::Slow | ConnectionState::Offline => {
        warn!(previous = ?previous, details = ?event.details, "{}", event.message)
      }
    }
    self.log.log_event(event);
  }

  /// Fire the wake call if a credential is present and it has not fired yet
  /// this session.
  pub async fn wake_backend(&self, has_credential: bool) -> WakeOutcome {
    if !has_credential {
      debug!("No stored credential, skipping wake call");
      return WakeOutcome::NoCredential;
    }
    if self.wake_fired.swap(true, Ordering::SeqCst) {
      return WakeOutcome::AlreadyFired;
    }

    let timeout = self.settings.wake_timeout;
    let started = Instant::now();
    match tokio::time::timeout(timeout, self.probe.wake(timeout)).await {
      Ok(Ok(())) => {
        let response_time_ms = started.elapsed().as_millis() as u64;
        info!(response_time_ms, "Backend wake call answered");
        WakeOutcome::Awake { response_time_ms }
      }
      Ok(Err(e)) => {
        warn!(error = %e, "Backend wake call failed");
        WakeOutcome::Failed(e)
      }
      Err(_) => {
        warn!(timeout_secs = timeout.as_secs(), "Backend wake call timed out");
        WakeOutcome::Failed(ProbeError::Timeout(timeout))
      }
    }
  }

  /// Run checks on a fixed interval, starting immediately.
  ///
  /// Checks run one at a time on the spawned task, including those asked
  /// for through [`MonitorHandle::request_check`].
  pub fn spawn(self: &Arc<Self>) -> MonitorHandle {
    let (commands, mut rx) = mpsc::unbounded_channel();
    let monitor = Arc::clone(self);

    let task = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(monitor.settings.interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

      loop {
        tokio::select! {
          _ = ticker.tick() => {
            monitor.check_now().await;
          }
          command = rx.recv() => match command {
            Some(MonitorCommand::CheckNow) => {
              monitor.check_now().await;
              ticker.reset();
            }
            None => break,
          },
        }
      }
      debug!("Connection monitor stopped");
    });

    MonitorHandle { commands, task }
  }
}

fn failure_message(error: &ProbeError) -> &'static str {
  match error {
    ProbeError::Timeout(_) => "Connection timed out",
    ProbeError::Network(_) => "Network failure: unable to reach the server",
    ProbeError::Unknown(_) => "Unknown error while checking the connection",
  }
}

fn describe(
  state: ConnectionState,
  previous: Option<ConnectionState>,
  observation: &Observation,
  now: DateTime<Utc>,
) -> ConnectionEvent {
  match observation {
    Observation::Reachable { elapsed } => {
      let ms = elapsed.as_millis() as u64;
      let (kind, message) = match (state, previous) {
        (ConnectionState::Slow, _) => (EventKind::Slow, format!("Slow connection detected ({}ms)", ms)),
        (_, Some(_)) => (EventKind::Online, "Connection restored".to_string()),
        (_, None) => (EventKind::Online, "Connection established".to_string()),
      };
      ConnectionEvent::new(now, kind, message).with_response_time(ms)
    }
    Observation::Failed(error) => match error {
      ProbeError::Timeout(limit) => ConnectionEvent::new(
        now,
        EventKind::Timeout,
        format!("Connection timed out after {}s", limit.as_secs()),
      ),
      ProbeError::Network(details) | ProbeError::Unknown(details) => {
        ConnectionEvent::new(now, EventKind::Error, failure_message(error)).with_details(details)
      }
    },
  }
}

enum MonitorCommand {
  CheckNow,
}

/// Running monitor task. Dropping it stops the task.
pub struct MonitorHandle {
  commands: mpsc::UnboundedSender<MonitorCommand>,
  task: JoinHandle<()>,
}

impl MonitorHandle {
  /// Ask for a check now instead of waiting for the next interval.
  pub fn request_check(&self) {
    let _ = self.commands.send(MonitorCommand::CheckNow);
  }

  pub async fn shutdown(mut self) {
    self.task.abort();
    let _ = (&mut self.task).await;
  }
}

impl Drop for MonitorHandle {
  fn drop(&mut self) {
    self.task.abort();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::SystemClock;
  use std::sync::atomic::AtomicU32;

  struct FakeProbe {
    delay: Mutex<Duration>,
    result: Mutex<Result<(), ProbeError>>,
    checks: AtomicU32,
    wakes: AtomicU32,
  }

  impl FakeProbe {
    fn new(delay_ms: u64) -> Arc<Self> {
      Arc::new(Self {
        delay: Mutex::new(Duration::from_millis(delay_ms)),
        result: Mutex::new(Ok(())),
        checks: AtomicU32::new(0),
        wakes: AtomicU32::new(0),
      })
    }

    fn respond_after(&self, delay_ms: u64) {
      *self.delay.lock().unwrap() = Duration::from_millis(delay_ms);
      *self.result.lock().unwrap() = Ok(());
    }

    fn fail_with(&self, error: ProbeError) {
      *self.delay.lock().unwrap() = Duration::from_millis(50);
      *self.result.lock().unwrap() = Err(error);
    }
  }

  impl HealthProbe for FakeProbe {
    fn check(&self, _timeout: Duration) -> BoxFuture<'_, Result<(), ProbeError>> {
      self.checks.fetch_add(1, Ordering::SeqCst);
      let delay = *self.delay.lock().unwrap();
      let result = self.result.lock().unwrap().clone();
      Box::pin(async move {
        tokio::time::sleep(delay).await;
        result
      })
    }

    fn wake(&self, _timeout: Duration) -> BoxFuture<'_, Result<(), ProbeError>> {
      self.wakes.fetch_add(1, Ordering::SeqCst);
      Box::pin(async { Ok(()) })
    }
  }

  fn monitor(probe: Arc<FakeProbe>) -> Arc<ConnectionMonitor> {
    let clock = Arc::new(SystemClock);
    let log = Arc::new(EventLog::new(clock.clone()));
    Arc::new(ConnectionMonitor::new(
      probe,
      log,
      clock,
      MonitorSettings::default(),
    ))
  }

  #[tokio::test(start_paused = true)]
  async fn test_fast_probe_is_online() {
    let monitor = monitor(FakeProbe::new(200));
    assert_eq!(monitor.check_now().await, ConnectionState::Online);

    let status = monitor.status();
    assert_eq!(status.response_time_ms, Some(200));
    assert_eq!(status.summary(), "Connected (200ms)");
    assert_eq!(monitor.log().latency_points().len(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_slow_probe_is_slow() {
    let monitor = monitor(FakeProbe::new(6000));
    assert_eq!(monitor.check_now().await, ConnectionState::Slow);

    let logs = monitor.log().logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].kind, EventKind::Slow);
    assert_eq!(logs[0].response_time_ms, Some(6000));
  }

  #[tokio::test(start_paused = true)]
  async fn test_probe_past_timeout_is_offline() {
    let monitor = monitor(FakeProbe::new(20_000));
    assert_eq!(monitor.check_now().await, ConnectionState::Offline);

    let logs = monitor.log().logs();
    assert_eq!(logs[0].kind, EventKind::Timeout);
    assert!(monitor.log().latency_points().is_empty());
    assert!(monitor.status().is_offline());
  }

  #[tokio::test(start_paused = true)]
  async fn test_network_failure_is_offline_error() {
    let probe = FakeProbe::new(0);
    probe.fail_with(ProbeError::Network("connection refused".into()));
    let monitor = monitor(probe);

    assert_eq!(monitor.check_now().await, ConnectionState::Offline);
    let logs = monitor.log().logs();
    assert_eq!(logs[0].kind, EventKind::Error);
    assert!(logs[0].message.contains("Network failure"));
    assert_eq!(logs[0].details.as_deref(), Some("connection refused"));
    assert_eq!(
      monitor.status().summary(),
      "Offline: Network failure: unable to reach the server"
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_unknown_failure_message() {
    let probe = FakeProbe::new(0);
    probe.fail_with(ProbeError::Unknown("HTTP 503".into()));
    let monitor = monitor(probe);

    monitor.check_now().await;
    assert!(monitor.log().logs()[0].message.contains("Unknown error"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_logging_is_edge_triggered() {
    let probe = FakeProbe::new(100);
    let monitor = monitor(probe.clone());

    monitor.check_now().await;
    monitor.check_now().await;
    assert_eq!(monitor.log().logs().len(), 1);

    probe.respond_after(7000);
    monitor.check_now().await;
    monitor.check_now().await;
    probe.respond_after(100);
    monitor.check_now().await;

    let logs = monitor.log().logs();
    let kinds: Vec<EventKind> = logs.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::Online, EventKind::Slow, EventKind::Online]);
    assert_eq!(logs[0].message, "Connection restored");
    assert_eq!(logs[2].message, "Connection established");
    assert_eq!(monitor.log().latency_points().len(), 5);
  }

  #[tokio::test(start_paused = true)]
  async fn test_offline_causes_do_not_relog() {
    let probe = FakeProbe::new(20_000);
    let monitor = monitor(probe.clone());

    monitor.check_now().await;
    probe.fail_with(ProbeError::Network("reset".into()));
    monitor.check_now().await;

    assert_eq!(monitor.log().logs().len(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_wake_fires_once_with_credential() {
    let probe = FakeProbe::new(0);
    let monitor = monitor(probe.clone());

    assert_eq!(monitor.wake_backend(false).await, WakeOutcome::NoCredential);
    assert_eq!(probe.wakes.load(Ordering::SeqCst), 0);

    assert!(matches!(
      monitor.wake_backend(true).await,
      WakeOutcome::Awake { .. }
    ));
    assert_eq!(monitor.wake_backend(true).await, WakeOutcome::AlreadyFired);
    assert_eq!(probe.wakes.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_spawned_monitor_checks_on_interval() {
    let probe = FakeProbe::new(200);
    let monitor = monitor(probe.clone());
    let mut updates = monitor.subscribe();

    let handle = monitor.spawn();
    updates.changed().await.unwrap();
    assert_eq!(probe.checks.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(65)).await;
    assert_eq!(probe.checks.load(Ordering::SeqCst), 3);

    handle.request_check();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(probe.checks.load(Ordering::SeqCst), 4);

    handle.shutdown().await;
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(probe.checks.load(Ordering::SeqCst), 4);
  }
}
