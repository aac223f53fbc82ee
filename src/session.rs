//! Per-session context.
//!
//! Built once and shared by `Arc`. Session-wide state (connection status,
//! fetch ages, the event log, the wake flag) lives here and is handed to the
//! components that need it.

use chrono::Duration;
use color_eyre::Result;
use futures::FutureExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{CachedRetailClient, Collection, RedisStats, RetailClient, WarmupReport};
use crate::cache::{AgeTracker, CollectionCache};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::connection::{
  ConnectionMonitor, ConnectionState, EventLog, HealthProbe, MonitorHandle, MonitorSettings,
  WakeOutcome,
};
use crate::notify::{Notification, NotificationAction, Notifier};
use crate::prefetch::{LoaderFn, PrefetchOrchestrator, PrefetchTable};
use crate::realtime::{InvalidationListener, ListenerHandle, WebSocketSource};
use crate::store::LocalStore;

pub struct Session {
  config: Config,
  clock: Arc<dyn Clock>,
  store: Arc<LocalStore>,
  ages: Arc<AgeTracker>,
  log: Arc<EventLog>,
  notifier: Arc<dyn Notifier>,
  client: RetailClient,
  monitor: Arc<ConnectionMonitor>,
}

impl Session {
  /// Session over the default on-disk store, probing the configured backend.
  pub fn open(config: Config, notifier: Arc<dyn Notifier>) -> Result<Self> {
    let store = Arc::new(LocalStore::open()?);
    Self::build(config, store, Arc::new(SystemClock), notifier, None)
  }

  pub fn with_store(
    config: Config,
    store: Arc<LocalStore>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
  ) -> Result<Self> {
    Self::build(config, store, clock, notifier, None)
  }

  /// Like [`Session::with_store`] but with a custom health probe.
  pub fn with_probe(
    config: Config,
    store: Arc<LocalStore>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    probe: Arc<dyn HealthProbe>,
  ) -> Result<Self> {
    Self::build(config, store, clock, notifier, Some(probe))
  }

  fn build(
    config: Config,
    store: Arc<LocalStore>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    probe: Option<Arc<dyn HealthProbe>>,
  ) -> Result<Self> {
    let token = lookup_token(&store)?;
    let client = RetailClient::new(&config, token)?;

    let mut ages = AgeTracker::new(clock.clone())
      .with_default_ttl(Duration::milliseconds(config.cache.stale_time_ms as i64));
    for (root, ttl_ms) in &config.cache.key_ttl_ms {
      ages = ages.with_key_ttl(root.clone(), Duration::milliseconds(*ttl_ms as i64));
    }
    let ages = Arc::new(ages.with_store(store.clone()));

    let log = Arc::new(EventLog::persistent(store.clone(), clock.clone()));
    let probe: Arc<dyn HealthProbe> = match probe {
      Some(probe) => probe,
      None => Arc::new(client.clone()),
    };
    let monitor = Arc::new(ConnectionMonitor::new(
      probe,
      log.clone(),
      clock.clone(),
      MonitorSettings::from(&config.monitor),
    ));

    Ok(Self {
      config,
      clock,
      store,
      ages,
      log,
      notifier,
      client,
      monitor,
    })
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn clock(&self) -> &Arc<dyn Clock> {
    &self.clock
  }

  pub fn store(&self) -> &Arc<LocalStore> {
    &self.store
  }

  pub fn ages(&self) -> &Arc<AgeTracker> {
    &self.ages
  }

  pub fn log(&self) -> &Arc<EventLog> {
    &self.log
  }

  pub fn monitor(&self) -> &Arc<ConnectionMonitor> {
    &self.monitor
  }

  pub fn notifier(&self) -> &Arc<dyn Notifier> {
    &self.notifier
  }

  pub fn client(&self) -> &RetailClient {
    &self.client
  }

  /// Stored credential, falling back to `VITRINE_TOKEN`.
  pub fn access_token(&self) -> Result<Option<String>> {
    lookup_token(&self.store)
  }

  /// Whether a credential was stored with `login`. `VITRINE_TOKEN` alone
  /// does not count.
  pub fn has_stored_credential(&self) -> bool {
    match self.store.access_token() {
      Ok(token) => token.is_some(),
      Err(e) => {
        warn!(error = %e, "Failed to read stored credential");
        false
      }
    }
  }

  pub fn cache(&self) -> CollectionCache {
    CollectionCache::new(self.store.clone(), self.ages.clone())
  }

  pub fn cached_client(&self) -> CachedRetailClient {
    CachedRetailClient::new(
      self.client.clone(),
      self.cache(),
      self.store.clone(),
      self.config.pagination.max_pages,
    )
  }

  /// One-shot wake call; does nothing after the first time or without a
  /// stored credential.
  pub async fn wake_backend(&self) -> WakeOutcome {
    self.monitor.wake_backend(self.has_stored_credential()).await
  }

  /// Orchestrator with one loader per collection and the wake call as its
  /// mount hook. Loader failures are reported with a retry action.
  pub fn prefetcher(self: &Arc<Self>) -> PrefetchOrchestrator {
    let table = PrefetchTable::from(&self.config.prefetch);
    let session = Arc::clone(self);
    let mut orchestrator = PrefetchOrchestrator::new(table).with_mount_hook(Arc::new(move || {
      let session = session.clone();
      async move {
        session.wake_backend().await;
      }
      .boxed()
    }));

    for collection in Collection::ALL {
      orchestrator.register(collection.name(), self.loader(collection));
    }
    orchestrator
  }

  fn loader(&self, collection: Collection) -> LoaderFn {
    let client = self.cached_client();
    let notifier = self.notifier.clone();
    Arc::new(move || {
      let client = client.clone();
      let notifier = notifier.clone();
      async move {
        match client.load(collection, false).await {
          Ok(result) => {
            debug!(collection = %collection, items = result.data, source = result.source.label(), "Prefetched");
            Ok(())
          }
          Err(e) => {
            notifier.notify(
              Notification::error(format!("Failed to load {}", collection), e.to_string())
                .with_action(NotificationAction::Retry),
            );
            Err(e)
          }
        }
      }
      .boxed()
    })
  }

  /// Ask the server to warm its cache. Endpoint failures are reported one by
  /// one and do not fail the call.
  pub async fn warmup(&self) -> Result<WarmupReport> {
    let report = match self.client.warmup().await {
      Ok(report) => report,
      Err(e) => {
        self.notifier.notify(
          Notification::error("Cache warmup failed", e.to_string())
            .with_action(NotificationAction::Retry),
        );
        return Err(e.into());
      }
    };

    for failed in &report.failed_endpoints {
      self.notifier.notify(Notification::error(
        format!("Warmup failed for {}", failed.endpoint),
        failed.error.clone(),
      ));
    }
    self.notifier.notify(Notification::success(
      "Cache warmed",
      format!(
        "{} endpoints warmed, {} failed",
        report.warmed_endpoints.len(),
        report.failed_endpoints.len()
      ),
    ));
    Ok(report)
  }

  pub async fn redis_stats(&self) -> Result<RedisStats> {
    Ok(self.client.redis_stats().await?)
  }

  /// Spawn the background tasks: the connection monitor, the invalidation
  /// listener and the offline notifier. They stop when the returned value is
  /// dropped.
  pub fn start(self: &Arc<Self>) -> Result<RunningSession> {
    let monitor = self.monitor.spawn();

    let listener = Arc::new(InvalidationListener::new(
      self.notifier.clone(),
      self.clock.clone(),
      self.config.realtime.history_capacity,
    ));
    let source = WebSocketSource::new(
      self.config.realtime_url()?,
      self.config.realtime.channel.clone(),
      self.access_token()?,
    );
    let listener_handle = listener.spawn(Arc::new(source), &self.config.realtime);

    let watcher = self.spawn_offline_notifier();
    info!("Session started");

    Ok(RunningSession {
      listener,
      monitor,
      _listener_handle: listener_handle,
      watcher,
    })
  }

  fn spawn_offline_notifier(&self) -> JoinHandle<()> {
    let mut updates = self.monitor.subscribe();
    let notifier = self.notifier.clone();
    tokio::spawn(async move {
      let mut previous = None;
      while updates.changed().await.is_ok() {
        let status = updates.borrow_and_update().clone();
        if status.state == Some(ConnectionState::Offline) && previous != Some(ConnectionState::Offline) {
          notifier.notify(
            Notification::warning("Connection lost", status.summary())
              .with_action(NotificationAction::Reconnect),
          );
        }
        previous = status.state;
      }
    })
  }
}

fn lookup_token(store: &LocalStore) -> Result<Option<String>> {
  Ok(store.access_token()?.or_else(Config::env_token))
}

/// Background tasks of a started session.
pub struct RunningSession {
  listener: Arc<InvalidationListener>,
  monitor: MonitorHandle,
  _listener_handle: ListenerHandle,
  watcher: JoinHandle<()>,
}

impl RunningSession {
  pub fn listener(&self) -> &Arc<InvalidationListener> {
    &self.listener
  }

  /// Check now instead of waiting for the next interval.
  pub fn reconnect(&self) {
    self.monitor.request_check();
  }
}

impl Drop for RunningSession {
  fn drop(&mut self) {
    self.watcher.abort();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::ProbeError;
  use crate::notify::{ChannelNotifier, NotificationLevel, TracingNotifier};
  use crate::prefetch::{Activation, PrefetchIntent, PrefetchTrigger};
  use futures::future::BoxFuture;
  use std::sync::atomic::{AtomicU32, Ordering};

  #[derive(Default)]
  struct CountingProbe {
    wakes: AtomicU32,
  }

  impl HealthProbe for CountingProbe {
    fn check(&self, _timeout: std::time::Duration) -> BoxFuture<'_, Result<(), ProbeError>> {
      Box::pin(async { Ok(()) })
    }

    fn wake(&self, _timeout: std::time::Duration) -> BoxFuture<'_, Result<(), ProbeError>> {
      self.wakes.fetch_add(1, Ordering::SeqCst);
      Box::pin(async { Ok(()) })
    }
  }

  fn config() -> Config {
    Config::from_yaml("api:\n  base_url: http://127.0.0.1:9\ncache:\n  key_ttl_ms:\n    estoque: 60000\n")
      .unwrap()
  }

  fn session_with_probe(probe: Arc<CountingProbe>, token: Option<&str>) -> Arc<Session> {
    let store = Arc::new(LocalStore::in_memory().unwrap());
    if let Some(token) = token {
      store.set_access_token(token).unwrap();
    }
    Arc::new(
      Session::with_probe(
        config(),
        store,
        Arc::new(SystemClock),
        Arc::new(TracingNotifier),
        probe,
      )
      .unwrap(),
    )
  }

  #[test]
  fn test_stored_token_wins() {
    let session = session_with_probe(Arc::default(), Some("stored"));
    assert_eq!(session.access_token().unwrap().as_deref(), Some("stored"));
    assert!(session.has_stored_credential());
    assert!(session.client().has_token());
  }

  #[test]
  fn test_key_ttl_override_applied() {
    let session = session_with_probe(Arc::default(), None);
    assert_eq!(
      session.ages().ttl_for(&Collection::Stock.cache_key()),
      Duration::milliseconds(60_000)
    );
    assert_eq!(
      session.ages().ttl_for(&Collection::Sales.cache_key()),
      Duration::milliseconds(300_000)
    );
  }

  #[tokio::test]
  async fn test_wake_fires_once_across_mounts() {
    let probe = Arc::new(CountingProbe::default());
    let session = session_with_probe(probe.clone(), Some("stored"));

    let orchestrator = Arc::new(session.prefetcher());
    let first = PrefetchTrigger::new(orchestrator.clone(), PrefetchIntent::parse("/"), Activation::INTENT);
    first.mount();
    first.mount();

    let again = PrefetchTrigger::new(
      Arc::new(session.prefetcher()),
      PrefetchIntent::parse("/"),
      Activation::INTENT,
    );
    again.mount();

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(probe.wakes.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_env_token_alone_does_not_wake() {
    std::env::set_var("VITRINE_TOKEN", "from-env");
    let probe = Arc::new(CountingProbe::default());
    let session = session_with_probe(probe.clone(), None);

    assert!(session.client().has_token());
    assert!(!session.has_stored_credential());
    assert_eq!(session.wake_backend().await, WakeOutcome::NoCredential);
    assert_eq!(probe.wakes.load(Ordering::SeqCst), 0);
    std::env::remove_var("VITRINE_TOKEN");
  }

  #[tokio::test]
  async fn test_failed_prefetch_notifies_with_retry() {
    let store = Arc::new(LocalStore::in_memory().unwrap());
    let (notifier, mut rx) = ChannelNotifier::new();
    let session = Arc::new(
      Session::with_probe(
        config(),
        store,
        Arc::new(SystemClock),
        Arc::new(notifier),
        Arc::new(CountingProbe::default()),
      )
      .unwrap(),
    );

    let orchestrator = session.prefetcher();
    assert_eq!(orchestrator.trigger(&PrefetchIntent::parse("clientes")), 1);

    let notification = tokio::time::timeout(std::time::Duration::from_secs(10), rx.recv())
      .await
      .unwrap()
      .unwrap();
    assert_eq!(notification.level, NotificationLevel::Error);
    assert_eq!(notification.title, "Failed to load clientes");
    assert_eq!(notification.action, Some(NotificationAction::Retry));
  }
}
