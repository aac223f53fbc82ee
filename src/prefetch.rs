//! Navigation-driven prefetching.
//!
//! Intents map to loader ids through a static table. Triggers are fire and
//! forget: each loader runs on its own task and the orchestrator does no
//! deduplication, so repeated triggers start repeated loads. Collapsing
//! identical in-flight requests is left to the loaders themselves.

use color_eyre::Result;
use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::PrefetchConfig;

/// Starts one background load. Errors are reported by the loader itself and
/// only logged here.
pub type LoaderFn = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Side effect run on every mount, such as the backend wake call.
pub type MountHook = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// What the user is about to look at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrefetchIntent {
  /// A route path such as `/vendas`
  Route(String),
  /// A loader id named directly, such as `produtos`
  Key(String),
}

impl PrefetchIntent {
  /// Anything starting with `/` is a route, the rest are keys.
  pub fn parse(raw: &str) -> Self {
    if raw.starts_with('/') {
      Self::Route(raw.to_string())
    } else {
      Self::Key(raw.to_string())
    }
  }
}

impl fmt::Display for PrefetchIntent {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Route(path) => write!(f, "route {}", path),
      Self::Key(key) => write!(f, "key {}", key),
    }
  }
}

/// Route -> loader ids.
#[derive(Debug, Clone, Default)]
pub struct PrefetchTable {
  routes: BTreeMap<String, Vec<String>>,
}

impl PrefetchTable {
  /// Repeated ids within one route are dropped, keeping first occurrence.
  pub fn new(routes: BTreeMap<String, Vec<String>>) -> Self {
    let routes = routes
      .into_iter()
      .map(|(path, ids)| {
        let mut seen = HashSet::new();
        let ids = ids.into_iter().filter(|id| seen.insert(id.clone())).collect();
        (path, ids)
      })
      .collect();
    Self { routes }
  }

  /// Loader ids bound to `intent`. A key intent names its single loader.
  pub fn loaders_for(&self, intent: &PrefetchIntent) -> Vec<String> {
    match intent {
      PrefetchIntent::Route(path) => self.routes.get(path).cloned().unwrap_or_default(),
      PrefetchIntent::Key(key) => vec![key.clone()],
    }
  }

  pub fn routes(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
    self.routes.iter()
  }
}

impl From<&PrefetchConfig> for PrefetchTable {
  fn from(config: &PrefetchConfig) -> Self {
    Self::new(config.routes.clone())
  }
}

pub struct PrefetchOrchestrator {
  table: PrefetchTable,
  loaders: HashMap<String, LoaderFn>,
  mount_hook: Option<MountHook>,
}

impl PrefetchOrchestrator {
  pub fn new(table: PrefetchTable) -> Self {
    Self {
      table,
      loaders: HashMap::new(),
      mount_hook: None,
    }
  }

  pub fn register(&mut self, id: impl Into<String>, loader: LoaderFn) {
    self.loaders.insert(id.into(), loader);
  }

  pub fn with_mount_hook(mut self, hook: MountHook) -> Self {
    self.mount_hook = Some(hook);
    self
  }

  pub fn table(&self) -> &PrefetchTable {
    &self.table
  }

  /// Start every loader bound to `intent` without waiting for any of them.
  /// Returns how many were started.
  ///
  /// Must be called from within a tokio runtime.
  pub fn trigger(&self, intent: &PrefetchIntent) -> usize {
    self.start(intent).len()
  }

  /// Like [`PrefetchOrchestrator::trigger`], but hands back the spawned
  /// loads so one-shot commands can wait for them.
  pub fn start(&self, intent: &PrefetchIntent) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();
    for id in self.table.loaders_for(intent) {
      let Some(loader) = self.loaders.get(&id) else {
        debug!(loader = %id, intent = %intent, "No loader registered");
        continue;
      };

      let load = loader();
      handles.push(tokio::spawn(async move {
        if let Err(e) = load.await {
          warn!(loader = %id, error = %e, "Prefetch failed");
        }
      }));
    }
    debug!(intent = %intent, started = handles.len(), "Prefetch triggered");
    handles
  }

  fn run_mount_hook(&self) {
    if let Some(hook) = &self.mount_hook {
      tokio::spawn(hook());
    }
  }
}

/// Which signals fire a [`PrefetchTrigger`]. Both may be set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activation {
  pub on_intent: bool,
  pub on_mount: bool,
}

impl Activation {
  pub const INTENT: Self = Self {
    on_intent: true,
    on_mount: false,
  };
  pub const MOUNT: Self = Self {
    on_intent: false,
    on_mount: true,
  };
  pub const BOTH: Self = Self {
    on_intent: true,
    on_mount: true,
  };
}

/// Binds one intent to an orchestrator for a view.
pub struct PrefetchTrigger {
  orchestrator: Arc<PrefetchOrchestrator>,
  intent: PrefetchIntent,
  activation: Activation,
}

impl PrefetchTrigger {
  pub fn new(
    orchestrator: Arc<PrefetchOrchestrator>,
    intent: PrefetchIntent,
    activation: Activation,
  ) -> Self {
    Self {
      orchestrator,
      intent,
      activation,
    }
  }

  pub fn intent(&self) -> &PrefetchIntent {
    &self.intent
  }

  /// The view was instantiated.
  pub fn mount(&self) -> usize {
    self.orchestrator.run_mount_hook();
    if self.activation.on_mount {
      self.orchestrator.trigger(&self.intent)
    } else {
      0
    }
  }

  /// Hover, focus or similar.
  pub fn signal_intent(&self) -> usize {
    if self.activation.on_intent {
      self.orchestrator.trigger(&self.intent)
    } else {
      0
    }
  }
}
