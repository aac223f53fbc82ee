use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub monitor: MonitorConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub pagination: PaginationConfig,
  #[serde(default)]
  pub prefetch: PrefetchConfig,
  #[serde(default)]
  pub realtime: RealtimeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  pub base_url: String,
  /// Authenticated collection endpoint used by the periodic health check
  #[serde(default = "default_probe_path")]
  pub probe_path: String,
  /// Unauthenticated endpoint hit once at startup to wake the backend
  #[serde(default = "default_health_path")]
  pub health_path: String,
  /// WebSocket endpoint for cache events (derived from base_url if not set)
  pub realtime_url: Option<String>,
  #[serde(default = "default_request_timeout")]
  pub request_timeout_secs: u64,
}

fn default_probe_path() -> String {
  "/clientes".to_string()
}

fn default_health_path() -> String {
  "/health".to_string()
}

fn default_request_timeout() -> u64 {
  30
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
  pub interval_secs: u64,
  pub probe_timeout_secs: u64,
  pub wake_timeout_secs: u64,
  /// Successful probes at or above this are classified as slow
  pub slow_threshold_ms: u64,
}

impl Default for MonitorConfig {
  fn default() -> Self {
    Self {
      interval_secs: 30,
      probe_timeout_secs: 10,
      wake_timeout_secs: 15,
      slow_threshold_ms: 5000,
    }
  }
}

impl MonitorConfig {
  pub fn interval(&self) -> Duration {
    Duration::from_secs(self.interval_secs)
  }

  pub fn probe_timeout(&self) -> Duration {
    Duration::from_secs(self.probe_timeout_secs)
  }

  pub fn wake_timeout(&self) -> Duration {
    Duration::from_secs(self.wake_timeout_secs)
  }

  pub fn slow_threshold(&self) -> Duration {
    Duration::from_millis(self.slow_threshold_ms)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub stale_time_ms: u64,
  /// Staleness overrides keyed by collection (first key segment)
  pub key_ttl_ms: BTreeMap<String, u64>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_time_ms: 300_000,
      key_ttl_ms: BTreeMap::new(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
  pub max_pages: u32,
}

impl Default for PaginationConfig {
  fn default() -> Self {
    Self { max_pages: 50 }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
  /// Route path -> loader ids (collection names)
  pub routes: BTreeMap<String, Vec<String>>,
}

impl Default for PrefetchConfig {
  fn default() -> Self {
    let route = |path: &str, loaders: &[&str]| {
      (
        path.to_string(),
        loaders.iter().map(|l| l.to_string()).collect(),
      )
    };

    Self {
      routes: BTreeMap::from([
        route("/", &["vendas", "produtos", "estoque"]),
        route("/clientes", &["clientes"]),
        route("/produtos", &["produtos", "categorias"]),
        route("/estoque", &["estoque", "produtos"]),
        route("/vendas", &["vendas", "clientes", "produtos"]),
        route("/fornecedores", &["fornecedores"]),
      ]),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
  pub channel: String,
  pub history_capacity: usize,
  pub reconnect: ReconnectConfig,
}

impl Default for RealtimeConfig {
  fn default() -> Self {
    Self {
      channel: "cache-events-realtime".to_string(),
      history_capacity: 50,
      reconnect: ReconnectConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
  pub initial_ms: u64,
  pub max_ms: u64,
  pub multiplier: f64,
  pub jitter_ms: u64,
}

impl Default for ReconnectConfig {
  fn default() -> Self {
    Self {
      initial_ms: 1000,
      max_ms: 30_000,
      multiplier: 2.0,
      jitter_ms: 250,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./vitrine.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/vitrine/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/vitrine/config.yaml\n\
                 See vitrine.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("vitrine.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("vitrine").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config =
      serde_yaml::from_str(contents).map_err(|e| eyre!("Failed to parse config: {}", e))?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<()> {
    if self.api.base_url.trim().is_empty() {
      return Err(eyre!("api.base_url must not be empty"));
    }
    url::Url::parse(&self.api.base_url)
      .map_err(|e| eyre!("api.base_url is not a valid URL: {}", e))?;
    if self.monitor.interval_secs == 0 {
      return Err(eyre!("monitor.interval_secs must be greater than zero"));
    }
    if self.monitor.probe_timeout_secs >= self.monitor.interval_secs {
      return Err(eyre!(
        "monitor.probe_timeout_secs ({}) must be below monitor.interval_secs ({})",
        self.monitor.probe_timeout_secs,
        self.monitor.interval_secs
      ));
    }
    if self.pagination.max_pages == 0 {
      return Err(eyre!("pagination.max_pages must be greater than zero"));
    }
    Ok(())
  }

  /// Base URL without a trailing slash.
  pub fn base_url(&self) -> &str {
    self.api.base_url.trim_end_matches('/')
  }

  /// WebSocket URL for cache events.
  ///
  /// Falls back to the API base URL with a ws(s) scheme and `/realtime` appended.
  pub fn realtime_url(&self) -> Result<String> {
    if let Some(url) = &self.api.realtime_url {
      return Ok(url.clone());
    }

    let mut url = url::Url::parse(self.base_url())
      .map_err(|e| eyre!("api.base_url is not a valid URL: {}", e))?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url
      .set_scheme(scheme)
      .map_err(|_| eyre!("Cannot derive realtime URL from {}", self.api.base_url))?;
    let path = format!("{}/realtime", url.path().trim_end_matches('/'));
    url.set_path(&path);

    Ok(url.to_string())
  }

  /// Get the API token from environment variables.
  ///
  /// Checks VITRINE_TOKEN.
  pub fn env_token() -> Option<String> {
    std::env::var("VITRINE_TOKEN")
      .ok()
      .filter(|t| !t.trim().is_empty())
  }
}
