mod app;
mod commands;
mod event;
mod logging;
mod ui;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use vitrine::api::Collection;
use vitrine::config::Config;
use vitrine::notify::{ChannelNotifier, TracingNotifier};
use vitrine::session::Session;
use vitrine::store::PageSize;

#[derive(Parser, Debug)]
#[command(name = "vitrine")]
#[command(about = "Connection monitor and offline cache for the retail backend")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/vitrine/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Live dashboard: connection health, latency and cache events (default)
  Watch,
  /// Probe the backend once
  Check,
  /// Show the persisted connection log
  Logs {
    /// Show latency samples instead of events
    #[arg(long)]
    latency: bool,
  },
  /// Clear the connection log
  ClearLogs {
    /// Clear latency samples instead of events
    #[arg(long)]
    latency: bool,
  },
  /// Ask the server to warm its cache
  Warmup,
  /// Server cache statistics and local fetch ages
  Stats,
  /// List a collection through the local cache
  Fetch {
    collection: Collection,
    /// Walk every page
    #[arg(long, conflicts_with = "page")]
    all: bool,
    #[arg(long)]
    page: Option<u32>,
    /// Ignore cached data
    #[arg(long)]
    refresh: bool,
  },
  /// Show or set the page size for a collection (25, 50 or 100)
  Limit {
    collection: Collection,
    size: Option<PageSize>,
  },
  /// Run the loaders for a route (`/vendas`) or a single collection
  Prefetch { target: String },
  /// Store an access token
  Login { token: String },
  /// Remove the stored access token
  Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let command = args.command.unwrap_or(Command::Watch);

  // Credential commands never need the backend
  match &command {
    Command::Login { token } => {
      logging::init_stderr()?;
      return commands::login(token);
    }
    Command::Logout => {
      logging::init_stderr()?;
      return commands::logout();
    }
    _ => {}
  }

  let config = Config::load(args.config.as_deref())?;

  if let Command::Watch = command {
    let _guard = logging::init_file()?;
    let (notifier, notifications) = ChannelNotifier::new();
    let session = Arc::new(Session::open(config, Arc::new(notifier))?);
    let mut app = app::App::new(session)?;
    return app.run(notifications).await;
  }

  logging::init_stderr()?;
  let session = Arc::new(Session::open(config, Arc::new(TracingNotifier))?);

  match command {
    Command::Check => commands::check(&session).await,
    Command::Logs { latency } => commands::logs(&session, latency),
    Command::ClearLogs { latency } => commands::clear_logs(&session, latency),
    Command::Warmup => commands::warmup(&session).await,
    Command::Stats => commands::stats(&session).await,
    Command::Fetch {
      collection,
      all,
      page,
      refresh,
    } => commands::fetch(&session, collection, all, page, refresh).await,
    Command::Limit { collection, size } => commands::limit(&session, collection, size),
    Command::Prefetch { target } => commands::prefetch(&session, &target).await,
    Command::Watch | Command::Login { .. } | Command::Logout => Ok(()),
  }
}
