//! Durable key-value store for state that survives restarts.
//!
//! Holds the connection event log, latency samples, per-entity page size
//! preferences, the stored access credential and the query cache. Values
//! are JSON documents under namespaced keys (see [`keys`]).

pub mod keys;
mod preferences;

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

pub use preferences::PageSize;

/// SQLite-backed key-value store.
pub struct LocalStore {
  conn: Mutex<Connection>,
}

/// Schema for the key-value table.
const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl LocalStore {
  /// Open or create the store at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;
    Self::open_at(&path)
  }

  /// Open or create the store at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create store directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open store at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// A throwaway store that lives only as long as this value.
  pub fn in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory store: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Get the default store path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("vitrine").join("store.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| eyre!("Failed to run store migrations: {}", e))?;
    Ok(())
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Read and decode the value stored under `key`.
  pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
    let conn = self.lock()?;

    let raw: Option<String> = conn
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read {}: {}", key, e))?;

    match raw {
      Some(raw) => {
        let value =
          serde_json::from_str(&raw).map_err(|e| eyre!("Failed to decode {}: {}", key, e))?;
        Ok(Some(value))
      }
      None => Ok(None),
    }
  }

  /// Encode and store `value` under `key`, replacing any previous value.
  pub fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value).map_err(|e| eyre!("Failed to encode {}: {}", key, e))?;

    self
      .lock()?
      .execute(
        "INSERT OR REPLACE INTO kv_store (key, value, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![key, raw],
      )
      .map_err(|e| eyre!("Failed to write {}: {}", key, e))?;

    Ok(())
  }

  /// Remove `key`. Returns whether anything was stored there.
  pub fn remove(&self, key: &str) -> Result<bool> {
    let removed = self
      .lock()?
      .execute("DELETE FROM kv_store WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to remove {}: {}", key, e))?;
    Ok(removed > 0)
  }

  /// Remove every key starting with `prefix`. Returns how many were removed.
  pub fn remove_prefix(&self, prefix: &str) -> Result<usize> {
    self
      .lock()?
      .execute(
        "DELETE FROM kv_store WHERE substr(key, 1, length(?1)) = ?1",
        params![prefix],
      )
      .map_err(|e| eyre!("Failed to remove keys under {}: {}", prefix, e))
  }

  /// Decode every value whose key starts with `prefix`.
  ///
  /// Values that no longer decode as `T` are skipped.
  pub fn scan_prefix<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<(String, T)>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT key, value FROM kv_store WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key")
      .map_err(|e| eyre!("Failed to prepare scan: {}", e))?;

    let rows: Vec<(String, String)> = stmt
      .query_map(params![prefix], |row| Ok((row.get(0)?, row.get(1)?)))
      .map_err(|e| eyre!("Failed to scan {}: {}", prefix, e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(
      rows
        .into_iter()
        .filter_map(|(key, raw)| serde_json::from_str(&raw).ok().map(|value| (key, value)))
        .collect(),
    )
  }
}
