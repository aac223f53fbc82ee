use color_eyre::Result;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use super::{keys, LocalStore};

/// Items per page for paginated listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PageSize {
  TwentyFive,
  #[default]
  Fifty,
  OneHundred,
}

impl PageSize {
  pub const ALL: [PageSize; 3] = [PageSize::TwentyFive, PageSize::Fifty, PageSize::OneHundred];

  pub fn from_value(value: u64) -> Option<Self> {
    match value {
      25 => Some(Self::TwentyFive),
      50 => Some(Self::Fifty),
      100 => Some(Self::OneHundred),
      _ => None,
    }
  }

  pub fn get(self) -> u32 {
    match self {
      Self::TwentyFive => 25,
      Self::Fifty => 50,
      Self::OneHundred => 100,
    }
  }
}

impl fmt::Display for PageSize {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.get())
  }
}

impl FromStr for PageSize {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    s.trim()
      .parse::<u64>()
      .ok()
      .and_then(Self::from_value)
      .ok_or_else(|| format!("page size must be one of 25, 50 or 100, got '{}'", s))
  }
}

impl LocalStore {
  /// Page size preference for `entity`. Missing or invalid values read as 50.
  pub fn page_size(&self, entity: &str) -> PageSize {
    let raw = match self.get::<Value>(&keys::page_limit(entity)) {
      Ok(raw) => raw,
      Err(e) => {
        warn!(entity, error = %e, "Unreadable page size preference");
        None
      }
    };

    // Older builds stored the number as a string
    raw
      .and_then(|v| match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
      })
      .and_then(PageSize::from_value)
      .unwrap_or_default()
  }

  pub fn set_page_size(&self, entity: &str, size: PageSize) -> Result<()> {
    self.put(&keys::page_limit(entity), &size.get())
  }

  /// The stored access credential, if any.
  pub fn access_token(&self) -> Result<Option<String>> {
    Ok(
      self
        .get::<String>(keys::ACCESS_TOKEN)?
        .filter(|t| !t.trim().is_empty()),
    )
  }

  pub fn set_access_token(&self, token: &str) -> Result<()> {
    self.put(keys::ACCESS_TOKEN, token)
  }

  pub fn clear_access_token(&self) -> Result<bool> {
    self.remove(keys::ACCESS_TOKEN)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_missing_page_size_defaults_to_fifty() {
    let store = LocalStore::in_memory().unwrap();
    assert_eq!(store.page_size("vendas"), PageSize::Fifty);
  }

  #[test]
  fn test_page_size_round_trip_per_entity() {
    let store = LocalStore::in_memory().unwrap();
    store.set_page_size("vendas", PageSize::OneHundred).unwrap();
    store.set_page_size("clientes", PageSize::TwentyFive).unwrap();

    assert_eq!(store.page_size("vendas"), PageSize::OneHundred);
    assert_eq!(store.page_size("clientes"), PageSize::TwentyFive);
    assert_eq!(store.page_size("produtos"), PageSize::Fifty);
  }

  #[test]
  fn test_invalid_page_size_falls_back() {
    let store = LocalStore::in_memory().unwrap();
    store.put(&keys::page_limit("vendas"), &30u32).unwrap();
    assert_eq!(store.page_size("vendas"), PageSize::Fifty);

    store.put(&keys::page_limit("vendas"), "lots").unwrap();
    assert_eq!(store.page_size("vendas"), PageSize::Fifty);

    store.put(&keys::page_limit("vendas"), "25").unwrap();
    assert_eq!(store.page_size("vendas"), PageSize::TwentyFive);
  }

  #[test]
  fn test_page_size_parse() {
    assert_eq!("100".parse::<PageSize>(), Ok(PageSize::OneHundred));
    assert!("75".parse::<PageSize>().is_err());
  }

  #[test]
  fn test_access_token() {
    let store = LocalStore::in_memory().unwrap();
    assert_eq!(store.access_token().unwrap(), None);

    store.set_access_token("secret").unwrap();
    assert_eq!(store.access_token().unwrap(), Some("secret".to_string()));

    assert!(store.clear_access_token().unwrap());
    assert_eq!(store.access_token().unwrap(), None);
  }
}
