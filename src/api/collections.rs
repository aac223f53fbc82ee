use std::fmt;
use std::str::FromStr;

use crate::cache::CacheKey;

/// Remote entity collections exposed by the retail backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
  Customers,
  Products,
  Stock,
  Sales,
  Categories,
  Suppliers,
}

impl Collection {
  pub const ALL: [Collection; 6] = [
    Collection::Customers,
    Collection::Products,
    Collection::Stock,
    Collection::Sales,
    Collection::Categories,
    Collection::Suppliers,
  ];

  /// Backend name, also used as loader id and cache key root.
  pub fn name(&self) -> &'static str {
    match self {
      Self::Customers => "clientes",
      Self::Products => "produtos",
      Self::Stock => "estoque",
      Self::Sales => "vendas",
      Self::Categories => "categorias",
      Self::Suppliers => "fornecedores",
    }
  }

  pub fn path(&self) -> String {
    format!("/{}", self.name())
  }

  pub fn cache_key(&self) -> CacheKey {
    CacheKey::root(self.name())
  }
}

impl fmt::Display for Collection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for Collection {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let name = s.trim().trim_start_matches('/');
    Self::ALL
      .into_iter()
      .find(|c| c.name() == name)
      .ok_or_else(|| {
        let known: Vec<&str> = Self::ALL.iter().map(|c| c.name()).collect();
        format!("Unknown collection '{}' (expected one of: {})", s, known.join(", "))
      })
  }
}
