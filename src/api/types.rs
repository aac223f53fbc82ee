//! Entities and admin payloads returned by the retail backend.
//!
//! The backend is not strict about number vs string for ids and a few
//! numeric fields, so those go through lenient deserializers.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::collections::Collection;
use crate::cache::Cacheable;

/// A cacheable record that belongs to one remote collection.
pub trait Entity: Cacheable {
  const COLLECTION: Collection;

  /// Short label for lists.
  fn display_name(&self) -> String;
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
  match Value::deserialize(deserializer)? {
    Value::String(s) => Ok(s),
    Value::Number(n) => Ok(n.to_string()),
    other => Err(serde::de::Error::custom(format!("invalid id: {}", other))),
  }
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
  Ok(match Option::<Value>::deserialize(deserializer)? {
    Some(Value::Number(n)) => n.as_f64(),
    Some(Value::String(s)) => s.trim().trim_end_matches('%').parse().ok(),
    _ => None,
  })
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
  Ok(match Option::<Value>::deserialize(deserializer)? {
    Some(Value::String(s)) => Some(s),
    Some(Value::Number(n)) => Some(n.to_string()),
    _ => None,
  })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
  #[serde(deserialize_with = "lenient_id", alias = "_id")]
  pub id: String,
  #[serde(rename = "nome", alias = "name", default)]
  pub name: String,
  #[serde(default)]
  pub email: Option<String>,
  #[serde(rename = "telefone", default)]
  pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
  #[serde(deserialize_with = "lenient_id", alias = "_id")]
  pub id: String,
  #[serde(rename = "nome", alias = "name", default)]
  pub name: String,
  #[serde(default)]
  pub sku: Option<String>,
  #[serde(rename = "preco", default, deserialize_with = "lenient_f64")]
  pub price: Option<f64>,
  #[serde(rename = "categoriaId", alias = "categoria_id", default, deserialize_with = "lenient_text")]
  pub category_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockItem {
  #[serde(deserialize_with = "lenient_id", alias = "_id")]
  pub id: String,
  #[serde(rename = "produtoId", alias = "produto_id", default, deserialize_with = "lenient_text")]
  pub product_id: Option<String>,
  #[serde(rename = "quantidade", default, deserialize_with = "lenient_f64")]
  pub quantity: Option<f64>,
  #[serde(rename = "minimo", alias = "estoqueMinimo", default, deserialize_with = "lenient_f64")]
  pub minimum: Option<f64>,
}

impl StockItem {
  pub fn is_low(&self) -> bool {
    matches!((self.quantity, self.minimum), (Some(q), Some(m)) if q <= m)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
  #[serde(deserialize_with = "lenient_id", alias = "_id")]
  pub id: String,
  #[serde(rename = "clienteId", alias = "cliente_id", default, deserialize_with = "lenient_text")]
  pub customer_id: Option<String>,
  #[serde(default, deserialize_with = "lenient_f64")]
  pub total: Option<f64>,
  #[serde(default)]
  pub status: Option<String>,
  #[serde(rename = "data", alias = "createdAt", default)]
  pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
  #[serde(deserialize_with = "lenient_id", alias = "_id")]
  pub id: String,
  #[serde(rename = "nome", alias = "name", default)]
  pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supplier {
  #[serde(deserialize_with = "lenient_id", alias = "_id")]
  pub id: String,
  #[serde(rename = "nome", alias = "name", default)]
  pub name: String,
  #[serde(default)]
  pub cnpj: Option<String>,
  #[serde(default)]
  pub email: Option<String>,
}

macro_rules! entity {
  ($ty:ty, $collection:expr, |$it:ident| $label:expr) => {
    impl Cacheable for $ty {
      fn cache_key(&self) -> String {
        self.id.clone()
      }

      fn entity_type() -> &'static str {
        $collection.name()
      }
    }

    impl Entity for $ty {
      const COLLECTION: Collection = $collection;

      fn display_name(&self) -> String {
        let $it = self;
        $label
      }
    }
  };
}

entity!(Customer, Collection::Customers, |c| c.name.clone());
entity!(Product, Collection::Products, |p| match &p.sku {
  Some(sku) => format!("{} ({})", p.name, sku),
  None => p.name.clone(),
});
entity!(StockItem, Collection::Stock, |s| format!(
  "produto {} x{}",
  s.product_id.as_deref().unwrap_or("?"),
  s.quantity.unwrap_or(0.0)
));
entity!(Sale, Collection::Sales, |s| format!(
  "venda {} R$ {:.2}",
  s.id,
  s.total.unwrap_or(0.0)
));
entity!(Category, Collection::Categories, |c| c.name.clone());
entity!(Supplier, Collection::Suppliers, |s| s.name.clone());

// ============================================================================
// Cache administration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FailedEndpoint {
  pub endpoint: String,
  #[serde(default)]
  pub error: String,
}

/// Response of `POST /cache/warmup`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupReport {
  #[serde(default)]
  pub warmed_endpoints: Vec<String>,
  #[serde(default)]
  pub failed_endpoints: Vec<FailedEndpoint>,
}

/// Response of `GET /cache/redis-stats`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedisStats {
  #[serde(default)]
  pub enabled: bool,
  #[serde(default)]
  pub connected: bool,
  #[serde(default)]
  pub error: Option<String>,
  #[serde(default, deserialize_with = "lenient_text")]
  pub memory_usage: Option<String>,
  #[serde(default, deserialize_with = "lenient_f64")]
  pub total_keys: Option<f64>,
  #[serde(default, deserialize_with = "lenient_f64")]
  pub hit_rate: Option<f64>,
  #[serde(default, deserialize_with = "lenient_text")]
  pub uptime: Option<String>,
}

impl RedisStats {
  pub fn summary(&self) -> String {
    if !self.enabled {
      return "Redis cache disabled".to_string();
    }
    if !self.connected {
      return match &self.error {
        Some(error) => format!("Redis cache disconnected: {}", error),
        None => "Redis cache disconnected".to_string(),
      };
    }

    let mut parts = vec!["Redis cache connected".to_string()];
    if let Some(keys) = self.total_keys {
      parts.push(format!("{} keys", keys as u64));
    }
    if let Some(rate) = self.hit_rate {
      parts.push(format!("hit rate {:.1}%", rate));
    }
    if let Some(memory) = &self.memory_usage {
      parts.push(format!("memory {}", memory));
    }
    if let Some(uptime) = &self.uptime {
      parts.push(format!("uptime {}", uptime));
    }
    parts.join(", ")
  }
}
