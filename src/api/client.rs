use futures::future::BoxFuture;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::collections::Collection;
use super::types::{RedisStats, WarmupReport};
use crate::cache::PageResponse;
use crate::config::Config;
use crate::connection::HealthProbe;
use crate::error::{ApiError, ProbeError};

/// REST client for the retail backend.
#[derive(Clone)]
pub struct RetailClient {
  http: reqwest::Client,
  base_url: String,
  token: Option<String>,
  probe_path: String,
  health_path: String,
}

impl RetailClient {
  pub fn new(config: &Config, token: Option<String>) -> Result<Self, ApiError> {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.api.request_timeout_secs))
      .user_agent(concat!("vitrine/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| ApiError::Config(e.to_string()))?;

    Ok(Self {
      http,
      base_url: config.base_url().to_string(),
      token,
      probe_path: config.api.probe_path.clone(),
      health_path: config.api.health_path.clone(),
    })
  }

  pub fn has_token(&self) -> bool {
    self.token.is_some()
  }

  fn url(&self, path: &str) -> String {
    format!("{}/{}", self.base_url, path.trim_start_matches('/'))
  }

  fn request(&self, method: Method, path: &str, authorized: bool) -> RequestBuilder {
    let builder = self.http.request(method, self.url(path));
    match (&self.token, authorized) {
      (Some(token), true) => builder.bearer_auth(token),
      _ => builder,
    }
  }

  async fn send(
    &self,
    builder: RequestBuilder,
    method: &'static str,
    path: &str,
  ) -> Result<Response, ApiError> {
    let response = builder.send().await?;
    let status = response.status();
    if !status.is_success() {
      return Err(ApiError::Status {
        method,
        path: path.to_string(),
        status: status.as_u16(),
      });
    }
    Ok(response)
  }

  /// One page of a collection, in whichever shape the server sends.
  pub async fn list_page<T: DeserializeOwned>(
    &self,
    collection: Collection,
    page: u32,
    limit: u32,
  ) -> Result<PageResponse<T>, ApiError> {
    let path = collection.path();
    debug!(collection = %collection, page, limit, "Requesting page");
    let builder = self
      .request(Method::GET, &path, true)
      .query(&[("page", page), ("limit", limit)]);

    let response = self.send(builder, "GET", &path).await?;
    Ok(response.json().await?)
  }

  /// Ask the server to pre-populate its cache.
  pub async fn warmup(&self) -> Result<WarmupReport, ApiError> {
    let path = "/cache/warmup";
    let builder = self.request(Method::POST, path, true);
    let response = self.send(builder, "POST", path).await?;
    Ok(response.json().await?)
  }

  pub async fn redis_stats(&self) -> Result<RedisStats, ApiError> {
    let path = "/cache/redis-stats";
    let builder = self.request(Method::GET, path, true);
    let response = self.send(builder, "GET", path).await?;
    Ok(response.json().await?)
  }

  async fn head(&self, path: &str, authorized: bool, timeout: Duration) -> Result<(), ProbeError> {
    let response = self
      .request(Method::HEAD, path, authorized)
      .timeout(timeout)
      .send()
      .await
      .map_err(|e| classify(e, timeout))?;

    let status = response.status();
    if status.is_server_error() {
      return Err(ProbeError::Unknown(format!("HTTP {}", status.as_u16())));
    }
    Ok(())
  }
}

/// Any response below 500 counts as reachable; the probe is about the
/// network, not about authorization.
fn classify(error: reqwest::Error, timeout: Duration) -> ProbeError {
  if error.is_timeout() {
    ProbeError::Timeout(timeout)
  } else if error.is_connect() || error.is_request() {
    ProbeError::Network(error.to_string())
  } else {
    ProbeError::Unknown(error.to_string())
  }
}

impl HealthProbe for RetailClient {
  fn check(&self, timeout: Duration) -> BoxFuture<'_, Result<(), ProbeError>> {
    Box::pin(self.head(&self.probe_path, true, timeout))
  }

  fn wake(&self, timeout: Duration) -> BoxFuture<'_, Result<(), ProbeError>> {
    Box::pin(self.head(&self.health_path, false, timeout))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client(base_url: &str) -> RetailClient {
    let config = Config::from_yaml(&format!("api:\n  base_url: {}\n", base_url)).unwrap();
    RetailClient::new(&config, Some("secret".into())).unwrap()
  }

  #[test]
  fn test_url_joining() {
    let client = client("http://localhost:3000/api/");
    assert_eq!(client.url("/clientes"), "http://localhost:3000/api/clientes");
    assert_eq!(client.url("health"), "http://localhost:3000/api/health");
    assert!(client.has_token());
  }

  #[tokio::test]
  async fn test_unreachable_host_is_network_failure() {
    // Port 9 (discard) is closed on test machines
    let client = client("http://127.0.0.1:9");
    let result = client.check(Duration::from_secs(5)).await;
    assert!(matches!(result, Err(ProbeError::Network(_))), "{:?}", result);
  }
}
