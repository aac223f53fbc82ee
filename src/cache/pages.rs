//! Paginated response normalization and full-collection page walks.

use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{debug, warn};

use crate::error::{BoxError, LoaderError};

/// Pagination block as sent by the server; any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationMeta {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub total: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub page: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub limit: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub pages: Option<u32>,
}

impl PaginationMeta {
  pub fn is_empty(&self) -> bool {
    self.total.is_none() && self.page.is_none() && self.limit.is_none() && self.pages.is_none()
  }

  /// `Some` only when both `page` and `pages` are known.
  pub fn has_more(&self) -> Option<bool> {
    match (self.page, self.pages) {
      (Some(page), Some(pages)) => Some(page < pages),
      _ => None,
    }
  }
}

/// A list endpoint's response: either a bare array or `{data, pagination}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PageResponse<T> {
  Items(Vec<T>),
  Paged {
    data: Option<Vec<T>>,
    pagination: Option<PaginationMeta>,
  },
}

impl<T> PageResponse<T> {
  /// Items plus the pagination block, if it carried anything.
  pub fn into_parts(self) -> (Vec<T>, Option<PaginationMeta>) {
    match self {
      Self::Items(items) => (items, None),
      Self::Paged { data, pagination } => (
        data.unwrap_or_default(),
        pagination.filter(|p| !p.is_empty()),
      ),
    }
  }
}

impl<T> From<Vec<T>> for PageResponse<T> {
  fn from(items: Vec<T>) -> Self {
    Self::Items(items)
  }
}

/// Options for a page walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
  /// Items requested per page
  pub limit: u32,
  /// Hard ceiling on loader calls
  pub max_pages: u32,
}

impl Default for FetchOptions {
  fn default() -> Self {
    Self {
      limit: 50,
      max_pages: 50,
    }
  }
}

/// Result of a page walk.
#[derive(Debug, Clone, PartialEq)]
pub struct AllPages<T> {
  /// Items in page order, not deduplicated
  pub items: Vec<T>,
  /// First non-empty pagination block seen
  pub pagination: Option<PaginationMeta>,
  pub pages_fetched: u32,
}

/// Walks a paginated endpoint until it runs out of pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageFetcher {
  options: FetchOptions,
}

impl PageFetcher {
  pub fn new(options: FetchOptions) -> Self {
    Self { options }
  }

  pub fn options(&self) -> FetchOptions {
    self.options
  }

  /// Call `loader(page, limit)` from page 1 until no more pages are
  /// indicated or `max_pages` calls have been made.
  ///
  /// More pages are indicated by `page < pages` when the response carries
  /// both; otherwise by a page that came back exactly full. A final page
  /// holding exactly `limit` items therefore costs one extra call.
  ///
  /// Any loader failure aborts the walk; nothing accumulated so far is returned.
  pub async fn fetch_all<T, F, Fut, E>(&self, mut loader: F) -> Result<AllPages<T>, LoaderError>
  where
    F: FnMut(u32, u32) -> Fut,
    Fut: Future<Output = Result<PageResponse<T>, E>>,
    E: Into<BoxError>,
  {
    let FetchOptions { limit, max_pages } = self.options;
    let mut items = Vec::new();
    let mut first_pagination: Option<PaginationMeta> = None;
    let mut page = 1;

    loop {
      let response = loader(page, limit).await.map_err(|e| LoaderError {
        page,
        source: e.into(),
      })?;

      let (batch, pagination) = response.into_parts();
      let batch_len = batch.len();
      items.extend(batch);

      let has_more = pagination
        .as_ref()
        .and_then(PaginationMeta::has_more)
        .unwrap_or(batch_len == limit as usize);

      if first_pagination.is_none() {
        first_pagination = pagination;
      }

      debug!(page, batch_len, has_more, "Fetched page");

      if !has_more {
        break;
      }
      if page >= max_pages {
        warn!(max_pages, "Stopped page walk at ceiling with more pages indicated");
        break;
      }
      page += 1;
    }

    Ok(AllPages {
      items,
      pagination: first_pagination,
      pages_fetched: page,
    })
  }

  /// Load a single page and normalize its shape.
  pub async fn fetch_page<T, F, Fut, E>(
    &self,
    page: u32,
    loader: F,
  ) -> Result<AllPages<T>, LoaderError>
  where
    F: FnOnce(u32, u32) -> Fut,
    Fut: Future<Output = Result<PageResponse<T>, E>>,
    E: Into<BoxError>,
  {
    let response = loader(page, self.options.limit)
      .await
      .map_err(|e| LoaderError {
        page,
        source: e.into(),
      })?;
    let (items, pagination) = response.into_parts();

    Ok(AllPages {
      items,
      pagination,
      pages_fetched: 1,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;

  fn items(n: usize) -> Vec<u32> {
    (0..n as u32).collect()
  }

  #[tokio::test]
  async fn test_heuristic_stops_on_short_page() {
    let calls = Arc::new(AtomicU32::new(0));
    let sizes = [50usize, 50, 30];

    let fetcher = PageFetcher::new(FetchOptions {
      limit: 50,
      max_pages: 50,
    });
    let result = fetcher
      .fetch_all(|page, _limit| {
        calls.fetch_add(1, Ordering::SeqCst);
        let size = sizes.get(page as usize - 1).copied().unwrap_or(0);
        async move { Ok::<_, String>(PageResponse::Items(items(size))) }
      })
      .await
      .unwrap();

    assert_eq!(result.items.len(), 130);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(result.pages_fetched, 3);
    assert_eq!(result.pagination, None);
  }

  #[tokio::test]
  async fn test_ceiling_stops_endless_full_pages() {
    let calls = Arc::new(AtomicU32::new(0));

    let fetcher = PageFetcher::new(FetchOptions {
      limit: 10,
      max_pages: 2,
    });
    let result = fetcher
      .fetch_all(|_page, limit| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move { Ok::<_, String>(PageResponse::Items(items(limit as usize))) }
      })
      .await
      .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(result.items.len(), 20);
  }

  #[tokio::test]
  async fn test_pagination_metadata_drives_loop() {
    let calls = Arc::new(AtomicU32::new(0));
    let fetcher = PageFetcher::default();

    // Short pages, but metadata says there are three of them
    let result = fetcher
      .fetch_all(|page, _limit| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move {
          Ok::<_, String>(PageResponse::Paged {
            data: Some(vec![page; 5]),
            pagination: Some(PaginationMeta {
              total: Some(15),
              page: Some(page),
              limit: Some(5),
              pages: Some(3),
            }),
          })
        }
      })
      .await
      .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(result.items, vec![1, 1, 1, 1, 1, 2, 2, 2, 2, 2, 3, 3, 3, 3, 3]);
    assert_eq!(result.pagination.unwrap().page, Some(1));
  }

  #[tokio::test]
  async fn test_loader_error_discards_partial_items() {
    let fetcher = PageFetcher::default();
    let err = fetcher
      .fetch_all(|page, limit| async move {
        if page == 2 {
          Err("connection reset".to_string())
        } else {
          Ok(PageResponse::Items(items(limit as usize)))
        }
      })
      .await
      .unwrap_err();

    assert_eq!(err.page, 2);
    assert!(err.to_string().contains("connection reset"));
  }

  #[tokio::test]
  async fn test_first_non_empty_pagination_is_kept() {
    let fetcher = PageFetcher::new(FetchOptions {
      limit: 2,
      max_pages: 5,
    });
    let result = fetcher
      .fetch_all(|page, _| async move {
        let pagination = if page == 1 {
          Some(PaginationMeta::default())
        } else {
          Some(PaginationMeta {
            total: Some(3),
            ..Default::default()
          })
        };
        let data = if page == 1 { vec![1, 2] } else { vec![3] };
        Ok::<_, String>(PageResponse::Paged {
          data: Some(data),
          pagination,
        })
      })
      .await
      .unwrap();

    assert_eq!(result.items, vec![1, 2, 3]);
    assert_eq!(result.pagination.and_then(|p| p.total), Some(3));
  }

  #[test]
  fn test_response_shapes_deserialize() {
    let bare: PageResponse<u32> = serde_json::from_str("[1, 2, 3]").unwrap();
    assert_eq!(bare.into_parts(), (vec![1, 2, 3], None));

    let paged: PageResponse<u32> =
      serde_json::from_str(r#"{"data": [4], "pagination": {"page": 1, "pages": 2}}"#).unwrap();
    let (data, pagination) = paged.into_parts();
    assert_eq!(data, vec![4]);
    assert_eq!(pagination.and_then(|p| p.has_more()), Some(true));

    let empty: PageResponse<u32> = serde_json::from_str(r#"{"data": null}"#).unwrap();
    assert_eq!(empty.into_parts(), (vec![], None));
  }

  #[derive(Debug, PartialEq, Deserialize)]
  struct Sku {
    code: String,
  }

  // Mirrors how the HTTP client decodes: generic over any entity
  fn decode<T: serde::de::DeserializeOwned>(body: &str) -> PageResponse<T> {
    serde_json::from_str(body).unwrap()
  }

  #[test]
  fn test_paged_response_without_default_items() {
    let (items, pagination) =
      decode::<Sku>(r#"{"pagination": {"page": 2, "pages": 2, "total": 60}}"#).into_parts();
    assert!(items.is_empty());
    let pagination = pagination.unwrap();
    assert_eq!(pagination.total, Some(60));
    assert_eq!(pagination.has_more(), Some(false));

    let (items, _) = decode::<Sku>(r#"{"data": [{"code": "A1"}]}"#).into_parts();
    assert_eq!(items, vec![Sku { code: "A1".into() }]);
  }
}
