//! One-shot command handlers.

use chrono::Local;
use color_eyre::Result;
use std::sync::Arc;
use vitrine::api::{
  CachedRetailClient, Category, Collection, Customer, Entity, Product, Sale, StockItem, Supplier,
};
use vitrine::prefetch::PrefetchIntent;
use vitrine::session::Session;
use vitrine::store::{LocalStore, PageSize};

pub async fn check(session: &Session) -> Result<()> {
  let state = session.monitor().check_now().await;
  let status = session.monitor().status();
  println!("{} ({})", status.summary(), state);
  Ok(())
}

pub fn logs(session: &Session, latency: bool) -> Result<()> {
  if latency {
    let points = session.log().latency_points();
    if points.is_empty() {
      println!("No latency data");
    }
    for point in points {
      println!("{}  {:>6}ms", point.label, point.response_time_ms);
    }
    return Ok(());
  }

  let events = session.log().logs();
  if events.is_empty() {
    println!("No connection events");
  }
  for event in events {
    let mut line = format!(
      "{}  {:<8} {}",
      event.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
      event.kind.label(),
      event.message
    );
    if let Some(ms) = event.response_time_ms {
      line.push_str(&format!(" ({}ms)", ms));
    }
    if let Some(details) = &event.details {
      line.push_str(&format!(" - {}", details));
    }
    println!("{}", line);
  }
  Ok(())
}

pub fn clear_logs(session: &Session, latency: bool) -> Result<()> {
  if latency {
    session.log().clear_latency_data();
    println!("Latency data cleared");
  } else {
    session.log().clear_logs();
    println!("Connection log cleared");
  }
  Ok(())
}

pub async fn warmup(session: &Session) -> Result<()> {
  let report = session.warmup().await?;
  for endpoint in &report.warmed_endpoints {
    println!("warmed  {}", endpoint);
  }
  for failed in &report.failed_endpoints {
    println!("failed  {}  {}", failed.endpoint, failed.error);
  }
  Ok(())
}

pub async fn stats(session: &Session) -> Result<()> {
  let stats = session.redis_stats().await?;
  println!("{}", stats.summary());
  println!("{} collections tracked locally", session.ages().len());
  for collection in Collection::ALL {
    let key = collection.cache_key();
    match session.ages().age(&key) {
      Some(age) => println!(
        "  {:<13} {}s old{}",
        collection.name(),
        age.num_seconds(),
        if session.ages().is_stale(&key, None) { " (stale)" } else { "" }
      ),
      None => println!("  {:<13} never fetched", collection.name()),
    }
  }
  Ok(())
}

pub async fn fetch(
  session: &Session,
  collection: Collection,
  all: bool,
  page: Option<u32>,
  refresh: bool,
) -> Result<()> {
  let client = session.cached_client();
  let page = if all { None } else { Some(page.unwrap_or(1)) };

  match collection {
    Collection::Customers => print_list::<Customer>(&client, page, refresh).await,
    Collection::Products => print_list::<Product>(&client, page, refresh).await,
    Collection::Stock => print_list::<StockItem>(&client, page, refresh).await,
    Collection::Sales => print_list::<Sale>(&client, page, refresh).await,
    Collection::Categories => print_list::<Category>(&client, page, refresh).await,
    Collection::Suppliers => print_list::<Supplier>(&client, page, refresh).await,
  }
}

async fn print_list<T: Entity>(client: &CachedRetailClient, page: Option<u32>, refresh: bool) -> Result<()> {
  let result = match page {
    Some(page) => client.list_page::<T>(page, refresh).await?,
    None => client.list_all::<T>(refresh).await?,
  };

  let mut header = format!("{} {} from {}", result.data.len(), T::COLLECTION, result.source.label());
  if let Some(at) = result.cached_at {
    header.push_str(&format!(" (cached {})", at.with_timezone(&Local).format("%H:%M:%S")));
  }
  if let Some(meta) = &result.data.pagination {
    if let (Some(page), Some(pages)) = (meta.page, meta.pages) {
      header.push_str(&format!(", page {}/{}", page, pages));
    }
    if let Some(total) = meta.total {
      header.push_str(&format!(", {} total", total));
    }
  }
  println!("{}", header);

  for item in &result.data.items {
    println!("  {:<10} {}", item.cache_key(), item.display_name());
  }
  Ok(())
}

pub fn limit(session: &Session, collection: Collection, size: Option<PageSize>) -> Result<()> {
  match size {
    Some(size) => {
      session.store().set_page_size(collection.name(), size)?;
      // Cached pages were cut at the old size
      let removed = session.cache().invalidate_matching(&format!("{}*", collection.name()))?;
      println!(
        "Page size for {} set to {} ({} cached entries dropped)",
        collection, size, removed
      );
    }
    None => println!("{}", session.store().page_size(collection.name())),
  }
  Ok(())
}

pub async fn prefetch(session: &Arc<Session>, target: &str) -> Result<()> {
  let intent = PrefetchIntent::parse(target);
  let orchestrator = session.prefetcher();
  let handles = orchestrator.start(&intent);
  if handles.is_empty() {
    println!("Nothing to prefetch for {}", intent);
    return Ok(());
  }

  let started = handles.len();
  futures::future::join_all(handles).await;
  println!("Prefetched {} loaders for {}", started, intent);
  Ok(())
}

pub fn login(token: &str) -> Result<()> {
  let store = LocalStore::open()?;
  store.set_access_token(token)?;
  println!("Credential stored");
  Ok(())
}

pub fn logout() -> Result<()> {
  let store = LocalStore::open()?;
  if store.clear_access_token()? {
    println!("Credential removed");
  } else {
    println!("No stored credential");
  }
  Ok(())
}
