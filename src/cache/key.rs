use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Ordered segments naming a collection or a derived view,
/// e.g. `["vendas"]` or `["vendas", "page", "3"]`.
///
/// Equality is structural: same segments in the same order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(Vec<String>);

impl CacheKey {
  pub fn new<I, S>(segments: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: ToString,
  {
    Self(segments.into_iter().map(|s| s.to_string()).collect())
  }

  pub fn root(segment: impl ToString) -> Self {
    Self(vec![segment.to_string()])
  }

  /// Append a segment.
  pub fn with(mut self, segment: impl ToString) -> Self {
    self.0.push(segment.to_string());
    self
  }

  /// Key for one page of a collection: `[root.., "page", n]`.
  pub fn page(&self, page: u32) -> Self {
    self.clone().with("page").with(page)
  }

  pub fn segments(&self) -> &[String] {
    &self.0
  }

  pub fn first(&self) -> Option<&str> {
    self.0.first().map(String::as_str)
  }

  pub fn starts_with(&self, prefix: &CacheKey) -> bool {
    self.0.starts_with(&prefix.0)
  }

  /// Match against a server-side glob such as `produtos:*`.
  pub fn matches(&self, pattern: &str) -> bool {
    glob_match(pattern, &self.to_string())
  }

  /// Stable, fixed-length id for storage.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    for segment in &self.0 {
      hasher.update(segment.as_bytes());
      // Unit separator keeps ["ab","c"] and ["a","bc"] apart
      hasher.update([0x1f]);
    }
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0.join(":"))
  }
}

impl From<&str> for CacheKey {
  fn from(s: &str) -> Self {
    Self::root(s)
  }
}

/// `*` matches any run of characters, everything else is literal.
fn glob_match(pattern: &str, text: &str) -> bool {
  let pattern: Vec<char> = pattern.chars().collect();
  let text: Vec<char> = text.chars().collect();

  let (mut p, mut t) = (0, 0);
  let mut backtrack: Option<(usize, usize)> = None;

  while t < text.len() {
    if p < pattern.len() && pattern[p] == '*' {
      backtrack = Some((p, t));
      p += 1;
    } else if p < pattern.len() && pattern[p] == text[t] {
      p += 1;
      t += 1;
    } else if let Some((star, matched)) = backtrack {
      p = star + 1;
      t = matched + 1;
      backtrack = Some((star, matched + 1));
    } else {
      return false;
    }
  }

  pattern[p..].iter().all(|&c| c == '*')
}
