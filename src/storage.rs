//! Storage contract: keys, variants, cache items
//!
//! A stored entry is addressed by a [`Key`]: the request URI (fragment
//! stripped) paired with a [`VariantKey`] fingerprint derived from the
//! response's `Vary` header. One URI may hold several items, at most one per
//! fingerprint. [`CacheStorage`] is the trait the engine drives; the two
//! implementations live in the submodules.

use crate::freshness;
use crate::header::{Headers, Vary};
use crate::message::{HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{Duration, SystemTime};
use url::Url;

pub mod file_store;
pub mod memory;
pub mod persistent;

/// Strips the fragment; URIs are compared by normalised string equality.
pub fn normalise_uri(uri: &Url) -> Url {
  let mut uri = uri.clone();
  uri.set_fragment(None);
  uri
}

/// Deterministic fingerprint of the request headers a response varies on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariantKey(String);

impl VariantKey {
  /// Derives the fingerprint selected by `vary` from `request_headers`.
  /// `Vary: *` has no fingerprint; such responses are uncacheable.
  pub fn from_vary(vary: &Vary, request_headers: &Headers) -> Option<VariantKey> {
    match vary {
      Vary::Any => None,
      Vary::None => Some(VariantKey(String::new())),
      Vary::Fields(fields) => {
        let mut names: Vec<&str> = fields.iter().map(String::as_str).collect();
        names.sort_unstable();
        names.dedup();
        let parts: Vec<String> = names
          .iter()
          .map(|name| format!("{}={}", name, request_headers.get_all(name).join(", ")))
          .collect();
        Some(VariantKey(parts.join("\n")))
      }
    }
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<String> for VariantKey {
  fn from(raw: String) -> Self {
    VariantKey(raw)
  }
}

/// Storage key: normalised URI plus variant fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
  uri: Url,
  variant: VariantKey,
}

impl Key {
  pub fn new(uri: &Url, variant: VariantKey) -> Key {
    Key {
      uri: normalise_uri(uri),
      variant,
    }
  }

  pub fn uri(&self) -> &Url {
    &self.uri
  }

  pub fn variant(&self) -> &VariantKey {
    &self.variant
  }

  /// Stable hex digest of the key, used to name payload spill files.
  pub fn digest(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.uri.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(self.variant.as_str().as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
  }
}

/// A cached response plus the instant it entered the cache.
///
/// The timestamp is assigned exactly once at insertion and never mutated;
/// wall-clock time is used so persisted items keep meaningful ages across
/// restarts.
#[derive(Debug, Clone)]
pub struct CacheItem {
  response: HttpResponse,
  cached_at: SystemTime,
}

impl CacheItem {
  pub fn new(response: HttpResponse) -> CacheItem {
    CacheItem::with_cached_at(response, SystemTime::now())
  }

  pub fn with_cached_at(response: HttpResponse, cached_at: SystemTime) -> CacheItem {
    CacheItem { response, cached_at }
  }

  pub fn response(&self) -> &HttpResponse {
    &self.response
  }

  pub fn cached_at(&self) -> SystemTime {
    self.cached_at
  }

  pub fn current_age(&self, now: SystemTime) -> Duration {
    freshness::current_age(self.response.headers(), self.cached_at, now)
  }

  /// Staleness as seen by `request_headers`: the response's own freshness
  /// lifetime, tightened by any `min-fresh` the request carries.
  pub fn is_stale(&self, request_headers: &Headers, now: SystemTime) -> bool {
    let headers = self.response.headers();
    if headers.cache_control().no_cache {
      return true;
    }
    let min_fresh = Duration::from_secs(request_headers.cache_control().min_fresh.unwrap_or(0));
    self.current_age(now) + min_fresh >= freshness::freshness_lifetime(headers)
  }
}

/// Operations the engine drives against a store.
///
/// Implementations guard their maps with a readers-writer lock; `get`,
/// `size` and `entries` take the read side.
pub trait CacheStorage: Send + Sync {
  /// The item whose fingerprint (derived from its own cached `Vary`)
  /// matches `request`, or `None`.
  fn get(&self, request: &HttpRequest) -> Option<CacheItem>;

  /// Stores `response` under the variant it selects for `request` and
  /// returns it with its payload rewritten to a storage-owned handle.
  /// Responses with `Vary: *` pass through unstored.
  fn insert(&self, request: &HttpRequest, response: HttpResponse) -> HttpResponse;

  /// Replaces the headers of the existing item for this request's variant,
  /// preserving its payload, and re-stamps its cache time.
  fn update(&self, request: &HttpRequest, response: HttpResponse) -> HttpResponse;

  /// Removes every variant stored under `uri`.
  fn invalidate(&self, uri: &Url);

  /// Removes everything; persistent stores also delete on-disk state.
  fn clear(&self);

  /// Number of live items.
  fn size(&self) -> usize;

  /// A restartable snapshot of the store contents. Taken under the read
  /// lock; concurrent mutation is safe but not observed by the iterator.
  fn entries(&self) -> Box<dyn Iterator<Item = (Key, CacheItem)> + Send>;
}
