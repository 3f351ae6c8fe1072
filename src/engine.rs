//! The caching engine
//!
//! [`HttpCache`] sits between a caller issuing requests and a
//! [`ResponseResolver`] performing them, implementing the RFC 2616 caching
//! semantics: classification, per-URI serialisation of populating fetches,
//! freshness evaluation, conditional revalidation, 304 header merging and
//! invalidation on unsafe methods.
//!
//! One request flows as: classify → (bypass + invalidate) or (lock URI →
//! storage lookup → fresh rewrite | revalidate | unconditional fetch) →
//! storage mutation → response to the caller.

use crate::cache_control::MaxStale;
use crate::error::{Error, Result};
use crate::header::{
  Vary, CONTENT_LENGTH, CONTENT_MD5, DATE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED,
  WARNING,
};
use crate::message::{HttpRequest, HttpResponse, Method, Status};
use crate::mutex::UriMutex;
use crate::resolver::ResponseResolver;
use crate::statistics::CacheStatistics;
use crate::storage::{CacheItem, CacheStorage};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime};

/// `Warning` added when a stale response is served without revalidation.
const WARNING_STALE: &str = "110 - \"Response is stale\"";
/// `Warning` added when revalidation failed and the cached response is
/// returned instead.
const WARNING_REVALIDATION_FAILED: &str = "111 - \"Revalidation failed\"";

/// Statuses a shared cache may store (RFC 2616 §13.4; 206 excluded because
/// partial content is unsupported).
const CACHEABLE_STATUSES: [u16; 7] = [200, 203, 204, 300, 301, 404, 410];

/// Headers a 304 must not overwrite on the cached entity.
const NON_UPDATABLE_HEADERS: [&str; 4] = [CONTENT_LENGTH, CONTENT_MD5, ETAG, LAST_MODIFIED];

/// How much older than `now` a cached `Date` may be before the engine
/// substitutes a fresh one when serving from storage.
const DEFAULT_DATE_TOLERANCE: Duration = Duration::from_secs(60);

/// Client-side HTTP cache in front of a response resolver.
pub struct HttpCache {
  storage: Arc<dyn CacheStorage>,
  resolver: OnceLock<Box<dyn ResponseResolver>>,
  mutex: UriMutex,
  statistics: CacheStatistics,
  date_tolerance: Duration,
}

impl HttpCache {
  pub fn new(storage: Arc<dyn CacheStorage>, resolver: Box<dyn ResponseResolver>) -> Self {
    let cache = HttpCache::without_resolver(storage);
    let _ = cache.resolver.set(resolver);
    cache
  }

  /// A cache with no transport yet; [`set_resolver`](Self::set_resolver)
  /// must be called before the first resolve.
  pub fn without_resolver(storage: Arc<dyn CacheStorage>) -> Self {
    HttpCache {
      storage,
      resolver: OnceLock::new(),
      mutex: UriMutex::new(),
      statistics: CacheStatistics::new(),
      date_tolerance: DEFAULT_DATE_TOLERANCE,
    }
  }

  pub fn with_date_tolerance(mut self, tolerance: Duration) -> Self {
    self.date_tolerance = tolerance;
    self
  }

  /// Installs the resolver. Returns `false` (and changes nothing) if one is
  /// already installed; the resolver may only be set once.
  pub fn set_resolver(&self, resolver: Box<dyn ResponseResolver>) -> bool {
    self.resolver.set(resolver).is_ok()
  }

  pub fn storage(&self) -> &Arc<dyn CacheStorage> {
    &self.storage
  }

  pub fn statistics(&self) -> &CacheStatistics {
    &self.statistics
  }

  pub fn clear(&self) {
    self.storage.clear();
  }

  /// Resolves `request` through the cache.
  pub fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
    self.resolve(request, false)
  }

  /// Resolves `request`, skipping any cached copy when `force` is set. The
  /// forced response is still stored if cacheable.
  pub fn resolve(&self, request: &HttpRequest, force: bool) -> Result<HttpResponse> {
    let resolver = self.resolver.get().ok_or(Error::Misconfigured)?;

    if !is_cacheable_request(request) {
      if !request.method().is_safe() {
        self.storage.invalidate(request.uri());
      }
      return self.handle_resolve(resolver.as_ref(), request, None);
    }

    let _lease = self.mutex.acquire(request.uri());
    self.from_cache(
      resolver.as_ref(),
      request,
      force || request.headers().cache_control().no_cache,
    )
  }

  fn from_cache(
    &self,
    resolver: &dyn ResponseResolver,
    request: &HttpRequest,
    force: bool,
  ) -> Result<HttpResponse> {
    if force {
      self.statistics.miss();
      return self.handle_resolve(resolver, request, None);
    }

    match self.storage.get(request) {
      Some(item) => {
        self.statistics.hit();
        let now = SystemTime::now();
        if item.is_stale(request.headers(), now) {
          if allow_stale(&item, request, now) {
            let rewritten = self.rewrite_response(&item, now);
            let headers = rewritten.headers().add(WARNING, WARNING_STALE);
            Ok(rewritten.with_headers(headers))
          } else {
            let conditional = prepare_conditional_request(request, item.response());
            self.handle_resolve(resolver, &conditional, Some(&item))
          }
        } else {
          Ok(self.rewrite_response(&item, now))
        }
      }
      None => {
        self.statistics.miss();
        self.handle_resolve(resolver, request, None)
      }
    }
  }

  fn handle_resolve(
    &self,
    resolver: &dyn ResponseResolver,
    request: &HttpRequest,
    item: Option<&CacheItem>,
  ) -> Result<HttpResponse> {
    let resolved = match resolver.resolve(request) {
      Ok(resolved) => resolved,
      Err(err) => {
        return match item {
          // Revalidation failed but we still hold a usable copy.
          Some(item) => {
            let cached = item.response();
            Ok(cached.with_headers(cached.headers().add(WARNING, WARNING_REVALIDATION_FAILED)))
          }
          None => Err(Error::Upstream(err)),
        };
      }
    };

    let mut response = if request.method() == Method::Head {
      match item {
        Some(item) => self.update_headers_from_resolved(request, item, &resolved),
        None => resolved.clone(),
      }
    } else if is_cacheable_request(request) && is_cacheable_response(&resolved) {
      self.storage.insert(request, resolved.clone())
    } else {
      resolved.clone()
    };

    if let Some(item) = item {
      if resolved.status() == Status::NOT_MODIFIED {
        response = self.update_headers_from_resolved(request, item, &resolved);
      }
    }

    Ok(response)
  }

  /// Merges a 304's (or HEAD's) headers onto the cached response and stores
  /// the result, keeping the cached payload.
  fn update_headers_from_resolved(
    &self,
    request: &HttpRequest,
    item: &CacheItem,
    resolved: &HttpResponse,
  ) -> HttpResponse {
    let cached = item.response();

    let mut incoming = resolved.headers().clone();
    for name in NON_UPDATABLE_HEADERS {
      incoming = incoming.remove(name);
    }

    let mut headers = cached.headers().clone();
    if incoming.contains(DATE) && headers.contains(DATE) {
      headers = headers.remove(DATE);
    }
    let headers = headers.merge(&incoming);

    let updated = HttpResponse::new(cached.status(), headers, cached.payload().cloned());
    self.storage.update(request, updated)
  }

  /// Prepares a cached response for the caller: a freshly computed `Age`
  /// and, when the cached `Date` has drifted past the tolerance, a current
  /// `Date`. The payload handle is shared, not copied.
  fn rewrite_response(&self, item: &CacheItem, now: SystemTime) -> HttpResponse {
    let cached = item.response();
    let mut headers = cached.headers().with_age(item.current_age(now).as_secs());

    let date_is_stale = match headers.date() {
      Some(date) => now.duration_since(date).unwrap_or_default() > self.date_tolerance,
      None => true,
    };
    if date_is_stale {
      headers = headers.with_date(now);
    }

    cached.with_headers(headers)
  }
}

/// Whether the cache may even consult storage for this request: the method
/// must be cacheable and the request must not carry `no-store`. (`no-cache`
/// stays in the cacheable branch; it forces a refresh whose result is
/// stored.)
fn is_cacheable_request(request: &HttpRequest) -> bool {
  request.method().is_cacheable() && !request.headers().cache_control().no_store
}

/// Whether a resolved response may be stored: whitelisted status, no
/// `no-store`/`private`, and a matchable `Vary`.
fn is_cacheable_response(response: &HttpResponse) -> bool {
  if !CACHEABLE_STATUSES.contains(&response.status().code()) {
    return false;
  }
  let cc = response.headers().cache_control();
  if cc.no_store || cc.private {
    return false;
  }
  response.headers().vary() != Vary::Any
}

/// Builds the conditional request for revalidating `cached`. If the cached
/// payload is no longer readable the conditionals are cleared instead, so
/// the origin has to send a full body.
fn prepare_conditional_request(request: &HttpRequest, cached: &HttpResponse) -> HttpRequest {
  let payload_gone = cached
    .payload()
    .map(|payload| !payload.is_available())
    .unwrap_or(false);

  if payload_gone {
    let headers = request.headers().remove(IF_NONE_MATCH).remove(IF_MODIFIED_SINCE);
    return request.with_headers(headers);
  }

  let mut headers = request.headers().clone();
  if let Some(etag) = cached.headers().etag() {
    headers = headers.set(IF_NONE_MATCH, etag);
  }
  if let Some(last_modified) = cached.headers().first(LAST_MODIFIED) {
    headers = headers.set(IF_MODIFIED_SINCE, last_modified);
  }
  request.with_headers(headers)
}

/// Whether a stale `item` may be served without revalidation: some
/// applicable `max-stale` allows the staleness and no revalidation
/// directive on the cached response forbids it.
fn allow_stale(item: &CacheItem, request: &HttpRequest, now: SystemTime) -> bool {
  let response_cc = item.response().headers().cache_control();
  if response_cc.must_revalidate || response_cc.proxy_revalidate {
    return false;
  }

  let request_cc = request.headers().cache_control();
  let max_stale = request_cc.max_stale.or(response_cc.max_stale);
  match max_stale {
    None => false,
    Some(MaxStale::Any) => true,
    Some(MaxStale::Limit(limit)) => {
      let lifetime = crate::freshness::freshness_lifetime(item.response().headers());
      let staleness = item.current_age(now).saturating_sub(lifetime);
      staleness <= Duration::from_secs(limit)
    }
  }
}
