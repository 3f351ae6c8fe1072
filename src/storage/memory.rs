//! Bounded in-memory store
//!
//! An LRU map from [`Key`] to [`CacheItem`] behind a single readers-writer
//! lock. Payload bytes are captured at insertion time through a
//! [`PayloadCapture`] hook so the persistent store can reuse this map while
//! spilling bodies to disk; the same hook hears about evictions and
//! removals.

use crate::message::{HttpRequest, HttpResponse};
use crate::payload::{BytesPayload, Payload};
use crate::storage::{normalise_uri, CacheItem, CacheStorage, Key, VariantKey};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, RwLock};
use url::Url;

pub const DEFAULT_CAPACITY: usize = 1000;

/// Rewrites network payloads into storage-owned handles and releases them
/// when their entry leaves the store.
///
/// Returning `None` from [`capture`](PayloadCapture::capture) stores a
/// headers-only item.
pub trait PayloadCapture: Send + Sync {
  fn capture(&self, key: &Key, payload: &dyn Payload) -> Option<Arc<dyn Payload>>;

  /// Called when `key` is evicted or invalidated. Not called when an insert
  /// replaces an item under the same key: capture has already reclaimed the
  /// old handle by then.
  fn on_remove(&self, _key: &Key) {}

  /// Called when the store is cleared.
  fn on_clear(&self) {}
}

/// Default capture: drain the stream into heap bytes.
struct HeapCapture;

impl PayloadCapture for HeapCapture {
  fn capture(&self, _key: &Key, payload: &dyn Payload) -> Option<Arc<dyn Payload>> {
    let reader = payload.reader().ok()?;
    let media_type = payload.media_type().map(str::to_string);
    let captured = BytesPayload::from_reader(reader, media_type).ok()?;
    Some(Arc::new(captured))
  }
}

/// Bounded LRU store keyed by `(URI, variant fingerprint)`.
pub struct MemoryStorage {
  inner: RwLock<LruCache<Key, CacheItem>>,
  capture: Box<dyn PayloadCapture>,
}

impl MemoryStorage {
  pub fn new(capacity: usize) -> Self {
    MemoryStorage::with_capture(capacity, Box::new(HeapCapture))
  }

  /// A store whose payloads are rewritten by `capture` instead of copied to
  /// the heap.
  pub fn with_capture(capacity: usize, capture: Box<dyn PayloadCapture>) -> Self {
    let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
    MemoryStorage {
      inner: RwLock::new(LruCache::new(capacity)),
      capture,
    }
  }

  /// Installs an already-owned item, bypassing payload capture. Used when
  /// reloading persisted state.
  pub(crate) fn restore(&self, key: Key, item: CacheItem) {
    self.store(key, item);
  }

  /// Finds the key under `request`'s URI whose stored `Vary` selects the
  /// same variant the request asks for.
  fn find_match(&self, request: &HttpRequest) -> Option<(Key, CacheItem)> {
    let uri = normalise_uri(request.uri());
    let map = self.inner.read().unwrap();
    for (key, item) in map.iter() {
      if key.uri() != &uri {
        continue;
      }
      let vary = item.response().headers().vary();
      if VariantKey::from_vary(&vary, request.headers()).as_ref() == Some(key.variant()) {
        return Some((key.clone(), item.clone()));
      }
    }
    None
  }

  fn store(&self, key: Key, item: CacheItem) {
    let mut map = self.inner.write().unwrap();
    if let Some((evicted, _)) = map.push(key.clone(), item) {
      if evicted != key {
        self.capture.on_remove(&evicted);
      }
    }
  }
}

impl CacheStorage for MemoryStorage {
  fn get(&self, request: &HttpRequest) -> Option<CacheItem> {
    let (key, item) = self.find_match(request)?;
    self.inner.write().unwrap().promote(&key);
    Some(item)
  }

  fn insert(&self, request: &HttpRequest, response: HttpResponse) -> HttpResponse {
    let vary = response.headers().vary();
    let Some(variant) = VariantKey::from_vary(&vary, request.headers()) else {
      // Vary: * is unmatchable, pass through unstored.
      return response;
    };
    let key = Key::new(request.uri(), variant);

    let stored_payload = response
      .payload()
      .and_then(|payload| self.capture.capture(&key, payload.as_ref()));
    let stored = response.with_payload(stored_payload);

    self.store(key, CacheItem::new(stored.clone()));
    stored
  }

  fn update(&self, request: &HttpRequest, response: HttpResponse) -> HttpResponse {
    let vary = response.headers().vary();
    let Some(variant) = VariantKey::from_vary(&vary, request.headers()) else {
      return response;
    };
    let key = Key::new(request.uri(), variant);

    let existing_payload = {
      let map = self.inner.read().unwrap();
      map.peek(&key).and_then(|item| item.response().payload().cloned())
    };
    match existing_payload {
      Some(payload) => {
        // Headers replaced, payload preserved, cache time re-stamped.
        let updated = response.with_payload(response.payload().cloned().or(Some(payload)));
        self.store(key, CacheItem::new(updated.clone()));
        updated
      }
      None => self.insert(request, response),
    }
  }

  fn invalidate(&self, uri: &Url) {
    let uri = normalise_uri(uri);
    let mut map = self.inner.write().unwrap();
    let doomed: Vec<Key> = map
      .iter()
      .filter(|(key, _)| key.uri() == &uri)
      .map(|(key, _)| key.clone())
      .collect();
    for key in doomed {
      map.pop(&key);
      self.capture.on_remove(&key);
    }
  }

  fn clear(&self) {
    self.inner.write().unwrap().clear();
    self.capture.on_clear();
  }

  fn size(&self) -> usize {
    self.inner.read().unwrap().len()
  }

  fn entries(&self) -> Box<dyn Iterator<Item = (Key, CacheItem)> + Send> {
    let snapshot: Vec<(Key, CacheItem)> = self
      .inner
      .read()
      .unwrap()
      .iter()
      .map(|(key, item)| (key.clone(), item.clone()))
      .collect();
    Box::new(snapshot.into_iter())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::header::Headers;
  use crate::message::{Method, Status};
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  fn get_request(uri: &str) -> HttpRequest {
    HttpRequest::new(url(uri), Method::Get)
  }

  fn response(body: &[u8], headers: Headers) -> HttpResponse {
    let payload: Arc<dyn Payload> =
      Arc::new(BytesPayload::new(body.to_vec(), Some("text/plain".to_string())));
    HttpResponse::new(Status::OK, headers, Some(payload))
  }

  #[test]
  fn insert_then_get_returns_equal_bytes() {
    let storage = MemoryStorage::new(10);
    let request = get_request("http://example.com/r");
    storage.insert(&request, response(b"body-a", Headers::new()));

    let item = storage.get(&request).expect("hit");
    assert_eq!(item.response().body_bytes().unwrap(), b"body-a");
    assert_eq!(storage.size(), 1);
  }

  #[test]
  fn reinsert_replaces_the_item() {
    let storage = MemoryStorage::new(10);
    let request = get_request("http://example.com/r");
    storage.insert(&request, response(b"old", Headers::new()));
    storage.insert(&request, response(b"new", Headers::new()));

    assert_eq!(storage.size(), 1);
    let item = storage.get(&request).unwrap();
    assert_eq!(item.response().body_bytes().unwrap(), b"new");
  }

  #[test]
  fn vary_selects_distinct_variants() {
    let storage = MemoryStorage::new(10);
    let vary = Headers::new().add("Vary", "Accept-Language");
    let fr = get_request("http://example.com/r").with_header("Accept-Language", "fr");
    let en = get_request("http://example.com/r").with_header("Accept-Language", "en");

    storage.insert(&fr, response(b"FR", vary.clone()));
    storage.insert(&en, response(b"EN", vary));

    assert_eq!(storage.size(), 2);
    assert_eq!(storage.get(&fr).unwrap().response().body_bytes().unwrap(), b"FR");
    assert_eq!(storage.get(&en).unwrap().response().body_bytes().unwrap(), b"EN");
  }

  #[test]
  fn vary_mismatch_is_a_miss() {
    let storage = MemoryStorage::new(10);
    let vary = Headers::new().add("Vary", "Accept-Language");
    let fr = get_request("http://example.com/r").with_header("Accept-Language", "fr");
    storage.insert(&fr, response(b"FR", vary));

    let de = get_request("http://example.com/r").with_header("Accept-Language", "de");
    assert!(storage.get(&de).is_none());
  }

  #[test]
  fn vary_star_is_not_stored() {
    let storage = MemoryStorage::new(10);
    let request = get_request("http://example.com/r");
    let passed = storage.insert(&request, response(b"x", Headers::new().add("Vary", "*")));
    assert_eq!(storage.size(), 0);
    assert_eq!(passed.body_bytes().unwrap(), b"x");
  }

  #[test]
  fn invalidate_removes_every_variant() {
    let storage = MemoryStorage::new(10);
    let vary = Headers::new().add("Vary", "Accept-Language");
    let fr = get_request("http://example.com/r").with_header("Accept-Language", "fr");
    let en = get_request("http://example.com/r").with_header("Accept-Language", "en");
    storage.insert(&fr, response(b"FR", vary.clone()));
    storage.insert(&en, response(b"EN", vary));
    storage.insert(&get_request("http://example.com/other"), response(b"O", Headers::new()));

    storage.invalidate(&url("http://example.com/r"));
    assert_eq!(storage.size(), 1);
    assert!(storage.get(&fr).is_none());
  }

  #[test]
  fn clear_leaves_size_zero() {
    let storage = MemoryStorage::new(10);
    storage.insert(&get_request("http://example.com/a"), response(b"a", Headers::new()));
    storage.insert(&get_request("http://example.com/b"), response(b"b", Headers::new()));
    storage.clear();
    assert_eq!(storage.size(), 0);
  }

  #[test]
  fn capacity_evicts_least_recently_used() {
    let storage = MemoryStorage::new(2);
    let a = get_request("http://example.com/a");
    let b = get_request("http://example.com/b");
    let c = get_request("http://example.com/c");
    storage.insert(&a, response(b"a", Headers::new()));
    storage.insert(&b, response(b"b", Headers::new()));

    // Touch `a` so `b` becomes the eviction candidate.
    storage.get(&a).unwrap();
    storage.insert(&c, response(b"c", Headers::new()));

    assert_eq!(storage.size(), 2);
    assert!(storage.get(&a).is_some());
    assert!(storage.get(&b).is_none());
    assert!(storage.get(&c).is_some());
  }

  struct RecordingCapture {
    captures: AtomicUsize,
    removed: Mutex<Vec<String>>,
  }

  impl PayloadCapture for RecordingCapture {
    fn capture(&self, _key: &Key, payload: &dyn Payload) -> Option<Arc<dyn Payload>> {
      self.captures.fetch_add(1, Ordering::SeqCst);
      let reader = payload.reader().ok()?;
      Some(Arc::new(BytesPayload::from_reader(reader, None).ok()?))
    }

    fn on_remove(&self, key: &Key) {
      self.removed.lock().unwrap().push(key.uri().to_string());
    }
  }

  #[test]
  fn eviction_notifies_the_capture_hook() {
    let capture = Arc::new(RecordingCapture {
      captures: AtomicUsize::new(0),
      removed: Mutex::new(Vec::new()),
    });

    struct Fwd(Arc<RecordingCapture>);
    impl PayloadCapture for Fwd {
      fn capture(&self, key: &Key, payload: &dyn Payload) -> Option<Arc<dyn Payload>> {
        self.0.capture(key, payload)
      }
      fn on_remove(&self, key: &Key) {
        self.0.on_remove(key)
      }
    }

    let storage = MemoryStorage::with_capture(1, Box::new(Fwd(Arc::clone(&capture))));
    storage.insert(&get_request("http://example.com/a"), response(b"a", Headers::new()));
    storage.insert(&get_request("http://example.com/b"), response(b"b", Headers::new()));

    assert_eq!(capture.captures.load(Ordering::SeqCst), 2);
    assert_eq!(*capture.removed.lock().unwrap(), vec!["http://example.com/a".to_string()]);
  }

  #[test]
  fn update_preserves_payload_and_replaces_headers() {
    let storage = MemoryStorage::new(10);
    let request = get_request("http://example.com/r");
    storage.insert(&request, response(b"body", Headers::new().add("X-Rev", "1")));

    let headers_only = HttpResponse::new(Status::OK, Headers::new().add("X-Rev", "2"), None);
    let updated = storage.update(&request, headers_only);

    assert_eq!(updated.headers().first("X-Rev"), Some("2"));
    assert_eq!(updated.body_bytes().unwrap(), b"body");

    let item = storage.get(&request).unwrap();
    assert_eq!(item.response().headers().first("X-Rev"), Some("2"));
    assert_eq!(item.response().body_bytes().unwrap(), b"body");
  }

  #[test]
  fn entries_snapshot_covers_all_items() {
    let storage = MemoryStorage::new(10);
    storage.insert(&get_request("http://example.com/a"), response(b"a", Headers::new()));
    storage.insert(&get_request("http://example.com/b"), response(b"b", Headers::new()));

    let uris: Vec<String> = storage.entries().map(|(k, _)| k.uri().to_string()).collect();
    assert_eq!(uris.len(), 2);
    assert!(uris.contains(&"http://example.com/a".to_string()));
    assert!(uris.contains(&"http://example.com/b".to_string()));
  }
}
