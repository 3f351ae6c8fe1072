//! Persistent store
//!
//! Composition over [`MemoryStorage`]: payload bytes are spilled into a
//! [`FileStore`] tree instead of the heap, and the metadata map is
//! periodically serialised to a single versioned snapshot file that is
//! reloaded on startup. A corrupt or unreadable snapshot is discarded with a
//! diagnostic and the store starts empty; snapshot entries whose payload
//! files have gone missing are pruned during the load.
//!
//! Snapshot writes are best-effort throughout: failures are reported on
//! stderr and never retried or surfaced.

use crate::header::Headers;
use crate::message::{HttpRequest, HttpResponse, Status};
use crate::payload::{FilePayload, Payload};
use crate::storage::file_store::FileStore;
use crate::storage::memory::{MemoryStorage, PayloadCapture, DEFAULT_CAPACITY};
use crate::storage::{CacheItem, CacheStorage, Key, VariantKey};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use url::Url;

const SNAPSHOT_NAME: &str = "snapshot.json";
const SNAPSHOT_MAGIC: u32 = 0xFE7C_CA5E;
const SNAPSHOT_VERSION: u32 = 1;

/// Decides when an insert should rewrite the snapshot file.
///
/// The default fires after 100 mutations or 10 seconds, whichever comes
/// first. [`SnapshotPolicy::never`] limits snapshots to clean shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPolicy {
  every_mutations: Option<u64>,
  every_interval: Option<Duration>,
}

impl SnapshotPolicy {
  pub fn every_mutations(count: u64) -> Self {
    SnapshotPolicy {
      every_mutations: Some(count.max(1)),
      every_interval: None,
    }
  }

  pub fn every_interval(interval: Duration) -> Self {
    SnapshotPolicy {
      every_mutations: None,
      every_interval: Some(interval),
    }
  }

  pub fn never() -> Self {
    SnapshotPolicy {
      every_mutations: None,
      every_interval: None,
    }
  }

  fn should_snapshot(&self, mutations: u64, last_snapshot: SystemTime, now: SystemTime) -> bool {
    if let Some(count) = self.every_mutations {
      if mutations >= count {
        return true;
      }
    }
    if let Some(interval) = self.every_interval {
      let elapsed = now.duration_since(last_snapshot).unwrap_or_default();
      if elapsed >= interval {
        return true;
      }
    }
    false
  }
}

impl Default for SnapshotPolicy {
  fn default() -> Self {
    SnapshotPolicy {
      every_mutations: Some(100),
      every_interval: Some(Duration::from_secs(10)),
    }
  }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
  magic: u32,
  version: u32,
  entries: Vec<SnapshotEntry>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotEntry {
  uri: Url,
  variant: String,
  status: u16,
  headers: Vec<(String, String)>,
  cached_at: u64,
  payload: Option<PayloadRef>,
}

#[derive(Serialize, Deserialize)]
struct PayloadRef {
  /// Path relative to the store root.
  file: String,
  media_type: Option<String>,
}

/// Payload capture that spills bodies into the file tree.
struct FileCapture {
  files: Arc<FileStore>,
}

impl PayloadCapture for FileCapture {
  fn capture(&self, key: &Key, payload: &dyn Payload) -> Option<Arc<dyn Payload>> {
    match self.files.write(key, payload) {
      Ok(spilled) => Some(Arc::new(spilled)),
      Err(err) => {
        eprintln!("fetchcache: payload spill failed for {}: {}", key.uri(), err);
        None
      }
    }
  }

  fn on_remove(&self, key: &Key) {
    self.files.remove(key);
  }

  fn on_clear(&self) {
    self.files.clear();
  }
}

struct SnapshotState {
  mutations: u64,
  last_snapshot: SystemTime,
}

/// Disk-backed store: in-memory LRU semantics plus payload spill files and a
/// metadata snapshot that survives restarts.
pub struct PersistentStorage {
  memory: MemoryStorage,
  files: Arc<FileStore>,
  snapshot_path: PathBuf,
  policy: SnapshotPolicy,
  state: Mutex<SnapshotState>,
}

impl PersistentStorage {
  pub fn new(root: impl Into<PathBuf>) -> io::Result<PersistentStorage> {
    PersistentStorage::with_capacity(root, DEFAULT_CAPACITY)
  }

  pub fn with_capacity(root: impl Into<PathBuf>, capacity: usize) -> io::Result<PersistentStorage> {
    let files = Arc::new(FileStore::new(root)?);
    let memory = MemoryStorage::with_capture(
      capacity,
      Box::new(FileCapture {
        files: Arc::clone(&files),
      }),
    );
    let snapshot_path = files.root().join(SNAPSHOT_NAME);

    let storage = PersistentStorage {
      memory,
      files,
      snapshot_path,
      policy: SnapshotPolicy::default(),
      state: Mutex::new(SnapshotState {
        mutations: 0,
        last_snapshot: SystemTime::now(),
      }),
    };
    storage.load_snapshot();
    Ok(storage)
  }

  pub fn with_policy(mut self, policy: SnapshotPolicy) -> Self {
    self.policy = policy;
    self
  }

  /// Forces a snapshot now. Host programs should call this on orderly
  /// shutdown; `Drop` repeats it best-effort.
  pub fn flush(&self) {
    let mut state = self.state.lock().unwrap();
    state.mutations = 0;
    state.last_snapshot = SystemTime::now();
    self.write_snapshot();
  }

  fn note_mutation(&self) {
    let mut state = self.state.lock().unwrap();
    state.mutations += 1;
    let now = SystemTime::now();
    if self.policy.should_snapshot(state.mutations, state.last_snapshot, now) {
      state.mutations = 0;
      state.last_snapshot = now;
      self.write_snapshot();
    }
  }

  fn write_snapshot(&self) {
    let root = self.files.root();
    let entries: Vec<SnapshotEntry> = self
      .memory
      .entries()
      .map(|(key, item)| {
        let response = item.response();
        let payload = response.payload().and_then(|p| {
          let file = p.file_path()?;
          let relative = file.strip_prefix(root).unwrap_or(file);
          Some(PayloadRef {
            file: relative.to_string_lossy().into_owned(),
            media_type: p.media_type().map(str::to_string),
          })
        });
        SnapshotEntry {
          uri: key.uri().clone(),
          variant: key.variant().as_str().to_string(),
          status: response.status().code(),
          headers: response
            .headers()
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect(),
          cached_at: item
            .cached_at()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs(),
          payload,
        }
      })
      .collect();

    let snapshot = Snapshot {
      magic: SNAPSHOT_MAGIC,
      version: SNAPSHOT_VERSION,
      entries,
    };

    if let Err(err) = self.write_snapshot_file(&snapshot) {
      eprintln!("fetchcache: cache snapshot write failed: {}", err);
    }
  }

  fn write_snapshot_file(&self, snapshot: &Snapshot) -> io::Result<()> {
    let bytes = serde_json::to_vec(snapshot)?;
    let tmp = self.snapshot_path.with_extension("json.tmp");
    fs::write(&tmp, &bytes)?;
    match fs::rename(&tmp, &self.snapshot_path) {
      Ok(()) => Ok(()),
      Err(err) => {
        let _ = fs::remove_file(&tmp);
        Err(err)
      }
    }
  }

  fn load_snapshot(&self) {
    if !self.snapshot_path.exists() {
      return;
    }
    match self.read_snapshot_file() {
      Ok(snapshot) => {
        // `entries` is serialised most-recently-used first; re-insert in
        // reverse so the reloaded map keeps the same eviction order.
        for entry in snapshot.entries.into_iter().rev() {
          if let Some((key, item)) = self.revive_entry(entry) {
            self.memory.restore(key, item);
          }
        }
      }
      Err(err) => {
        eprintln!("fetchcache: discarding corrupt cache snapshot: {}", err);
        let _ = fs::remove_file(&self.snapshot_path);
      }
    }
  }

  fn read_snapshot_file(&self) -> io::Result<Snapshot> {
    let bytes = fs::read(&self.snapshot_path)?;
    let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
    if snapshot.magic != SNAPSHOT_MAGIC {
      return Err(io::Error::new(io::ErrorKind::InvalidData, "bad snapshot magic"));
    }
    if snapshot.version != SNAPSHOT_VERSION {
      return Err(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("unsupported snapshot version {}", snapshot.version),
      ));
    }
    Ok(snapshot)
  }

  /// Rebuilds one entry; returns `None` when its payload file is gone.
  fn revive_entry(&self, entry: SnapshotEntry) -> Option<(Key, CacheItem)> {
    let payload: Option<Arc<dyn Payload>> = match entry.payload {
      Some(reference) => {
        let path = self.resolve_payload_path(&reference.file);
        if !path.is_file() {
          return None;
        }
        Some(Arc::new(FilePayload::new(path, reference.media_type)))
      }
      None => None,
    };

    let mut headers = Headers::new();
    for (name, value) in entry.headers {
      headers = headers.add(name, value);
    }

    let response = HttpResponse::new(Status(entry.status), headers, payload);
    let cached_at = UNIX_EPOCH + Duration::from_secs(entry.cached_at);
    let key = Key::new(&entry.uri, VariantKey::from(entry.variant));
    Some((key, CacheItem::with_cached_at(response, cached_at)))
  }

  fn resolve_payload_path(&self, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
      path.to_path_buf()
    } else {
      self.files.root().join(path)
    }
  }
}

impl CacheStorage for PersistentStorage {
  fn get(&self, request: &HttpRequest) -> Option<CacheItem> {
    self.memory.get(request)
  }

  fn insert(&self, request: &HttpRequest, response: HttpResponse) -> HttpResponse {
    let stored = self.memory.insert(request, response);
    self.note_mutation();
    stored
  }

  fn update(&self, request: &HttpRequest, response: HttpResponse) -> HttpResponse {
    let stored = self.memory.update(request, response);
    self.note_mutation();
    stored
  }

  fn invalidate(&self, uri: &Url) {
    self.memory.invalidate(uri);
  }

  fn clear(&self) {
    self.memory.clear();
    let _ = fs::remove_file(&self.snapshot_path);
  }

  fn size(&self) -> usize {
    self.memory.size()
  }

  fn entries(&self) -> Box<dyn Iterator<Item = (Key, CacheItem)> + Send> {
    self.memory.entries()
  }
}

impl Drop for PersistentStorage {
  fn drop(&mut self) {
    self.write_snapshot();
  }
}
