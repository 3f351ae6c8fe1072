//! Payload abstraction
//!
//! Request and response bodies are opaque byte sources. The cache consumes a
//! network payload's stream exactly once at insertion time and replaces it
//! with a handle it owns: heap bytes for the in-memory store, a spill file
//! for the persistent store. Handles hand out independent readers, so any
//! number of callers can stream the same cached response concurrently.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An opaque byte source with a media type.
pub trait Payload: Send + Sync {
  /// Opens a fresh reader over the payload bytes. Each call returns an
  /// independent reader positioned at the start.
  fn reader(&self) -> io::Result<Box<dyn Read + Send>>;

  /// The payload's media type, straight from `Content-Type`.
  fn media_type(&self) -> Option<&str>;

  /// Whether the underlying bytes are still readable. A file-backed payload
  /// whose file was removed out from under the cache reports `false`.
  fn is_available(&self) -> bool;

  /// Byte length, when cheaply known.
  fn len(&self) -> Option<u64>;

  /// The backing file, for payloads that storage spilled to disk. Used when
  /// serialising store metadata.
  fn file_path(&self) -> Option<&Path> {
    None
  }
}

/// Heap-backed payload shared between clones via `Arc`.
#[derive(Clone)]
pub struct BytesPayload {
  bytes: Arc<Vec<u8>>,
  media_type: Option<String>,
}

impl BytesPayload {
  pub fn new(bytes: Vec<u8>, media_type: Option<String>) -> Self {
    BytesPayload {
      bytes: Arc::new(bytes),
      media_type,
    }
  }

  /// Drains `reader` to completion into a heap payload.
  pub fn from_reader(mut reader: impl Read, media_type: Option<String>) -> io::Result<Self> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    Ok(BytesPayload::new(bytes, media_type))
  }

  pub fn bytes(&self) -> &[u8] {
    &self.bytes
  }
}

impl Payload for BytesPayload {
  fn reader(&self) -> io::Result<Box<dyn Read + Send>> {
    Ok(Box::new(SharedCursor {
      bytes: Arc::clone(&self.bytes),
      pos: 0,
    }))
  }

  fn media_type(&self) -> Option<&str> {
    self.media_type.as_deref()
  }

  fn is_available(&self) -> bool {
    true
  }

  fn len(&self) -> Option<u64> {
    Some(self.bytes.len() as u64)
  }
}

impl fmt::Debug for BytesPayload {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BytesPayload")
      .field("len", &self.bytes.len())
      .field("media_type", &self.media_type)
      .finish()
  }
}

/// A reader over shared bytes that does not clone the buffer.
struct SharedCursor {
  bytes: Arc<Vec<u8>>,
  pos: usize,
}

impl Read for SharedCursor {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    let remaining = &self.bytes[self.pos.min(self.bytes.len())..];
    let n = remaining.len().min(buf.len());
    buf[..n].copy_from_slice(&remaining[..n]);
    self.pos += n;
    Ok(n)
  }
}

/// File-backed payload owned by the persistent store.
#[derive(Debug, Clone)]
pub struct FilePayload {
  path: PathBuf,
  media_type: Option<String>,
}

impl FilePayload {
  pub fn new(path: impl Into<PathBuf>, media_type: Option<String>) -> Self {
    FilePayload {
      path: path.into(),
      media_type,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Payload for FilePayload {
  fn reader(&self) -> io::Result<Box<dyn Read + Send>> {
    Ok(Box::new(File::open(&self.path)?))
  }

  fn media_type(&self) -> Option<&str> {
    self.media_type.as_deref()
  }

  fn is_available(&self) -> bool {
    self.path.is_file()
  }

  fn len(&self) -> Option<u64> {
    std::fs::metadata(&self.path).ok().map(|m| m.len())
  }

  fn file_path(&self) -> Option<&Path> {
    Some(&self.path)
  }
}
