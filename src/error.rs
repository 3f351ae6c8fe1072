//! Error types for fetchcache
//!
//! Only failures the caller can act on are surfaced: a dead upstream with no
//! cached fallback, a cache used before a resolver was installed, and plain
//! I/O errors from payload handling. Storage-level recoveries (corrupt
//! snapshots, missing payload files) are handled where they occur and never
//! reach this enum.
//!
//! All errors use the `thiserror` crate for minimal boilerplate and proper
//! error trait implementations.

use thiserror::Error;

/// Result type alias for fetchcache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for fetchcache
#[derive(Error, Debug)]
pub enum Error {
  /// The resolver failed and there was no cached response to fall back on
  #[error("upstream resolve failed: {0}")]
  Upstream(#[source] std::io::Error),

  /// The cache was asked to resolve a request before a resolver was installed
  #[error("no response resolver has been configured")]
  Misconfigured,

  /// I/O error (payload reading, file handling)
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}
