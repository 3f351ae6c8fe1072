//! fetchcache: a client-side HTTP cache
//!
//! An interposer between a program that issues HTTP requests and the
//! transport that performs them. Given a request it returns a stored,
//! still-fresh response; a revalidated response obtained via a conditional
//! request; or a freshly fetched response, updating its store on the way
//! out. Semantics follow RFC 2616 §13 (caching), including `Vary` variant
//! selection, per-URI serialisation of populating fetches, and stale-serving
//! with `Warning` headers.
//!
//! # Example
//!
//! ```rust,no_run
//! use fetchcache::{HttpCache, HttpRequest, MemoryStorage, UreqResolver};
//! use std::sync::Arc;
//! use url::Url;
//!
//! let cache = HttpCache::new(
//!     Arc::new(MemoryStorage::new(1000)),
//!     Box::new(UreqResolver::new()),
//! );
//!
//! let request = HttpRequest::get(Url::parse("https://example.com/data").unwrap());
//! let response = cache.execute(&request).unwrap();
//! println!("{} ({} bytes)", response.status(), response.body_bytes().unwrap().len());
//! ```
//!
//! Storage comes in two shapes: [`MemoryStorage`], a bounded LRU of
//! heap-backed items, and [`PersistentStorage`], which spills payload bytes
//! to a hash-sharded file tree and serialises its metadata map so the cache
//! survives restarts.

pub mod cache_control;
pub mod engine;
pub mod error;
pub mod freshness;
pub mod header;
pub mod message;
pub mod mutex;
pub mod payload;
pub mod resolver;
pub mod statistics;
pub mod storage;

pub use cache_control::{CacheControl, MaxStale};
pub use engine::HttpCache;
pub use error::{Error, Result};
pub use header::{HeaderName, Headers, Vary};
pub use message::{HttpRequest, HttpResponse, Method, Status};
pub use mutex::{UriLease, UriMutex};
pub use payload::{BytesPayload, FilePayload, Payload};
pub use resolver::{ResolverConfig, ResponseResolver, UreqResolver};
pub use statistics::CacheStatistics;
pub use storage::file_store::FileStore;
pub use storage::memory::{MemoryStorage, PayloadCapture};
pub use storage::persistent::{PersistentStorage, SnapshotPolicy};
pub use storage::{CacheItem, CacheStorage, Key, VariantKey};
