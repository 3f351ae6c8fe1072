//! `Cache-Control` directive parsing
//!
//! Recognises the directives the engine acts on; everything else is ignored
//! rather than rejected, since unknown directives are legal on the wire.

/// `max-stale`, which may appear bare (any amount of staleness accepted) or
/// with a limit in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxStale {
  Any,
  Limit(u64),
}

/// Parsed `Cache-Control` directives
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
  /// max-age in seconds
  pub max_age: Option<u64>,
  /// s-maxage in seconds, takes precedence over max-age
  pub s_maxage: Option<u64>,
  /// max-stale, with optional staleness limit
  pub max_stale: Option<MaxStale>,
  /// min-fresh in seconds
  pub min_fresh: Option<u64>,
  pub no_cache: bool,
  pub no_store: bool,
  pub must_revalidate: bool,
  pub proxy_revalidate: bool,
  pub public: bool,
  pub private: bool,
}

impl CacheControl {
  /// Parses a single header value.
  pub fn parse(value: &str) -> Self {
    let mut cc = Self::default();
    cc.parse_into(value);
    cc
  }

  /// Parses every value of a repeated header into one directive set. Later
  /// occurrences of a valued directive win.
  pub fn parse_all<'a>(values: impl Iterator<Item = &'a str>) -> Self {
    let mut cc = Self::default();
    for value in values {
      cc.parse_into(value);
    }
    cc
  }

  fn parse_into(&mut self, value: &str) {
    for directive in value.split(',') {
      let directive = directive.trim().to_ascii_lowercase();

      if directive == "no-cache" || directive.starts_with("no-cache=") {
        // A field list after no-cache scopes it to those headers; the
        // engine treats both forms as "revalidate before use".
        self.no_cache = true;
      } else if directive == "no-store" {
        self.no_store = true;
      } else if directive == "must-revalidate" {
        self.must_revalidate = true;
      } else if directive == "proxy-revalidate" {
        self.proxy_revalidate = true;
      } else if directive == "public" {
        self.public = true;
      } else if directive == "private" || directive.starts_with("private=") {
        self.private = true;
      } else if directive == "max-stale" {
        self.max_stale = Some(MaxStale::Any);
      } else if let Some(v) = directive.strip_prefix("max-stale=") {
        if let Ok(limit) = v.parse() {
          self.max_stale = Some(MaxStale::Limit(limit));
        }
      } else if let Some(v) = directive.strip_prefix("max-age=") {
        self.max_age = v.parse().ok();
      } else if let Some(v) = directive.strip_prefix("s-maxage=") {
        self.s_maxage = v.parse().ok();
      } else if let Some(v) = directive.strip_prefix("min-fresh=") {
        self.min_fresh = v.parse().ok();
      }
    }
  }
}
