//! Case-insensitive header model
//!
//! [`Headers`] is an immutable multimap from field name to an ordered list of
//! values. Every mutating operation returns a new `Headers`; callers never
//! observe in-place changes. Lookup is case-insensitive, iteration preserves
//! insertion order.
//!
//! Typed accessors cover exactly the fields the caching engine consults:
//! `Cache-Control`, `Date`, `Expires`, `Age`, `Last-Modified`, `ETag`,
//! `Vary`, `Allow`, `Location`, `Content-Location` and `Content-Type`.

use crate::cache_control::CacheControl;
use crate::message::Method;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::SystemTime;
use url::Url;

pub const AGE: &str = "Age";
pub const ALLOW: &str = "Allow";
pub const CACHE_CONTROL: &str = "Cache-Control";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const CONTENT_LOCATION: &str = "Content-Location";
pub const CONTENT_MD5: &str = "Content-MD5";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const DATE: &str = "Date";
pub const ETAG: &str = "ETag";
pub const EXPIRES: &str = "Expires";
pub const IF_MODIFIED_SINCE: &str = "If-Modified-Since";
pub const IF_NONE_MATCH: &str = "If-None-Match";
pub const LAST_MODIFIED: &str = "Last-Modified";
pub const LOCATION: &str = "Location";
pub const VARY: &str = "Vary";
pub const WARNING: &str = "Warning";

/// A header field name that hashes and compares by its ASCII-lowercased
/// bytes while remembering the spelling it was created with.
#[derive(Debug, Clone)]
pub struct HeaderName(String);

impl HeaderName {
  pub fn new(name: impl Into<String>) -> Self {
    HeaderName(name.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl PartialEq for HeaderName {
  fn eq(&self, other: &Self) -> bool {
    self.0.eq_ignore_ascii_case(&other.0)
  }
}

impl Eq for HeaderName {}

impl Hash for HeaderName {
  fn hash<H: Hasher>(&self, state: &mut H) {
    for b in self.0.as_bytes() {
      state.write_u8(b.to_ascii_lowercase());
    }
  }
}

impl fmt::Display for HeaderName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Parsed `Vary` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Vary {
  /// No `Vary` header present; every request matches the single variant.
  None,
  /// `Vary: *`: the response can never be matched, and must not be cached.
  Any,
  /// The listed request header names select the variant.
  Fields(Vec<String>),
}

/// An immutable, insertion-ordered, case-insensitive header multimap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
  entries: Vec<(HeaderName, String)>,
}

impl Headers {
  pub fn new() -> Self {
    Headers::default()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn contains(&self, name: &str) -> bool {
    self
      .entries
      .iter()
      .any(|(n, _)| n.as_str().eq_ignore_ascii_case(name))
  }

  /// First value for `name`, if any.
  pub fn first(&self, name: &str) -> Option<&str> {
    self
      .entries
      .iter()
      .find(|(n, _)| n.as_str().eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Every value for `name`, in insertion order.
  pub fn get_all(&self, name: &str) -> Vec<&str> {
    self
      .entries
      .iter()
      .filter(|(n, _)| n.as_str().eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
      .collect()
  }

  /// Appends a value, keeping any existing ones.
  pub fn add(&self, name: impl Into<String>, value: impl Into<String>) -> Headers {
    let mut entries = self.entries.clone();
    entries.push((HeaderName::new(name), value.into()));
    Headers { entries }
  }

  /// Replaces every value of `name` with the single given value.
  pub fn set(&self, name: impl Into<String>, value: impl Into<String>) -> Headers {
    let name = name.into();
    let mut next = self.remove(&name);
    next.entries.push((HeaderName::new(name), value.into()));
    next
  }

  /// Drops every value of `name`.
  pub fn remove(&self, name: &str) -> Headers {
    let entries = self
      .entries
      .iter()
      .filter(|(n, _)| !n.as_str().eq_ignore_ascii_case(name))
      .cloned()
      .collect();
    Headers { entries }
  }

  /// Merges `other` onto `self`: for each field name present in `other`,
  /// every stored value of that name is replaced by `other`'s values.
  /// Names absent from `other` are untouched.
  pub fn merge(&self, other: &Headers) -> Headers {
    let mut merged = self.clone();
    for name in other.names() {
      merged = merged.remove(&name);
      for value in other.get_all(&name) {
        merged = merged.add(name.clone(), value);
      }
    }
    merged
  }

  /// Distinct field names, first-seen order.
  pub fn names(&self) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for (n, _) in &self.entries {
      if !names.iter().any(|seen| seen.eq_ignore_ascii_case(n.as_str())) {
        names.push(n.as_str().to_string());
      }
    }
    names
  }

  /// `(name, value)` pairs in insertion order.
  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
  }

  /// Parses `\r\n`-separated `Name: value` text, as found on the wire.
  /// Malformed lines are skipped.
  pub fn parse(input: &str) -> Headers {
    let mut headers = Headers::new();
    for line in input.split("\r\n").map(str::trim).filter(|l| !l.is_empty()) {
      if let Some((name, value)) = line.split_once(':') {
        let name = name.trim();
        if !name.is_empty() {
          headers = headers.add(name, value.trim());
        }
      }
    }
    headers
  }

  // ------------------------------------------------------------------
  // Typed accessors
  // ------------------------------------------------------------------

  /// Combined `Cache-Control` directives across every value of the field.
  pub fn cache_control(&self) -> CacheControl {
    CacheControl::parse_all(self.get_all(CACHE_CONTROL).into_iter())
  }

  pub fn date(&self) -> Option<SystemTime> {
    self.http_date(DATE)
  }

  pub fn with_date(&self, date: SystemTime) -> Headers {
    self.set(DATE, httpdate::fmt_http_date(date))
  }

  pub fn expires(&self) -> Option<SystemTime> {
    self.http_date(EXPIRES)
  }

  pub fn with_expires(&self, expires: SystemTime) -> Headers {
    self.set(EXPIRES, httpdate::fmt_http_date(expires))
  }

  pub fn last_modified(&self) -> Option<SystemTime> {
    self.http_date(LAST_MODIFIED)
  }

  pub fn with_last_modified(&self, lm: SystemTime) -> Headers {
    self.set(LAST_MODIFIED, httpdate::fmt_http_date(lm))
  }

  /// `Age` in seconds. Unparseable values read as absent.
  pub fn age(&self) -> Option<u64> {
    self.first(AGE).and_then(|v| v.trim().parse().ok())
  }

  pub fn with_age(&self, seconds: u64) -> Headers {
    self.set(AGE, seconds.to_string())
  }

  /// The entity tag exactly as the origin sent it, quotes and any `W/`
  /// prefix included.
  pub fn etag(&self) -> Option<&str> {
    self.first(ETAG)
  }

  pub fn vary(&self) -> Vary {
    let mut fields = Vec::new();
    for value in self.get_all(VARY) {
      for field in value.split(',').map(str::trim).filter(|f| !f.is_empty()) {
        if field == "*" {
          return Vary::Any;
        }
        fields.push(field.to_ascii_lowercase());
      }
    }
    if fields.is_empty() {
      Vary::None
    } else {
      Vary::Fields(fields)
    }
  }

  /// Methods advertised by `Allow`. Unknown tokens are skipped.
  pub fn allow(&self) -> Vec<Method> {
    self
      .get_all(ALLOW)
      .into_iter()
      .flat_map(|v| v.split(','))
      .filter_map(|m| Method::from_name(m.trim()))
      .collect()
  }

  pub fn location(&self) -> Option<Url> {
    self.first(LOCATION).and_then(|v| Url::parse(v).ok())
  }

  pub fn content_location(&self) -> Option<Url> {
    self.first(CONTENT_LOCATION).and_then(|v| Url::parse(v).ok())
  }

  pub fn content_type(&self) -> Option<&str> {
    self.first(CONTENT_TYPE)
  }

  fn http_date(&self, name: &str) -> Option<SystemTime> {
    self.first(name).and_then(|v| httpdate::parse_http_date(v).ok())
  }
}

impl fmt::Display for Headers {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, (name, value)) in self.iter().enumerate() {
      if i > 0 {
        f.write_str("\r\n")?;
      }
      write!(f, "{}: {}", name, value)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::{Duration, UNIX_EPOCH};

  #[test]
  fn lookup_is_case_insensitive() {
    let headers = Headers::new().add("Content-Type", "text/plain");
    assert_eq!(headers.first("content-type"), Some("text/plain"));
    assert_eq!(headers.first("CONTENT-TYPE"), Some("text/plain"));
    assert!(headers.contains("cOnTeNt-TyPe"));
  }

  #[test]
  fn mutation_returns_new_value() {
    let original = Headers::new().add("X-A", "1");
    let extended = original.add("X-B", "2");
    assert_eq!(original.len(), 1);
    assert_eq!(extended.len(), 2);
    assert!(!original.contains("X-B"));
  }

  #[test]
  fn set_replaces_all_values() {
    let headers = Headers::new().add("Accept", "a").add("accept", "b");
    let replaced = headers.set("Accept", "c");
    assert_eq!(replaced.get_all("accept"), vec!["c"]);
  }

  #[test]
  fn iteration_preserves_insertion_order() {
    let headers = Headers::new()
      .add("B", "2")
      .add("A", "1")
      .add("B", "3");
    let pairs: Vec<_> = headers.iter().collect();
    assert_eq!(pairs, vec![("B", "2"), ("A", "1"), ("B", "3")]);
  }

  #[test]
  fn merge_replaces_per_name() {
    let cached = Headers::new()
      .add("Cache-Control", "max-age=1")
      .add("X-Keep", "yes");
    let incoming = Headers::new().add("Cache-Control", "max-age=60");
    let merged = cached.merge(&incoming);
    assert_eq!(merged.get_all("Cache-Control"), vec!["max-age=60"]);
    assert_eq!(merged.first("X-Keep"), Some("yes"));
  }

  #[test]
  fn parse_reads_wire_format() {
    let headers = Headers::parse("Date: Thu, 01 Jan 1970 00:00:10 GMT\r\nETag: \"v1\"\r\n\r\n");
    assert_eq!(headers.len(), 2);
    assert_eq!(headers.etag(), Some("\"v1\""));
    assert_eq!(headers.date(), Some(UNIX_EPOCH + Duration::from_secs(10)));
  }

  #[test]
  fn parse_skips_malformed_lines() {
    let headers = Headers::parse("no-colon-here\r\nX-Ok: 1");
    assert_eq!(headers.len(), 1);
    assert_eq!(headers.first("X-Ok"), Some("1"));
  }

  #[test]
  fn vary_star_wins_over_fields() {
    let headers = Headers::new().add("Vary", "Accept-Language, *");
    assert_eq!(headers.vary(), Vary::Any);
  }

  #[test]
  fn vary_fields_lowercased_across_values() {
    let headers = Headers::new()
      .add("Vary", "Accept-Language")
      .add("Vary", "Accept-Encoding");
    assert_eq!(
      headers.vary(),
      Vary::Fields(vec!["accept-language".to_string(), "accept-encoding".to_string()])
    );
  }

  #[test]
  fn age_ignores_garbage() {
    assert_eq!(Headers::new().add("Age", "17").age(), Some(17));
    assert_eq!(Headers::new().add("Age", "soon").age(), None);
  }

  #[test]
  fn allow_parses_known_methods() {
    let headers = Headers::new().add("Allow", "GET, HEAD, BREW");
    assert_eq!(headers.allow(), vec![Method::Get, Method::Head]);
  }

  #[test]
  fn date_roundtrip() {
    let at = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    let headers = Headers::new().with_date(at);
    assert_eq!(headers.date(), Some(at));
  }
}
