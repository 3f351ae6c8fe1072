//! Freshness and age arithmetic
//!
//! Implements the RFC 2616 §13.2 age calculation against wall-clock
//! `SystemTime`s. Clock skew between origin and cache shows up as negative
//! intervals; every subtraction here saturates at zero instead.

use crate::header::Headers;
use std::time::{Duration, SystemTime};

/// Age the response had already accumulated when it entered the cache:
/// `max(0, response_time - Date)`.
pub fn apparent_age(headers: &Headers, response_time: SystemTime) -> Duration {
  match headers.date() {
    Some(date) => response_time.duration_since(date).unwrap_or_default(),
    None => Duration::ZERO,
  }
}

/// Current age: apparent age, plus resident time in the cache, plus any
/// `Age` the origin or an intermediary reported.
pub fn current_age(headers: &Headers, response_time: SystemTime, now: SystemTime) -> Duration {
  let resident = now.duration_since(response_time).unwrap_or_default();
  let reported = Duration::from_secs(headers.age().unwrap_or(0));
  apparent_age(headers, response_time) + resident + reported
}

/// Freshness lifetime: `s-maxage`, else `max-age`, else `Expires - Date`
/// when both are present, else zero.
pub fn freshness_lifetime(headers: &Headers) -> Duration {
  let cc = headers.cache_control();
  if let Some(secs) = cc.s_maxage {
    return Duration::from_secs(secs);
  }
  if let Some(secs) = cc.max_age {
    return Duration::from_secs(secs);
  }
  match (headers.expires(), headers.date()) {
    (Some(expires), Some(date)) => expires.duration_since(date).unwrap_or_default(),
    _ => Duration::ZERO,
  }
}

/// Whether a response cached at `response_time` is still fresh at `now`.
/// `Cache-Control: no-cache` on the response forces staleness outright.
pub fn is_fresh(headers: &Headers, response_time: SystemTime, now: SystemTime) -> bool {
  if headers.cache_control().no_cache {
    return false;
  }
  current_age(headers, response_time, now) < freshness_lifetime(headers)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::UNIX_EPOCH;

  fn at(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
  }

  #[test]
  fn apparent_age_is_receive_delay() {
    let headers = Headers::new().with_date(at(100));
    assert_eq!(apparent_age(&headers, at(103)), Duration::from_secs(3));
  }

  #[test]
  fn apparent_age_saturates_on_future_date() {
    let headers = Headers::new().with_date(at(200));
    assert_eq!(apparent_age(&headers, at(100)), Duration::ZERO);
  }

  #[test]
  fn current_age_sums_components() {
    // 3s in transit, 10s resident, 5s reported by the origin.
    let headers = Headers::new().with_date(at(100)).with_age(5);
    assert_eq!(current_age(&headers, at(103), at(113)), Duration::from_secs(18));
  }

  #[test]
  fn lifetime_prefers_s_maxage() {
    let headers = Headers::new().add("Cache-Control", "max-age=10, s-maxage=60");
    assert_eq!(freshness_lifetime(&headers), Duration::from_secs(60));
  }

  #[test]
  fn lifetime_falls_back_to_expires() {
    let headers = Headers::new().with_date(at(100)).with_expires(at(160));
    assert_eq!(freshness_lifetime(&headers), Duration::from_secs(60));
  }

  #[test]
  fn lifetime_zero_without_expires_pair() {
    // Expires without Date cannot be anchored.
    let headers = Headers::new().with_expires(at(160));
    assert_eq!(freshness_lifetime(&headers), Duration::ZERO);
  }

  #[test]
  fn fresh_within_max_age() {
    let headers = Headers::new().with_date(at(100)).add("Cache-Control", "max-age=30");
    assert!(is_fresh(&headers, at(100), at(120)));
    assert!(!is_fresh(&headers, at(100), at(130)));
  }

  #[test]
  fn no_cache_is_always_stale() {
    let headers = Headers::new()
      .with_date(at(100))
      .add("Cache-Control", "max-age=3600, no-cache");
    assert!(!is_fresh(&headers, at(100), at(101)));
  }
}
