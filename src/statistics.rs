//! Hit and miss counters
//!
//! Monotonic counters incremented inside the cacheable branch: a hit when
//! storage produced a usable item, a miss otherwise (including forced
//! refreshes, which bypass the lookup). Relaxed ordering is enough; the
//! counters are informational and only promise eventual consistency.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct CacheStatistics {
  hits: AtomicU64,
  misses: AtomicU64,
}

impl CacheStatistics {
  pub fn new() -> Self {
    CacheStatistics::default()
  }

  pub(crate) fn hit(&self) {
    self.hits.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn miss(&self) {
    self.misses.fetch_add(1, Ordering::Relaxed);
  }

  pub fn hits(&self) -> u64 {
    self.hits.load(Ordering::Relaxed)
  }

  pub fn misses(&self) -> u64 {
    self.misses.load(Ordering::Relaxed)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn counters_start_at_zero_and_accumulate() {
    let stats = CacheStatistics::new();
    assert_eq!(stats.hits(), 0);
    assert_eq!(stats.misses(), 0);

    stats.hit();
    stats.hit();
    stats.miss();
    assert_eq!(stats.hits(), 2);
    assert_eq!(stats.misses(), 1);
  }
}
