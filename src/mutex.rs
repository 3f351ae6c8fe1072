//! Per-URI mutual exclusion
//!
//! A reference-counted lock table keyed by normalised URI string. Entries
//! exist only while someone holds or waits for the lock, so the table never
//! grows with the set of URIs ever seen. Fairness between waiters is not
//! promised; mutual exclusion between equal URIs is.

use crate::storage::normalise_uri;
use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use url::Url;

#[derive(Debug, Default)]
struct UriState {
  locked: bool,
  /// Holders plus waiters. The map entry is removed when this hits zero.
  claims: usize,
}

/// Lock registry handing out scoped [`UriLease`]s.
#[derive(Debug, Default)]
pub struct UriMutex {
  state: Mutex<HashMap<String, UriState>>,
  unlocked: Condvar,
}

impl UriMutex {
  pub fn new() -> Self {
    UriMutex::default()
  }

  /// Blocks until `uri` is exclusively held, then returns a lease that
  /// releases on drop. The fragment is ignored for identity.
  pub fn acquire(&self, uri: &Url) -> UriLease<'_> {
    let key = normalise_uri(uri).to_string();
    let mut map = self.state.lock().unwrap();
    map.entry(key.clone()).or_default().claims += 1;
    loop {
      let entry = map.get_mut(&key).unwrap();
      if !entry.locked {
        entry.locked = true;
        return UriLease { owner: self, key };
      }
      map = self.unlocked.wait(map).unwrap();
    }
  }

  /// Number of URIs currently tracked. Zero whenever no request is inside
  /// the cacheable branch.
  pub fn tracked(&self) -> usize {
    self.state.lock().unwrap().len()
  }

  fn release(&self, key: &str) {
    let mut map = self.state.lock().unwrap();
    if let Some(entry) = map.get_mut(key) {
      entry.locked = false;
      entry.claims -= 1;
      if entry.claims == 0 {
        map.remove(key);
      }
    }
    self.unlocked.notify_all();
  }
}

/// Scoped lease over one URI; dropping it releases the lock.
#[must_use = "the URI lock is released when the lease is dropped"]
pub struct UriLease<'a> {
  owner: &'a UriMutex,
  key: String,
}

impl Drop for UriLease<'_> {
  fn drop(&mut self) {
    self.owner.release(&self.key);
  }
}
