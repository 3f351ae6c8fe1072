//! Hash-sharded payload file tree
//!
//! Payload bytes live at `root/ab/cd/<hex>` where `<hex>` is the storage
//! key's digest. Files are written once through a temp file and an atomic
//! rename, then only ever read or deleted.

use crate::payload::{FilePayload, Payload};
use crate::storage::Key;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct FileStore {
  root: PathBuf,
}

fn tmp_path(path: &Path) -> PathBuf {
  let mut name = path.as_os_str().to_owned();
  name.push(".tmp");
  PathBuf::from(name)
}

impl FileStore {
  pub fn new(root: impl Into<PathBuf>) -> io::Result<FileStore> {
    let root = root.into();
    fs::create_dir_all(&root)?;
    Ok(FileStore { root })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Sharded location for `key`'s payload.
  pub fn path_for(&self, key: &Key) -> PathBuf {
    let digest = key.digest();
    self.root.join(&digest[0..2]).join(&digest[2..4]).join(&digest)
  }

  /// Streams `payload` into the tree and returns a file-backed handle.
  pub fn write(&self, key: &Key, payload: &dyn Payload) -> io::Result<FilePayload> {
    let path = self.path_for(key);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }

    let tmp = tmp_path(&path);
    let result = (|| {
      let mut file = File::create(&tmp)?;
      let mut reader = payload.reader()?;
      io::copy(&mut reader, &mut file)?;
      file.sync_all()?;
      fs::rename(&tmp, &path)
    })();
    if result.is_err() {
      let _ = fs::remove_file(&tmp);
    }
    result?;

    Ok(FilePayload::new(path, payload.media_type().map(str::to_string)))
  }

  /// Quietly drops `key`'s payload file, if present.
  pub fn remove(&self, key: &Key) {
    let path = self.path_for(key);
    let _ = fs::remove_file(&path);
  }

  /// Deletes every payload shard. Files other than the two-character shard
  /// directories (the snapshot lives in the root too) are left alone.
  pub fn clear(&self) {
    let Ok(entries) = fs::read_dir(&self.root) else {
      return;
    };
    for entry in entries.flatten() {
      let path = entry.path();
      let is_shard = path.is_dir()
        && entry
          .file_name()
          .to_str()
          .map(|name| name.len() == 2 && name.bytes().all(|b| b.is_ascii_hexdigit()))
          .unwrap_or(false);
      if is_shard {
        let _ = fs::remove_dir_all(&path);
      }
    }
  }
}
