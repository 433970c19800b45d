//! JSON file store.
//!
//! The whole map lives in one JSON object. Every batch rewrites the file via
//! a temporary sibling and an atomic rename, so readers see either the old
//! or the new map. Temp files are created owner-only, which carries over to
//! the renamed file.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::{KeyValueStore, StorageError, StorageOp};

/// File name used inside a data directory.
pub const SESSION_FILE_NAME: &str = "session.json";

pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store at `<dir>/session.json`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(SESSION_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw)
            .map_err(|e| StorageError::Corrupt(format!("{}: {e}", self.path.display())))
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let body = serde_json::to_vec_pretty(map)
            .map_err(|e| StorageError::Corrupt(format!("serialize: {e}")))?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StorageError::Io(e.error))?;

        debug!(path = %self.path.display(), keys = map.len(), "session file written");
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(self.read_map()?.remove(key))
    }

    fn apply(&self, ops: &[StorageOp]) -> Result<(), StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::LockPoisoned)?;
        let (mut map, recovered) = match self.read_map() {
            Ok(map) => (map, false),
            Err(StorageError::Corrupt(reason)) => {
                warn!(%reason, "discarding unreadable session file");
                (BTreeMap::new(), true)
            }
            Err(e) => return Err(e),
        };
        let before = map.clone();
        for op in ops {
            match op {
                StorageOp::Put(k, v) => {
                    map.insert(k.clone(), v.clone());
                }
                StorageOp::Remove(k) => {
                    map.remove(k);
                }
            }
        }
        if !recovered && map == before && self.path.exists() {
            return Ok(());
        }
        if map.is_empty() && !self.path.exists() {
            return Ok(());
        }
        self.write_map(&map)
    }
}
