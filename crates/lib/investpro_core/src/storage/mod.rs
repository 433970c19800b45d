//! Persistent key/value storage.
//!
//! The session core only needs string keys and string values plus an atomic
//! batch write. [`MemoryStore`] backs tests and embedders, [`FileStore`]
//! backs the CLI.

pub mod file;
pub mod memory;

use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage file is corrupt: {0}")]
    Corrupt(String),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// A single mutation inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOp {
    Put(String, String),
    Remove(String),
}

impl StorageOp {
    pub fn put(key: &str, value: &str) -> Self {
        StorageOp::Put(key.to_string(), value.to_string())
    }

    pub fn remove(key: &str) -> Self {
        StorageOp::Remove(key.to_string())
    }
}

/// Durable string key/value store.
pub trait KeyValueStore: Send + Sync {
    /// Read a single key.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Apply every op or none of them.
    fn apply(&self, ops: &[StorageOp]) -> Result<(), StorageError>;
}
