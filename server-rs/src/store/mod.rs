//! Durable id → record mappings.
//!
//! Every store hands out and accepts the *whole* mapping. Callers follow a
//! read-modify-write cycle: `load`, change one entry, `save`. Serializing those
//! cycles is the caller's job (see `services::clans::ClanService`). File-backed
//! stores block, so async callers run them on the blocking pool.

use std::collections::BTreeMap;
use std::path::PathBuf;

pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

pub type Records<T> = BTreeMap<String, T>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Storage worker failed: {0}")]
    Worker(String),
}

pub trait RecordStore<T>: Send + Sync {
    /// Returns the persisted mapping. Missing or unreadable state yields an
    /// empty mapping; this never fails.
    fn load(&self) -> Records<T>;

    /// Replaces the persisted mapping with `records`.
    fn save(&self, records: &Records<T>) -> Result<(), StoreError>;
}
