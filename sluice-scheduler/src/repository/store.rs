//! Queue store
//!
//! Durable key/value representation of the job records of one namespace.

use async_trait::async_trait;
use sluice_core::domain::job::JobRecord;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Repository trait for persisted job records
///
/// Implementations must be linearizable for the records of one namespace:
/// a `save` that returned `Ok` is visible to every later `load` or `get`.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Loads every record, ordered by `sequence` ascending
    async fn load(&self) -> Result<Vec<JobRecord>, StoreError>;

    /// Fetches a single record
    async fn get(&self, id: Uuid) -> Result<Option<JobRecord>, StoreError>;

    /// Inserts or replaces a record
    async fn save(&self, record: &JobRecord) -> Result<(), StoreError>;

    /// Deletes a record, returning whether it existed
    ///
    /// The id of a removed record is retired and stays reported by
    /// `is_retired` for the lifetime of the store.
    async fn remove(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Whether `id` belonged to a record that has since been removed
    async fn is_retired(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Reserves the next arrival sequence number
    ///
    /// The high-water mark is durable: numbers are never handed out twice,
    /// even after the records that carried them have been removed.
    async fn allocate_sequence(&self) -> Result<u64, StoreError>;
}

/// Errors raised by queue store implementations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt record {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
