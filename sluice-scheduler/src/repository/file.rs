//! File-backed queue store
//!
//! Layout under `<data_dir>/<namespace>/`:
//! - `records/<id>.json`: one JSON document per job record
//! - `retired/<id>`: empty marker left behind by every removed record
//! - `sequence`: high-water mark of allocated sequence numbers
//!
//! Every write goes to a temporary file that is flushed to disk and then
//! renamed into place, so a crash leaves either the old or the new document
//! behind.

use async_trait::async_trait;
use sluice_core::domain::job::JobRecord;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::store::{QueueStore, StoreError};

const RECORDS_DIR: &str = "records";
const RETIRED_DIR: &str = "retired";
const SEQUENCE_FILE: &str = "sequence";

/// File implementation of QueueStore
pub struct FileQueueStore {
    root: PathBuf,
    records: PathBuf,
    retired: PathBuf,
    sequence_lock: Mutex<()>,
}

impl FileQueueStore {
    /// Opens (and creates if needed) the store for `namespace`
    pub async fn open(data_dir: impl AsRef<Path>, namespace: &str) -> Result<Self, StoreError> {
        let root = data_dir.as_ref().join(namespace);
        let records = root.join(RECORDS_DIR);
        let retired = root.join(RETIRED_DIR);

        for dir in [&records, &retired] {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| StoreError::io(dir, e))?;
        }

        debug!("Opened file queue store at {}", root.display());

        Ok(Self {
            root,
            records,
            retired,
            sequence_lock: Mutex::new(()),
        })
    }

    fn record_path(&self, id: Uuid) -> PathBuf {
        self.records.join(format!("{}.json", id))
    }

    fn retired_path(&self, id: Uuid) -> PathBuf {
        self.retired.join(id.to_string())
    }

    async fn read_record(path: &Path) -> Result<Option<JobRecord>, StoreError> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path, e)),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                path: path.to_path_buf(),
                source,
            })
    }

    async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
        let tmp = path.with_extension("tmp");

        let mut file = File::create(&tmp)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        file.write_all(contents)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        file.sync_all()
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        drop(file);

        fs::rename(&tmp, path)
            .await
            .map_err(|e| StoreError::io(path, e))?;

        if let Some(parent) = path.parent() {
            Self::sync_dir(parent).await;
        }

        Ok(())
    }

    /// Flushes a directory entry change to disk
    ///
    /// Directories cannot be opened for syncing on every platform, so a
    /// failure is logged rather than returned.
    async fn sync_dir(dir: &Path) {
        let result = match File::open(dir).await {
            Ok(handle) => handle.sync_all().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            debug!("Could not sync directory {}: {}", dir.display(), e);
        }
    }

    async fn read_high_water(&self) -> Result<u64, StoreError> {
        let path = self.root.join(SEQUENCE_FILE);

        match fs::read_to_string(&path).await {
            Ok(text) => text.trim().parse::<u64>().map_err(|e| {
                StoreError::io(
                    &path,
                    std::io::Error::new(std::io::ErrorKind::InvalidData, e),
                )
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }
}

#[async_trait]
impl QueueStore for FileQueueStore {
    async fn load(&self) -> Result<Vec<JobRecord>, StoreError> {
        let mut entries = fs::read_dir(&self.records)
            .await
            .map_err(|e| StoreError::io(&self.records, e))?;

        let mut records = Vec::new();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.records, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            match Self::read_record(&path).await? {
                Some(record) => records.push(record),
                None => warn!("Record {} vanished while loading", path.display()),
            }
        }

        records.sort_by_key(|r| r.sequence);
        Ok(records)
    }

    async fn get(&self, id: Uuid) -> Result<Option<JobRecord>, StoreError> {
        Self::read_record(&self.record_path(id)).await
    }

    async fn save(&self, record: &JobRecord) -> Result<(), StoreError> {
        let contents = serde_json::to_vec_pretty(record)?;
        Self::write_atomic(&self.record_path(record.id), &contents).await
    }

    async fn remove(&self, id: Uuid) -> Result<bool, StoreError> {
        let path = self.record_path(id);
        if !fs::try_exists(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?
        {
            return Ok(false);
        }

        // Marker first: a crash in between still keeps the id reserved.
        Self::write_atomic(&self.retired_path(id), b"").await?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                Self::sync_dir(&self.records).await;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    async fn is_retired(&self, id: Uuid) -> Result<bool, StoreError> {
        let path = self.retired_path(id);
        fs::try_exists(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))
    }

    async fn allocate_sequence(&self) -> Result<u64, StoreError> {
        let _guard = self.sequence_lock.lock().await;

        let next = self.read_high_water().await? + 1;
        Self::write_atomic(&self.root.join(SEQUENCE_FILE), next.to_string().as_bytes()).await?;

        Ok(next)
    }
}
