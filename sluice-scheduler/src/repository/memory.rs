//! In-memory queue store
//!
//! Keeps records in process memory. Used by tests and by deployments that
//! accept losing the queue on restart.

use async_trait::async_trait;
use sluice_core::domain::job::JobRecord;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use super::store::{QueueStore, StoreError};

#[derive(Default)]
struct Inner {
    records: HashMap<Uuid, JobRecord>,
    retired: HashSet<Uuid>,
    high_water: u64,
}

/// In-memory implementation of QueueStore
#[derive(Default)]
pub struct MemoryQueueStore {
    inner: Mutex<Inner>,
}

impl MemoryQueueStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn load(&self) -> Result<Vec<JobRecord>, StoreError> {
        let inner = self.lock()?;
        let mut records: Vec<JobRecord> = inner.records.values().cloned().collect();
        records.sort_by_key(|r| r.sequence);
        Ok(records)
    }

    async fn get(&self, id: Uuid) -> Result<Option<JobRecord>, StoreError> {
        Ok(self.lock()?.records.get(&id).cloned())
    }

    async fn save(&self, record: &JobRecord) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.high_water = inner.high_water.max(record.sequence);
        inner.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        if inner.records.remove(&id).is_none() {
            return Ok(false);
        }
        inner.retired.insert(id);
        Ok(true)
    }

    async fn is_retired(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.lock()?.retired.contains(&id))
    }

    async fn allocate_sequence(&self) -> Result<u64, StoreError> {
        let mut inner = self.lock()?;
        inner.high_water += 1;
        Ok(inner.high_water)
    }
}
