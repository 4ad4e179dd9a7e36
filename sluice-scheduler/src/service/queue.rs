//! Pending queue manager
//!
//! Owns the FCFS view of a namespace's job records. Every mutation goes
//! through the queue store before it is returned to the caller, and
//! mutations are serialized so that a transition is a single
//! read-validate-write step.

use chrono::{DateTime, Utc};
use sluice_core::domain::job::{JobRecord, JobState};
use sluice_core::dto::job::{CreateJob, JobStatusEntry};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::repository::{QueueStore, StoreError};

/// Recorded as `last_error` when an operator cancels a job
pub const CANCELLED_REASON: &str = "cancelled";

/// Errors raised by the queue manager
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job {0} already exists")]
    DuplicateJob(Uuid),

    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("job {id} cannot move from {from} to {to}")]
    InvalidTransition { id: Uuid, from: JobState, to: JobState },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Field changes applied together with a state transition
///
/// `None` leaves a field untouched; `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub attempt_count: Option<u32>,
    pub next_eligible_time: Option<Option<DateTime<Utc>>>,
    pub last_error: Option<Option<String>>,
}

impl JobUpdate {
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(Some(error.into()));
        self
    }

    fn apply(self, record: &mut JobRecord) {
        if let Some(attempts) = self.attempt_count {
            record.attempt_count = record.attempt_count.max(attempts);
        }
        if let Some(next) = self.next_eligible_time {
            record.next_eligible_time = next;
        }
        if let Some(error) = self.last_error {
            record.last_error = error;
        }
    }
}

impl From<&JobRecord> for JobUpdate {
    /// Carries over every mutable field of an already updated record
    fn from(record: &JobRecord) -> Self {
        Self {
            attempt_count: Some(record.attempt_count),
            next_eligible_time: Some(record.next_eligible_time),
            last_error: Some(record.last_error.clone()),
        }
    }
}

/// Pending queue manager for one namespace
pub struct PendingQueueManager {
    store: Arc<dyn QueueStore>,
    write_lock: Mutex<()>,
}

impl PendingQueueManager {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Appends a new `Pending` record with the next arrival sequence
    pub async fn enqueue(&self, req: CreateJob) -> Result<JobRecord, QueueError> {
        let _guard = self.write_lock.lock().await;

        let id = req.id.unwrap_or_else(Uuid::new_v4);
        // Pruned ids stay taken so a retried submission cannot run twice.
        if self.store.get(id).await?.is_some() || self.store.is_retired(id).await? {
            return Err(QueueError::DuplicateJob(id));
        }

        let sequence = self.store.allocate_sequence().await?;
        let record = JobRecord::new(id, sequence, req.definition, Utc::now());
        self.store.save(&record).await?;

        info!("Enqueued job {} with sequence {}", id, sequence);
        Ok(record)
    }

    /// Non-terminal records ordered by arrival
    ///
    /// The result is a snapshot of persisted state; calling again re-reads
    /// the store.
    pub async fn list_ordered(&self) -> Result<Vec<JobRecord>, QueueError> {
        let records = self.store.load().await?;
        Ok(records.into_iter().filter(|r| !r.is_terminal()).collect())
    }

    /// Status lines for every stored record, terminal ones included
    pub async fn list_statuses(&self) -> Result<Vec<JobStatusEntry>, QueueError> {
        let records = self.store.load().await?;
        Ok(records.iter().map(JobStatusEntry::from).collect())
    }

    pub async fn get(&self, id: Uuid) -> Result<JobRecord, QueueError> {
        self.store.get(id).await?.ok_or(QueueError::NotFound(id))
    }

    /// Moves a record to `new_state` and applies `update` atomically
    pub async fn transition(
        &self,
        id: Uuid,
        new_state: JobState,
        update: JobUpdate,
    ) -> Result<JobRecord, QueueError> {
        let _guard = self.write_lock.lock().await;

        let record = self.store.get(id).await?.ok_or(QueueError::NotFound(id))?;
        self.apply_transition(record, new_state, update).await
    }

    /// Moves a waiting record to `Admitting` for evaluation
    ///
    /// Re-reads the record under the write lock, so a job cancelled or pruned
    /// after the caller took its snapshot yields `None` instead of an error.
    /// A record already `Admitting` is returned unchanged.
    pub async fn claim(&self, id: Uuid) -> Result<Option<JobRecord>, QueueError> {
        let _guard = self.write_lock.lock().await;

        let Some(record) = self.store.get(id).await? else {
            return Ok(None);
        };

        match record.state {
            JobState::Admitting => Ok(Some(record)),
            JobState::Pending | JobState::Backoff => self
                .apply_transition(record, JobState::Admitting, JobUpdate::default())
                .await
                .map(Some),
            _ => Ok(None),
        }
    }

    /// Caller must hold `write_lock`
    async fn apply_transition(
        &self,
        mut record: JobRecord,
        new_state: JobState,
        update: JobUpdate,
    ) -> Result<JobRecord, QueueError> {
        if !record.state.can_transition_to(new_state) {
            return Err(QueueError::InvalidTransition {
                id: record.id,
                from: record.state,
                to: new_state,
            });
        }

        let from = record.state;
        record.state = new_state;
        update.apply(&mut record);
        record.updated_at = Utc::now();

        self.store.save(&record).await?;

        debug!("Job {} moved {} -> {}", record.id, from, new_state);
        Ok(record)
    }

    /// Operator cancel of a job that has not been handed to the cluster
    pub async fn cancel(&self, id: Uuid) -> Result<JobRecord, QueueError> {
        let record = self
            .transition(
                id,
                JobState::Failed,
                JobUpdate {
                    next_eligible_time: Some(None),
                    ..JobUpdate::default()
                }
                .with_error(CANCELLED_REASON),
            )
            .await?;

        info!("Job {} cancelled", id);
        Ok(record)
    }

    /// Records that the cluster finished a scheduled job
    pub async fn mark_done(&self, id: Uuid) -> Result<JobRecord, QueueError> {
        self.transition(id, JobState::Done, JobUpdate::default())
            .await
    }

    /// Deletes one terminal record, returning whether it was removed
    ///
    /// Records that are still waiting or admitting are left alone.
    pub async fn remove_terminal(&self, id: Uuid) -> Result<bool, QueueError> {
        let _guard = self.write_lock.lock().await;

        let record = self.store.get(id).await?.ok_or(QueueError::NotFound(id))?;
        if !record.is_terminal() {
            return Ok(false);
        }
        Ok(self.store.remove(id).await?)
    }

    /// Deletes every terminal record, returning how many were removed
    pub async fn prune_terminal(&self) -> Result<usize, QueueError> {
        let _guard = self.write_lock.lock().await;

        let mut removed = 0;
        for record in self.store.load().await? {
            if record.is_terminal() && self.store.remove(record.id).await? {
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Pruned {} finished job record(s)", removed);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryQueueStore;
    use serde_json::json;

    fn manager() -> PendingQueueManager {
        PendingQueueManager::new(Arc::new(MemoryQueueStore::new()))
    }

    fn job(definition: serde_json::Value) -> CreateJob {
        CreateJob {
            id: None,
            definition,
        }
    }

    #[tokio::test]
    async fn test_enqueue_assigns_increasing_sequences() {
        let queue = manager();
        let mut last = 0;
        for n in 0..5 {
            let record = queue.enqueue(job(json!({ "n": n }))).await.unwrap();
            assert!(record.sequence > last);
            assert_eq!(record.state, JobState::Pending);
            last = record.sequence;
        }

        let ordered = queue.list_ordered().await.unwrap();
        let ns: Vec<i64> = ordered
            .iter()
            .map(|r| r.definition["n"].as_i64().unwrap())
            .collect();
        assert_eq!(ns, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected() {
        let queue = manager();
        let id = Uuid::new_v4();
        queue
            .enqueue(CreateJob {
                id: Some(id),
                definition: json!({}),
            })
            .await
            .unwrap();

        let err = queue
            .enqueue(CreateJob {
                id: Some(id),
                definition: json!({ "other": true }),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::DuplicateJob(dup) if dup == id));
        assert_eq!(queue.list_statuses().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transition_validates_table() {
        let queue = manager();
        let record = queue.enqueue(job(json!({}))).await.unwrap();

        let err = queue
            .transition(record.id, JobState::Scheduled, JobUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            QueueError::InvalidTransition {
                from: JobState::Pending,
                to: JobState::Scheduled,
                ..
            }
        ));

        let admitting = queue
            .transition(record.id, JobState::Admitting, JobUpdate::default())
            .await
            .unwrap();
        assert_eq!(admitting.state, JobState::Admitting);

        // persisted, not just returned
        assert_eq!(queue.get(record.id).await.unwrap().state, JobState::Admitting);
    }

    #[tokio::test]
    async fn test_transition_unknown_id() {
        let queue = manager();
        let err = queue
            .transition(Uuid::new_v4(), JobState::Admitting, JobUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_attempt_count_never_decreases() {
        let queue = manager();
        let record = queue.enqueue(job(json!({}))).await.unwrap();
        queue
            .transition(record.id, JobState::Admitting, JobUpdate::default())
            .await
            .unwrap();
        queue
            .transition(
                record.id,
                JobState::Backoff,
                JobUpdate {
                    attempt_count: Some(3),
                    ..JobUpdate::default()
                },
            )
            .await
            .unwrap();
        queue
            .transition(record.id, JobState::Admitting, JobUpdate::default())
            .await
            .unwrap();
        let record = queue
            .transition(
                record.id,
                JobState::Backoff,
                JobUpdate {
                    attempt_count: Some(1),
                    ..JobUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(record.attempt_count, 3);
    }

    #[tokio::test]
    async fn test_terminal_records_leave_ordered_view_but_keep_status() {
        let queue = manager();
        let first = queue.enqueue(job(json!({}))).await.unwrap();
        let second = queue.enqueue(job(json!({}))).await.unwrap();

        queue.cancel(first.id).await.unwrap();

        let ordered = queue.list_ordered().await.unwrap();
        assert_eq!(ordered.len(), 1);
        assert_eq!(ordered[0].id, second.id);

        let statuses = queue.list_statuses().await.unwrap();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].state, JobState::Failed);
        assert_eq!(statuses[0].last_error.as_deref(), Some(CANCELLED_REASON));
    }

    #[tokio::test]
    async fn test_cancel_scheduled_job_is_invalid() {
        let queue = manager();
        let record = queue.enqueue(job(json!({}))).await.unwrap();
        queue
            .transition(record.id, JobState::Admitting, JobUpdate::default())
            .await
            .unwrap();
        queue
            .transition(record.id, JobState::Scheduled, JobUpdate::default())
            .await
            .unwrap();

        assert!(matches!(
            queue.cancel(record.id).await,
            Err(QueueError::InvalidTransition { .. })
        ));
        assert_eq!(
            queue.mark_done(record.id).await.unwrap().state,
            JobState::Done
        );
    }

    #[tokio::test]
    async fn test_prune_keeps_sequences_monotonic() {
        let queue = manager();
        let first = queue.enqueue(job(json!({}))).await.unwrap();
        queue.cancel(first.id).await.unwrap();
        let pending = queue.enqueue(job(json!({}))).await.unwrap();

        assert_eq!(queue.prune_terminal().await.unwrap(), 1);
        assert_eq!(queue.list_statuses().await.unwrap().len(), 1);

        let next = queue.enqueue(job(json!({}))).await.unwrap();
        assert!(next.sequence > pending.sequence);
        assert!(next.sequence > first.sequence);
    }

    #[tokio::test]
    async fn test_pruned_id_cannot_be_enqueued_again() {
        let queue = manager();
        let id = Uuid::new_v4();
        queue
            .enqueue(CreateJob {
                id: Some(id),
                definition: json!({}),
            })
            .await
            .unwrap();
        queue.cancel(id).await.unwrap();
        assert_eq!(queue.prune_terminal().await.unwrap(), 1);
        assert!(matches!(queue.get(id).await, Err(QueueError::NotFound(_))));

        let err = queue
            .enqueue(CreateJob {
                id: Some(id),
                definition: json!({}),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::DuplicateJob(dup) if dup == id));
        assert!(queue.list_statuses().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_terminal_skips_live_records() {
        let queue = manager();
        let live = queue.enqueue(job(json!({}))).await.unwrap();
        let done = queue.enqueue(job(json!({}))).await.unwrap();
        queue.cancel(done.id).await.unwrap();

        assert!(!queue.remove_terminal(live.id).await.unwrap());
        assert!(queue.remove_terminal(done.id).await.unwrap());
        assert!(matches!(
            queue.remove_terminal(done.id).await,
            Err(QueueError::NotFound(_))
        ));
        assert_eq!(queue.get(live.id).await.unwrap().state, JobState::Pending);
    }

    #[tokio::test]
    async fn test_claim_moves_waiting_jobs_to_admitting() {
        let queue = manager();
        let record = queue.enqueue(job(json!({}))).await.unwrap();

        let claimed = queue.claim(record.id).await.unwrap().unwrap();
        assert_eq!(claimed.state, JobState::Admitting);

        // an interrupted admission is resumed as is
        let again = queue.claim(record.id).await.unwrap().unwrap();
        assert_eq!(again, claimed);
    }

    #[tokio::test]
    async fn test_claim_skips_jobs_that_left_the_queue() {
        let queue = manager();
        let cancelled = queue.enqueue(job(json!({}))).await.unwrap();
        queue.cancel(cancelled.id).await.unwrap();

        assert!(queue.claim(cancelled.id).await.unwrap().is_none());
        assert!(queue.claim(Uuid::new_v4()).await.unwrap().is_none());
        assert_eq!(
            queue.get(cancelled.id).await.unwrap().state,
            JobState::Failed
        );
    }
}
