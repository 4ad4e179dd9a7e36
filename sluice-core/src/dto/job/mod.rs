//! Job DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::{JobRecord, JobState};

/// Request to enqueue a new job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJob {
    /// Caller-chosen id; a fresh one is generated when absent
    #[serde(default)]
    pub id: Option<Uuid>,
    pub definition: serde_json::Value,
}

/// Status line for a queued job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusEntry {
    pub id: Uuid,
    pub sequence: u64,
    pub state: JobState,
    pub attempt_count: u32,
    pub next_eligible_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl From<&JobRecord> for JobStatusEntry {
    fn from(record: &JobRecord) -> Self {
        Self {
            id: record.id,
            sequence: record.sequence,
            state: record.state,
            attempt_count: record.attempt_count,
            next_eligible_time: record.next_eligible_time,
            last_error: record.last_error.clone(),
        }
    }
}

/// Body sent to the cluster API when creating a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobRequest {
    pub id: Uuid,
    pub definition: serde_json::Value,
}

/// Result of removing finished records from the queue store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneResult {
    pub removed: usize,
}
