//! Job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A queued unit of work
///
/// Records are ordered by `sequence`, which is assigned on enqueue and never
/// changes afterwards. The scheduler persists one record per job id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub sequence: u64,
    /// Workload description handed to the cluster unchanged
    pub definition: serde_json::Value,
    pub state: JobState,
    pub attempt_count: u32,
    pub next_eligible_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Creates a fresh `Pending` record
    pub fn new(id: Uuid, sequence: u64, definition: serde_json::Value, now: DateTime<Utc>) -> Self {
        Self {
            id,
            sequence,
            definition,
            state: JobState::Pending,
            attempt_count: 0,
            next_eligible_time: None,
            last_error: None,
            enqueued_at: now,
            updated_at: now,
        }
    }

    /// Whether the record has left the pending queue
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Lifecycle state of a job record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Waiting for its first admission attempt
    Pending,
    /// An admission attempt is in flight
    Admitting,
    /// Handed over to the cluster
    Scheduled,
    /// Denied for quota, waiting for `next_eligible_time`
    Backoff,
    /// Rejected for good (invalid definition, non-retryable submit error, cancel)
    Failed,
    /// The cluster reported the workload as finished
    Done,
}

impl JobState {
    /// Scheduled, Failed and Done records are no longer candidates for admission
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Scheduled | JobState::Failed | JobState::Done)
    }

    /// Returns true if `next` is reachable from `self` in one step
    ///
    /// ```text
    /// Pending   -> Admitting | Failed
    /// Backoff   -> Admitting | Failed
    /// Admitting -> Scheduled | Backoff | Failed
    /// Scheduled -> Done
    /// ```
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;

        matches!(
            (self, next),
            (Pending, Admitting)
                | (Pending, Failed)
                | (Backoff, Admitting)
                | (Backoff, Failed)
                | (Admitting, Scheduled)
                | (Admitting, Backoff)
                | (Admitting, Failed)
                | (Scheduled, Done)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "Pending"),
            JobState::Admitting => write!(f, "Admitting"),
            JobState::Scheduled => write!(f, "Scheduled"),
            JobState::Backoff => write!(f, "Backoff"),
            JobState::Failed => write!(f, "Failed"),
            JobState::Done => write!(f, "Done"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [JobState; 6] = [
        JobState::Pending,
        JobState::Admitting,
        JobState::Scheduled,
        JobState::Backoff,
        JobState::Failed,
        JobState::Done,
    ];

    #[test]
    fn test_new_record_is_pending() {
        let record = JobRecord::new(Uuid::new_v4(), 7, serde_json::json!({}), Utc::now());
        assert_eq!(record.state, JobState::Pending);
        assert_eq!(record.attempt_count, 0);
        assert_eq!(record.sequence, 7);
        assert!(record.next_eligible_time.is_none());
        assert!(!record.is_terminal());
    }

    #[test]
    fn test_admission_paths() {
        assert!(JobState::Pending.can_transition_to(JobState::Admitting));
        assert!(JobState::Backoff.can_transition_to(JobState::Admitting));
        assert!(JobState::Admitting.can_transition_to(JobState::Scheduled));
        assert!(JobState::Admitting.can_transition_to(JobState::Backoff));
        assert!(JobState::Admitting.can_transition_to(JobState::Failed));
    }

    #[test]
    fn test_pending_cannot_skip_admitting() {
        assert!(!JobState::Pending.can_transition_to(JobState::Scheduled));
        assert!(!JobState::Pending.can_transition_to(JobState::Backoff));
        assert!(!JobState::Backoff.can_transition_to(JobState::Scheduled));
    }

    #[test]
    fn test_terminal_states_only_allow_done() {
        for next in ALL {
            assert!(!JobState::Failed.can_transition_to(next));
            assert!(!JobState::Done.can_transition_to(next));
            assert_eq!(
                JobState::Scheduled.can_transition_to(next),
                next == JobState::Done
            );
        }
    }

    #[test]
    fn test_no_self_transitions() {
        for state in ALL {
            assert!(!state.can_transition_to(state));
        }
    }

    #[test]
    fn test_state_serializes_as_variant_name() {
        let json = serde_json::to_string(&JobState::Backoff).unwrap();
        assert_eq!(json, "\"Backoff\"");
        assert_eq!(JobState::Backoff.to_string(), "Backoff");
    }
}
