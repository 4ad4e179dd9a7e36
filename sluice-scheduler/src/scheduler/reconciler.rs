//! Reconciler
//!
//! One reconciliation pass walks the pending queue of a namespace in arrival
//! order and tries to admit jobs against a fresh quota snapshot. The walk
//! stops at the first job that has to wait for quota, so a later, smaller job
//! never overtakes it.
//!
//! The reconciler keeps no state between passes. Everything it needs is
//! reloaded from the queue store, which makes restarts safe: a job left in
//! `Admitting` by an interrupted pass is simply evaluated again, and the
//! submitter treats a repeated id as already created. A job cancelled after
//! the queue snapshot was taken is skipped when the pass tries to claim it.

use chrono::{DateTime, Utc};
use sluice_core::domain::job::{JobRecord, JobState};
use sluice_core::domain::quota::NamespaceQuotaView;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::repository::{JobSubmitter, ProbeError, ResourceProbe, SubmitError};
use crate::service::{
    AdmissionController, BackoffEngine, Decision, DenyReason, JobUpdate, PendingQueueManager,
    QueueError,
};

/// Errors that abort a pass
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("resource probe timed out after {0:?}")]
    ProbeTimeout(Duration),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl ReconcileError {
    /// Infrastructure failures that the next pass may not hit again
    ///
    /// Anything else points at a bug or a corrupted store.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ReconcileError::Probe(_)
                | ReconcileError::ProbeTimeout(_)
                | ReconcileError::Queue(QueueError::Store(_))
        )
    }
}

/// What a single pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Jobs for which an admission decision was made
    pub evaluated: usize,
    pub scheduled: Vec<Uuid>,
    pub backed_off: Vec<Uuid>,
    pub failed: Vec<Uuid>,
    /// Head-of-line job that ended the pass, if any
    pub blocked_on: Option<Uuid>,
}

enum Outcome {
    Scheduled,
    BackedOff,
    Failed,
}

/// Reconciliation loop body for one namespace
pub struct Reconciler {
    namespace: String,
    queue: Arc<PendingQueueManager>,
    probe: Arc<dyn ResourceProbe>,
    submitter: Arc<dyn JobSubmitter>,
    admission: AdmissionController,
    backoff: BackoffEngine,
    call_timeout: Duration,
    prune_scheduled: bool,
    pass_lock: Mutex<()>,
}

impl Reconciler {
    pub fn new(
        namespace: impl Into<String>,
        queue: Arc<PendingQueueManager>,
        probe: Arc<dyn ResourceProbe>,
        submitter: Arc<dyn JobSubmitter>,
        backoff: BackoffEngine,
        call_timeout: Duration,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            queue,
            probe,
            submitter,
            admission: AdmissionController::new(),
            backoff,
            call_timeout,
            prune_scheduled: false,
            pass_lock: Mutex::new(()),
        }
    }

    /// Deletes a job's record as soon as the cluster accepted it
    pub fn with_prune_scheduled(mut self, prune: bool) -> Self {
        self.prune_scheduled = prune;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Runs one pass against the current time
    pub async fn run_once(&self) -> Result<PassReport, ReconcileError> {
        self.run_once_at(Utc::now()).await
    }

    /// Runs one pass as if the clock read `now`
    ///
    /// Passes for the namespace are serialized; a caller arriving while a
    /// pass is in flight waits for it and then runs its own.
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> Result<PassReport, ReconcileError> {
        let _pass = self.pass_lock.lock().await;

        let mut quota = self.refresh_quota().await?;
        let pending = self.queue.list_ordered().await?;
        let mut report = PassReport::default();

        debug!(
            "Reconciling {} pending job(s) in namespace {}",
            pending.len(),
            self.namespace
        );

        for job in pending {
            if job.state == JobState::Backoff && !self.backoff.is_eligible(&job, now) {
                debug!(
                    "Job {} (sequence {}) backing off until {:?}, holding the queue",
                    job.id, job.sequence, job.next_eligible_time
                );
                report.blocked_on = Some(job.id);
                break;
            }

            let id = job.id;
            if job.state == JobState::Admitting {
                info!("Resuming interrupted admission of job {}", id);
            }

            let Some(job) = self.queue.claim(id).await? else {
                debug!("Job {} left the queue since the snapshot, skipping", id);
                continue;
            };

            report.evaluated += 1;

            match self.evaluate(&job, &mut quota, now).await? {
                Outcome::Scheduled => report.scheduled.push(job.id),
                Outcome::Failed => report.failed.push(job.id),
                Outcome::BackedOff => {
                    report.backed_off.push(job.id);
                    report.blocked_on = Some(job.id);
                    break;
                }
            }
        }

        Ok(report)
    }

    async fn refresh_quota(&self) -> Result<NamespaceQuotaView, ReconcileError> {
        match timeout(self.call_timeout, self.probe.quota_view(&self.namespace)).await {
            Ok(view) => Ok(view?),
            Err(_) => Err(ReconcileError::ProbeTimeout(self.call_timeout)),
        }
    }

    async fn evaluate(
        &self,
        job: &JobRecord,
        quota: &mut NamespaceQuotaView,
        now: DateTime<Utc>,
    ) -> Result<Outcome, ReconcileError> {
        let requirements = match self.admission.try_admit(job, quota) {
            Decision::Admit(requirements) => requirements,
            Decision::Deny(DenyReason::QuotaExceeded(reason)) => {
                self.back_off(job, now, &reason).await?;
                return Ok(Outcome::BackedOff);
            }
            Decision::Deny(DenyReason::Invalid(reason)) => {
                self.fail(job, &reason).await?;
                return Ok(Outcome::Failed);
            }
        };

        match self.submit(job).await {
            Ok(()) => {
                let scheduled = self.backoff.on_admitted(job);
                self.queue
                    .transition(job.id, JobState::Scheduled, JobUpdate::from(&scheduled))
                    .await?;
                quota.reserve(&requirements);

                info!(
                    "Scheduled job {} (sequence {}) in namespace {}",
                    job.id, job.sequence, self.namespace
                );

                if self.prune_scheduled && self.queue.remove_terminal(job.id).await? {
                    debug!("Removed record of scheduled job {}", job.id);
                }
                Ok(Outcome::Scheduled)
            }
            Err(e) if e.is_transient() => {
                self.back_off(job, now, &e.to_string()).await?;
                Ok(Outcome::BackedOff)
            }
            Err(e) => {
                self.fail(job, &e.to_string()).await?;
                Ok(Outcome::Failed)
            }
        }
    }

    async fn submit(&self, job: &JobRecord) -> Result<(), SubmitError> {
        let call = self
            .submitter
            .submit(&self.namespace, job.id, &job.definition);

        match timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SubmitError::Unavailable(format!(
                "submission timed out after {:?}",
                self.call_timeout
            ))),
        }
    }

    async fn back_off(
        &self,
        job: &JobRecord,
        now: DateTime<Utc>,
        reason: &str,
    ) -> Result<(), ReconcileError> {
        let next = self.backoff.on_denied(job, now, reason);
        self.queue
            .transition(job.id, JobState::Backoff, JobUpdate::from(&next))
            .await?;

        info!(
            "Job {} backing off (attempt {}, eligible at {:?}): {}",
            job.id, next.attempt_count, next.next_eligible_time, reason
        );
        Ok(())
    }

    async fn fail(&self, job: &JobRecord, reason: &str) -> Result<(), ReconcileError> {
        self.queue
            .transition(
                job.id,
                JobState::Failed,
                JobUpdate {
                    next_eligible_time: Some(None),
                    ..JobUpdate::default()
                }
                .with_error(reason),
            )
            .await?;

        warn!("Job {} failed permanently: {}", job.id, reason);
        Ok(())
    }
}
