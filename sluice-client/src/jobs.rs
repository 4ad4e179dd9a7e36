//! Job-related API endpoints

use crate::SchedulerClient;
use crate::error::Result;
use sluice_core::domain::job::JobRecord;
use sluice_core::dto::job::{CreateJob, JobStatusEntry, PruneResult};
use tracing::debug;
use uuid::Uuid;

impl SchedulerClient {
    // =============================================================================
    // Intake and status
    // =============================================================================

    /// Queue a new job
    ///
    /// Fails with a 409 API error if `req.id` is already known.
    pub async fn submit_job(&self, req: CreateJob) -> Result<JobRecord> {
        let url = self.url("/api/jobs");
        debug!("POST {}", url);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Status lines for every job the scheduler still holds, in arrival order
    pub async fn list_jobs(&self) -> Result<Vec<JobStatusEntry>> {
        let url = self.url("/api/jobs");
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Full record of a single job
    pub async fn get_job(&self, job_id: Uuid) -> Result<JobRecord> {
        let url = self.url(&format!("/api/jobs/{}", job_id));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Operator actions
    // =============================================================================

    /// Cancel a job that has not been handed to the cluster yet
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<JobRecord> {
        let url = self.url(&format!("/api/jobs/{}/cancel", job_id));
        debug!("POST {}", url);
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }

    /// Report that the cluster finished a scheduled job
    pub async fn mark_finished(&self, job_id: Uuid) -> Result<JobRecord> {
        let url = self.url(&format!("/api/jobs/{}/finished", job_id));
        debug!("POST {}", url);
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }

    /// Drop terminal job records, returning how many were removed
    pub async fn prune_jobs(&self) -> Result<usize> {
        let url = self.url("/api/jobs/prune");
        let response = self.client.post(&url).send().await?;

        let result: PruneResult = self.handle_response(response).await?;
        Ok(result.removed)
    }

    /// Ask the scheduler to run a reconciliation pass soon
    pub async fn trigger_reconcile(&self) -> Result<()> {
        let url = self.url("/api/reconcile");
        let response = self.client.post(&url).send().await?;

        self.handle_empty_response(response).await
    }
}
