//! Job API Handlers
//!
//! Intake, status and operator actions on the pending queue. Handlers that
//! can unblock the queue fire a reconcile trigger after committing.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use sluice_core::domain::job::JobRecord;
use sluice_core::dto::job::{CreateJob, JobStatusEntry, PruneResult};
use uuid::Uuid;

use super::AppState;
use crate::api::error::ApiResult;
use crate::scheduler::Trigger;

// =============================================================================
// Intake and status
// =============================================================================

/// POST /api/jobs
pub async fn submit_job(
    State(state): State<AppState>,
    req: Result<Json<CreateJob>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<JobRecord>)> {
    let Json(req) = req?;
    let record = state.queue.enqueue(req).await?;

    tracing::info!("Accepted job {} (sequence {})", record.id, record.sequence);
    state.triggers.fire(Trigger::JobEnqueued(record.id));

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/jobs
pub async fn list_jobs(State(state): State<AppState>) -> ApiResult<Json<Vec<JobStatusEntry>>> {
    tracing::debug!("Listing job statuses");
    Ok(Json(state.queue.list_statuses().await?))
}

/// GET /api/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobRecord>> {
    tracing::debug!("Getting job: {}", id);
    Ok(Json(state.queue.get(id).await?))
}

// =============================================================================
// Operator actions
// =============================================================================

/// POST /api/jobs/{id}/cancel
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobRecord>> {
    let record = state.queue.cancel(id).await?;
    state.triggers.fire(Trigger::JobCancelled(id));
    Ok(Json(record))
}

/// POST /api/jobs/{id}/finished
///
/// Reported once the cluster has finished a scheduled job; its quota is
/// released, so waiting jobs get another chance.
pub async fn finish_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobRecord>> {
    let record = state.queue.mark_done(id).await?;
    tracing::info!("Job {} finished", id);
    state.triggers.fire(Trigger::JobFinished(id));
    Ok(Json(record))
}

/// POST /api/jobs/prune
pub async fn prune_jobs(State(state): State<AppState>) -> ApiResult<Json<PruneResult>> {
    let removed = state.queue.prune_terminal().await?;
    Ok(Json(PruneResult { removed }))
}

/// POST /api/reconcile
pub async fn request_reconcile(State(state): State<AppState>) -> StatusCode {
    state.triggers.fire(Trigger::Manual);
    StatusCode::ACCEPTED
}
