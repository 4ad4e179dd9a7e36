//! API Module
//!
//! HTTP surface of the scheduler daemon: job intake, status, operator
//! actions and manual reconcile requests.

pub mod error;
pub mod health;
pub mod job;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::scheduler::TriggerHandle;
use crate::service::PendingQueueManager;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<PendingQueueManager>,
    pub triggers: TriggerHandle,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Job endpoints
        .route("/api/jobs", post(job::submit_job))
        .route("/api/jobs", get(job::list_jobs))
        .route("/api/jobs/prune", post(job::prune_jobs))
        .route("/api/jobs/{id}", get(job::get_job))
        .route("/api/jobs/{id}/cancel", post(job::cancel_job))
        .route("/api/jobs/{id}/finished", post(job::finish_job))
        // Reconcile
        .route("/api/reconcile", post(job::request_reconcile))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
