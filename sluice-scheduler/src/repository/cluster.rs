//! Cluster collaborators
//!
//! The scheduler talks to the cluster through two narrow traits: one that
//! reports the quota usage of a namespace and one that creates jobs in it.

use async_trait::async_trait;
use sluice_core::domain::quota::NamespaceQuotaView;
use thiserror::Error;
use uuid::Uuid;

/// Reports quota usage and limits for a namespace
#[async_trait]
pub trait ResourceProbe: Send + Sync {
    /// Fetches a fresh snapshot of the namespace quota
    async fn quota_view(&self, namespace: &str) -> Result<NamespaceQuotaView, ProbeError>;
}

/// Creates jobs in the cluster
///
/// Submissions are keyed by job id. Submitting an id the cluster already
/// knows must be reported as success so that retries after a crash never
/// create a second workload.
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    async fn submit(
        &self,
        namespace: &str,
        id: Uuid,
        definition: &serde_json::Value,
    ) -> Result<(), SubmitError>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("resource probe unavailable: {0}")]
    Unavailable(String),
}

/// Structured submission failure
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// The cluster refused the job because the namespace quota is exhausted
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The cluster could not be reached or answered with a server error
    #[error("cluster unavailable: {0}")]
    Unavailable(String),

    /// The cluster rejected the job for a reason waiting will not fix
    #[error("submission rejected: {0}")]
    Rejected(String),
}

impl SubmitError {
    /// Whether retrying later can succeed
    pub fn is_transient(&self) -> bool {
        !matches!(self, SubmitError::Rejected(_))
    }
}
