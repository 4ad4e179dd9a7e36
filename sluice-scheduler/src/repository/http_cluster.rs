//! HTTP cluster client
//!
//! Talks to the cluster API gateway:
//! - `GET  {cluster}/api/namespaces/{ns}/quota` returns a quota snapshot
//! - `POST {cluster}/api/namespaces/{ns}/jobs` creates a job

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use sluice_core::domain::quota::NamespaceQuotaView;
use sluice_core::dto::job::SubmitJobRequest;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::cluster::{JobSubmitter, ProbeError, ResourceProbe, SubmitError};

/// HTTP implementation of ResourceProbe and JobSubmitter
pub struct HttpClusterClient {
    client: Client,
    cluster_url: String,
}

impl HttpClusterClient {
    /// Creates a new cluster client
    ///
    /// # Arguments
    /// * `cluster_url` - Base URL of the cluster API (e.g., "http://localhost:8001")
    /// * `timeout` - Per-request timeout
    pub fn new(cluster_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let cluster_url = cluster_url.into();

        Ok(Self {
            client,
            cluster_url: cluster_url.trim_end_matches('/').to_string(),
        })
    }

    fn namespace_url(&self, namespace: &str, tail: &str) -> String {
        format!("{}/api/namespaces/{}/{}", self.cluster_url, namespace, tail)
    }
}

#[async_trait]
impl ResourceProbe for HttpClusterClient {
    async fn quota_view(&self, namespace: &str) -> Result<NamespaceQuotaView, ProbeError> {
        let url = self.namespace_url(namespace, "quota");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProbeError::Unavailable(format!("GET {}: {}", url, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProbeError::Unavailable(format!(
                "GET {}: {} - {}",
                url, status, body
            )));
        }

        response
            .json::<NamespaceQuotaView>()
            .await
            .map_err(|e| ProbeError::Unavailable(format!("invalid quota response: {}", e)))
    }
}

#[async_trait]
impl JobSubmitter for HttpClusterClient {
    async fn submit(
        &self,
        namespace: &str,
        id: Uuid,
        definition: &serde_json::Value,
    ) -> Result<(), SubmitError> {
        let url = self.namespace_url(namespace, "jobs");

        let response = self
            .client
            .post(&url)
            .json(&SubmitJobRequest {
                id,
                definition: definition.clone(),
            })
            .send()
            .await
            .map_err(|e| SubmitError::Unavailable(format!("POST {}: {}", url, e)))?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            debug!("Job {} already exists in namespace {}", id, namespace);
        }

        let body = if status.is_success() {
            String::new()
        } else {
            response.text().await.unwrap_or_default()
        };

        classify_submit_response(status, &body)
    }
}

/// Maps a job creation response onto the submit contract
///
/// 409 means the id is already known to the cluster, which counts as success.
/// Quota rejections come back as 403 with an "exceeded quota" message.
pub(crate) fn classify_submit_response(status: StatusCode, body: &str) -> Result<(), SubmitError> {
    if status.is_success() || status == StatusCode::CONFLICT {
        return Ok(());
    }

    let message = format!("{} - {}", status, body.trim());

    if status == StatusCode::FORBIDDEN && body.to_ascii_lowercase().contains("exceeded quota") {
        return Err(SubmitError::QuotaExceeded(message));
    }

    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        return Err(SubmitError::Unavailable(message));
    }

    Err(SubmitError::Rejected(message))
}
