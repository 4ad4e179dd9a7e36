//! Sluice HTTP Client
//!
//! A small, typed client for the scheduler daemon's HTTP API, used by the
//! `sluice` command line tool.
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use sluice_client::SchedulerClient;
//! use sluice_core::dto::job::CreateJob;
//!
//! #[tokio::main]
//! async fn main() -> sluice_client::Result<()> {
//!     let client = SchedulerClient::new("http://localhost:8080");
//!
//!     let job = client
//!         .submit_job(CreateJob {
//!             id: None,
//!             definition: json!({
//!                 "method": "train",
//!                 "parameters": { "epochs": 3 },
//!                 "resources": { "cpu": "500m" }
//!             }),
//!         })
//!         .await?;
//!
//!     println!("Queued job {} at position {}", job.id, job.sequence);
//!     Ok(())
//! }
//! ```

pub mod error;
mod jobs;

// Re-export commonly used types
pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the scheduler API
#[derive(Debug, Clone)]
pub struct SchedulerClient {
    /// Base URL of the scheduler (e.g., "http://localhost:8080")
    base_url: String,
    client: Client,
}

impl SchedulerClient {
    /// Create a new scheduler client
    ///
    /// # Example
    /// ```
    /// use sluice_client::SchedulerClient;
    ///
    /// let client = SchedulerClient::new("http://localhost:8080/");
    /// assert_eq!(client.base_url(), "http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a client around a configured reqwest Client (timeouts, TLS, proxies)
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Checks the status code and deserializes the JSON body
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::from_body(status.as_u16(), &body));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Checks the status code of a response whose body is ignored
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::from_body(status.as_u16(), &body));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = SchedulerClient::new("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.url("/api/jobs"), "http://localhost:8080/api/jobs");
    }

    #[test]
    fn test_client_with_custom_client() {
        let client = SchedulerClient::with_client("http://scheduler:9000", Client::new());
        assert_eq!(client.base_url(), "http://scheduler:9000");
    }
}
