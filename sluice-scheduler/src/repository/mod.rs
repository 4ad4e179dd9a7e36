//! Repository layer
//!
//! Repositories abstract the external collaborators of the scheduler:
//! the durable queue store and the cluster (resource probe and job submitter).
//! They contain no scheduling logic.
//!
//! All repositories are trait-based to enable testing and mocking.

mod cluster;
mod file;
mod http_cluster;
mod memory;
mod store;

// Re-export traits
pub use cluster::{JobSubmitter, ResourceProbe};
pub use store::QueueStore;

// Re-export errors
pub use cluster::{ProbeError, SubmitError};
pub use store::StoreError;

// Re-export implementations
pub use file::FileQueueStore;
pub use http_cluster::HttpClusterClient;
pub use memory::MemoryQueueStore;
