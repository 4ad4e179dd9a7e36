//! Service layer
//!
//! Services contain the scheduling logic: the FCFS pending queue, the
//! admission decision and the backoff policy. The reconciler in
//! `crate::scheduler` drives them.

mod admission;
mod backoff;
mod queue;

pub use admission::{AdmissionController, Decision, DenyReason};
pub use backoff::BackoffEngine;
pub use queue::{JobUpdate, PendingQueueManager, QueueError};
