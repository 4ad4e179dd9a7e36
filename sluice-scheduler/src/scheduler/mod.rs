//! Scheduler layer
//!
//! Hosts the reconciliation pass and the loop that decides when to run it.
//! Passes are triggered periodically, on enqueue, on job completion and on
//! operator request.

pub mod driver;
pub mod reconciler;

pub use driver::{ReconcileDriver, Trigger, TriggerHandle};
pub use reconciler::Reconciler;
