//! Sluice Core
//!
//! Core types shared by the Sluice admission scheduler, its HTTP client and
//! the operator CLI.
//!
//! This crate contains:
//! - Domain types: job records, job states, namespace quota snapshots and
//!   the workload call a definition describes
//! - DTOs: Data transfer objects for the scheduler and cluster APIs

pub mod domain;
pub mod dto;
