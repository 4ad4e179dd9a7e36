//! Core domain types
//!
//! This module contains the domain structures used across Sluice crates.
//! The scheduler persists and mutates them, the client and CLI only read them.

pub mod job;
pub mod quota;
pub mod workload;
