//! Data Transfer Objects
//!
//! This module contains DTOs exchanged between the scheduler, its clients and
//! the cluster API. DTOs are lightweight representations of domain entities
//! optimized for network transfer.

pub mod job;
