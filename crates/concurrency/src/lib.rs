//! Concurrency layer for Keel
//!
//! This crate implements the snapshot coordinator:
//! - SnapshotCoordinator: committed-snapshot pointer and retention floor
//! - Transaction binding to the committed snapshot or an oplog read point
//! - SnapshotMetrics: observational counters

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod manager;
mod metrics;

pub use manager::SnapshotCoordinator;
pub use metrics::SnapshotMetrics;
