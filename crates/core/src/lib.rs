//! Core types and traits for Keel
//!
//! This crate defines the foundational types used throughout the system:
//! - SnapshotName: identifier of a named engine snapshot
//! - Timestamp: retention and read-point timestamps
//! - ConfigString: builder for the engine's `key=value` configuration strings
//! - Error: recoverable error hierarchy (`KeelError`, `EngineError`)
//! - Invariant: fatal checks that terminate instead of returning
//! - Traits: engine, recovery-unit, and replication-tracker contracts

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config_string;
pub mod contract;
pub mod error;
pub mod invariant;
pub mod traits;

pub use config_string::ConfigString;
pub use contract::{SnapshotName, Timestamp, TIMESTAMP_HEX_WIDTH};
pub use error::{EngineError, EngineResult, KeelError, KeelResult};
pub use traits::{EngineConnection, EngineSession, OplogReadSource, RecoveryUnit};
