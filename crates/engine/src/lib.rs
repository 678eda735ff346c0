//! Engine integration for Keel
//!
//! This crate wires the snapshot coordinator to a storage engine:
//! - memory: in-process reference engine implementing the engine contract
//! - recovery_unit: per-operation transaction context owning a session
//! - oplog: monotonic all-committed timestamp tracker
//! - publisher: push-side majority-commit flow
//! - config: `keel.toml` settings
//! - logging: `tracing` subscriber setup

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod logging;
pub mod memory;
pub mod oplog;
pub mod publisher;
pub mod recovery_unit;

pub use config::{EngineConfig, KeelConfig, CONFIG_FILE_NAME};
pub use logging::init_logging;
pub use memory::{EngineCall, EngineOp, MemoryEngine, MemoryEngineOptions, MemorySession, ReadPoint};
pub use oplog::OplogVisibility;
pub use publisher::{PublishOutcome, SnapshotPublisher};
pub use recovery_unit::{EngineRecoveryUnit, ReadSource};
