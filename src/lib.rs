//! Keel - snapshot and retention coordination for MVCC storage engines
//!
//! Keel sits between a transactional storage engine and the query and
//! replication layers above it. It owns the committed-snapshot pointer and
//! the engine's retention floor, and binds reader transactions to read
//! points that are both majority committed and still retained.
//!
//! # Quick Start
//!
//! ```
//! use keel::{EngineRecoveryUnit, MemoryEngine, SnapshotCoordinator, SnapshotName, Timestamp};
//! use std::sync::Arc;
//!
//! let engine = MemoryEngine::new();
//! let coordinator = SnapshotCoordinator::new(Arc::new(engine.clone()))?;
//!
//! // Replication side: take a snapshot and make it the committed view
//! let mut writer = EngineRecoveryUnit::new(Arc::new(engine.clone()));
//! coordinator.create_snapshot(&mut writer, SnapshotName::from_u64(1))?;
//! coordinator.advance_committed(SnapshotName::from_u64(1), Timestamp::from_u64(100));
//!
//! // Reader side: pin a transaction to the committed view
//! let mut reader = EngineRecoveryUnit::new(Arc::new(engine));
//! assert_eq!(reader.begin_majority_committed(&coordinator)?, SnapshotName::from_u64(1));
//! # Ok::<(), keel::KeelError>(())
//! ```
//!
//! # Architecture
//!
//! - `keel-core`: identifiers, timestamps, config strings, errors, contracts
//! - `keel-concurrency`: the [`SnapshotCoordinator`]
//! - `keel-engine`: reference engine, recovery unit, oplog tracker,
//!   publisher, configuration, and logging

pub use keel_concurrency::{SnapshotCoordinator, SnapshotMetrics};
pub use keel_core::config_string::{self, ConfigString};
pub use keel_core::traits::{EngineConnection, EngineSession, OplogReadSource, RecoveryUnit};
pub use keel_core::{EngineError, EngineResult, KeelError, KeelResult, SnapshotName, Timestamp};
pub use keel_engine::{
    init_logging, EngineConfig, EngineOp, EngineRecoveryUnit, KeelConfig, MemoryEngine,
    MemoryEngineOptions, MemorySession, OplogVisibility, PublishOutcome, ReadPoint, ReadSource,
    SnapshotPublisher, CONFIG_FILE_NAME,
};
