//! Engine and collaborator contracts
//!
//! The snapshot coordinator talks to three collaborators it does not own:
//!
//! - the storage engine, through [`EngineConnection`] and [`EngineSession`]
//! - the per-operation transaction context, through [`RecoveryUnit`]
//! - the replication progress tracker, through [`OplogReadSource`]
//!
//! Engine calls are synchronous metadata operations. They take a
//! configuration string (see [`crate::config_string`]) and report failures
//! as [`EngineError`](crate::error::EngineError).

use crate::contract::Timestamp;
use crate::error::{EngineResult, KeelResult};

/// A connection to the storage engine
///
/// Thread safety: shared by every session opened from it (Send + Sync).
pub trait EngineConnection: Send + Sync {
    /// Open a new session
    ///
    /// # Errors
    ///
    /// Returns an error if the engine refuses the session.
    fn open_session(&self) -> EngineResult<Box<dyn EngineSession>>;

    /// Apply a connection-wide timestamp setting
    ///
    /// Used with `oldest_timestamp=<hex>` to move the retention floor.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is malformed or rejected.
    fn set_timestamp(&self, config: &str) -> EngineResult<()>;
}

/// A single engine session
///
/// A session runs at most one transaction at a time.
pub trait EngineSession: Send + Sync {
    /// Begin a transaction
    ///
    /// `config` selects the read point: `snapshot=<N>` or
    /// `read_timestamp=<hex>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read point is unavailable or a transaction is
    /// already running on this session.
    fn begin_transaction(&self, config: &str) -> EngineResult<()>;

    /// Roll back the running transaction, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the session is closed.
    fn rollback_transaction(&self) -> EngineResult<()>;

    /// Named snapshot maintenance: `name=<N>`, `drop=(before=<N>)`,
    /// `drop=(all)`
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is malformed or rejected.
    fn snapshot(&self, config: &str) -> EngineResult<()>;

    /// Close the session, releasing its engine resources
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails to release the session.
    fn close(self: Box<Self>) -> EngineResult<()>;
}

/// Per-operation transaction context owning an engine session
pub trait RecoveryUnit {
    /// Stabilize transaction state ahead of a snapshot being taken
    fn prepare_for_snapshot_creation(&mut self);

    /// The session owned by this unit, opened on first use
    ///
    /// # Errors
    ///
    /// Returns an error if a session cannot be opened.
    fn session(&mut self) -> KeelResult<&dyn EngineSession>;
}

/// Source of the replication layer's all-committed timestamp
///
/// Implementations may block or take their own locks. Callers must not hold
/// locks that the replication layer could also need.
pub trait OplogReadSource: Send + Sync {
    /// Newest timestamp known to be durably replicated to a majority
    fn all_committed_timestamp(&self) -> Timestamp;
}
