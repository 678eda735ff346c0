//! Engine-backed recovery unit
//!
//! A recovery unit is the per-operation transaction context. It owns one
//! engine session, opened on first use, and knows how to start a
//! transaction from each supported read source.

use keel_concurrency::SnapshotCoordinator;
use keel_core::traits::{EngineConnection, EngineSession, OplogReadSource, RecoveryUnit};
use keel_core::{KeelError, KeelResult, SnapshotName, Timestamp};
use std::sync::Arc;
use tracing::{trace, warn};

/// Where the running transaction reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    /// Pinned to the majority-committed named snapshot
    MajorityCommitted(SnapshotName),
    /// Pinned to an oplog read timestamp
    Oplog(Timestamp),
}

/// Recovery unit over an [`EngineConnection`]
pub struct EngineRecoveryUnit {
    connection: Arc<dyn EngineConnection>,
    session: Option<Box<dyn EngineSession>>,
    active: Option<ReadSource>,
}

impl EngineRecoveryUnit {
    /// Create a recovery unit; the session is opened lazily
    pub fn new(connection: Arc<dyn EngineConnection>) -> Self {
        Self {
            connection,
            session: None,
            active: None,
        }
    }

    fn ensure_session(&mut self) -> KeelResult<&dyn EngineSession> {
        if self.session.is_none() {
            self.session = Some(self.connection.open_session()?);
        }
        self.session
            .as_deref()
            .ok_or_else(|| KeelError::internal("recovery unit session missing after open"))
    }

    fn ensure_idle(&self) -> KeelResult<()> {
        match self.active {
            None => Ok(()),
            Some(source) => Err(KeelError::invalid_input(format!(
                "recovery unit already has a transaction open on {:?}",
                source
            ))),
        }
    }

    /// Begin a transaction on the majority-committed snapshot
    ///
    /// # Errors
    ///
    /// `NotYetAvailable` if no committed snapshot exists yet, or any error
    /// from opening the session or beginning the transaction.
    pub fn begin_majority_committed(
        &mut self,
        coordinator: &SnapshotCoordinator,
    ) -> KeelResult<SnapshotName> {
        self.ensure_idle()?;
        let name = coordinator.bind_to_committed_snapshot(self.ensure_session()?)?;
        self.active = Some(ReadSource::MajorityCommitted(name));
        trace!(
            target: "keel::engine",
            snapshot = %name,
            "Transaction opened on committed snapshot"
        );
        Ok(name)
    }

    /// Begin a transaction at the oplog read point
    ///
    /// # Errors
    ///
    /// Any error from opening the session or beginning the transaction.
    pub fn begin_oplog_read(
        &mut self,
        coordinator: &SnapshotCoordinator,
        tracker: &dyn OplogReadSource,
    ) -> KeelResult<Timestamp> {
        self.ensure_idle()?;
        let read_ts = coordinator.bind_to_oplog_read_point(tracker, self.ensure_session()?)?;
        self.active = Some(ReadSource::Oplog(read_ts));
        trace!(
            target: "keel::engine",
            read_timestamp = %read_ts,
            "Transaction opened at oplog read point"
        );
        Ok(read_ts)
    }

    /// Read source of the running transaction, if any
    pub fn read_source(&self) -> Option<ReadSource> {
        self.active
    }

    /// Roll back the running transaction, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails the rollback. The transaction
    /// is then still considered open.
    pub fn abandon(&mut self) -> KeelResult<()> {
        if self.active.is_none() {
            return Ok(());
        }
        if let Some(session) = self.session.as_deref() {
            session.rollback_transaction()?;
        }
        self.active = None;
        Ok(())
    }
}

impl RecoveryUnit for EngineRecoveryUnit {
    fn prepare_for_snapshot_creation(&mut self) {
        if let Err(e) = self.abandon() {
            warn!(
                target: "keel::engine",
                error = %e,
                "Rollback before snapshot creation failed"
            );
        }
    }

    fn session(&mut self) -> KeelResult<&dyn EngineSession> {
        self.ensure_session()
    }
}

impl Drop for EngineRecoveryUnit {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close() {
                warn!(
                    target: "keel::engine",
                    error = %e,
                    "Failed to close recovery unit session"
                );
            }
        }
    }
}
