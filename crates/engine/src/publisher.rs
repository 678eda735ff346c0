//! Majority-commit publisher
//!
//! When the replication layer learns that a new point is majority
//! committed it runs the push side of the snapshot protocol:
//!
//! ```text
//! 1. prepare_for_snapshot_creation() - quiesce the recovery unit
//! 2. create_snapshot(name)           - take the named snapshot
//! 3. advance_committed(name, ts)     - make it the committed view
//! 4. prune_unneeded_snapshots()      - optional, drop older snapshots
//! ```
//!
//! Publishes are serialized here so that names reach the coordinator in
//! order; a stale publish is skipped instead of tripping the coordinator's
//! monotonicity invariant.

use keel_concurrency::SnapshotCoordinator;
use keel_core::traits::RecoveryUnit;
use keel_core::{KeelResult, SnapshotName, Timestamp};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of a publish attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The snapshot became the committed view
    Published,
    /// A newer or equal name had already been published
    Stale {
        /// Newest published name at the time of the call
        current: SnapshotName,
    },
}

/// Drives committed-snapshot advances from replication progress
pub struct SnapshotPublisher {
    coordinator: Arc<SnapshotCoordinator>,
    prune_on_advance: bool,
    last_published: Mutex<Option<SnapshotName>>,
}

impl SnapshotPublisher {
    /// Create a publisher over `coordinator`
    pub fn new(coordinator: Arc<SnapshotCoordinator>, prune_on_advance: bool) -> Self {
        Self {
            coordinator,
            prune_on_advance,
            last_published: Mutex::new(None),
        }
    }

    /// The coordinator this publisher drives
    pub fn coordinator(&self) -> &Arc<SnapshotCoordinator> {
        &self.coordinator
    }

    /// Publish `name` at retention timestamp `ts` as the committed snapshot
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be created. The committed
    /// view is unchanged in that case and the call may be retried.
    pub fn publish(
        &self,
        recovery_unit: &mut dyn RecoveryUnit,
        name: SnapshotName,
        ts: Timestamp,
    ) -> KeelResult<PublishOutcome> {
        let mut last = self.last_published.lock();
        if let Some(current) = *last {
            if name <= current {
                debug!(
                    target: "keel::publisher",
                    snapshot = %name,
                    current = %current,
                    "Skipping stale publish"
                );
                return Ok(PublishOutcome::Stale { current });
            }
        }

        self.coordinator.prepare_for_snapshot_creation(recovery_unit)?;
        self.coordinator.create_snapshot(recovery_unit, name)?;
        self.coordinator.advance_committed(name, ts);
        if self.prune_on_advance {
            self.coordinator.prune_unneeded_snapshots();
        }

        *last = Some(name);
        debug!(
            target: "keel::publisher",
            snapshot = %name,
            timestamp = %ts,
            "Published committed snapshot"
        );
        Ok(PublishOutcome::Published)
    }

    /// Discard every named snapshot and the committed view
    ///
    /// For rollback and loss-of-majority recovery. Name ordering restarts
    /// afterwards, but timestamps must not fall below the retention floor
    /// already pushed to the engine.
    pub fn resync(&self) {
        let mut last = self.last_published.lock();
        self.coordinator.drop_all_snapshots();
        *last = None;
        info!(target: "keel::publisher", "Snapshot state resynchronized");
    }
}
