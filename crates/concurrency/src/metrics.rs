//! Snapshot coordinator counters
//!
//! Counters use Relaxed ordering. They are observational only and do not
//! synchronize any other memory.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct SnapshotCounters {
    snapshots_created: AtomicU64,
    advances: AtomicU64,
    prunes: AtomicU64,
    drop_alls: AtomicU64,
    committed_binds: AtomicU64,
    oplog_binds: AtomicU64,
    not_yet_available: AtomicU64,
}

impl SnapshotCounters {
    pub(crate) fn record_snapshot_created(&self) {
        self.snapshots_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_advance(&self) {
        self.advances.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_prune(&self) {
        self.prunes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drop_all(&self) {
        self.drop_alls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_committed_bind(&self) {
        self.committed_binds.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_oplog_bind(&self) {
        self.oplog_binds.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_not_yet_available(&self) {
        self.not_yet_available.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> SnapshotMetrics {
        SnapshotMetrics {
            snapshots_created: self.snapshots_created.load(Ordering::Relaxed),
            advances: self.advances.load(Ordering::Relaxed),
            prunes: self.prunes.load(Ordering::Relaxed),
            drop_alls: self.drop_alls.load(Ordering::Relaxed),
            committed_binds: self.committed_binds.load(Ordering::Relaxed),
            oplog_binds: self.oplog_binds.load(Ordering::Relaxed),
            not_yet_available: self.not_yet_available.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the coordinator's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotMetrics {
    /// Named snapshots successfully created
    pub snapshots_created: u64,
    /// Committed-snapshot advances
    pub advances: u64,
    /// Prune calls that reached the engine
    pub prunes: u64,
    /// Drop-all resynchronizations
    pub drop_alls: u64,
    /// Transactions bound to the committed snapshot
    pub committed_binds: u64,
    /// Transactions bound to an oplog read point
    pub oplog_binds: u64,
    /// Committed binds rejected because no committed snapshot existed
    pub not_yet_available: u64,
}
