//! Oplog visibility tracking
//!
//! The replication layer publishes the newest timestamp known to be durably
//! replicated to a majority. Readers bound to an oplog read point consult it
//! through [`OplogReadSource`].

use keel_core::traits::OplogReadSource;
use keel_core::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic all-committed timestamp
///
/// `advance` never moves the value backwards, so concurrent publishers can
/// race without coordination.
#[derive(Debug, Default)]
pub struct OplogVisibility {
    all_committed: AtomicU64,
}

impl OplogVisibility {
    /// Create a tracker starting at `initial`
    pub fn new(initial: Timestamp) -> Self {
        Self {
            all_committed: AtomicU64::new(initial.as_u64()),
        }
    }

    /// Move the all-committed timestamp forward to `ts`
    ///
    /// Returns the value after the update, which is `ts` or something newer.
    pub fn advance(&self, ts: Timestamp) -> Timestamp {
        let previous = self.all_committed.fetch_max(ts.as_u64(), Ordering::AcqRel);
        Timestamp::from_u64(previous.max(ts.as_u64()))
    }

    /// Current all-committed timestamp
    pub fn current(&self) -> Timestamp {
        Timestamp::from_u64(self.all_committed.load(Ordering::Acquire))
    }
}

impl OplogReadSource for OplogVisibility {
    fn all_committed_timestamp(&self) -> Timestamp {
        self.current()
    }
}
