//! Named snapshot identifier
//!
//! A `SnapshotName` identifies a named snapshot inside the engine. Names are
//! handed out by the same monotonic authority that advances the committed
//! snapshot, so ordering by name is ordering by commit history.

use serde::{Deserialize, Serialize};

/// Opaque, totally ordered identifier of a named engine snapshot
///
/// Names support comparison only. They render in decimal for the engine.
///
/// ```
/// use keel_core::SnapshotName;
///
/// let name = SnapshotName::from_u64(42);
/// assert_eq!(name.to_string(), "42");
/// assert!(SnapshotName::from_u64(7) < name);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SnapshotName(u64);

impl SnapshotName {
    /// Create a name from its raw value
    #[inline]
    pub const fn from_u64(raw: u64) -> Self {
        SnapshotName(raw)
    }

    /// Raw value
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SnapshotName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SnapshotName {
    fn from(raw: u64) -> Self {
        SnapshotName(raw)
    }
}
