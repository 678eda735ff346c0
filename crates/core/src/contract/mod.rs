//! Contract types shared with the engine and the replication layer
//!
//! - `snapshot_name`: identifier of a named engine snapshot
//! - `timestamp`: retention and read-point timestamps
//!
//! Both types are opaque and ordered. Neither supports arithmetic.

pub mod snapshot_name;
pub mod timestamp;

pub use snapshot_name::SnapshotName;
pub use timestamp::{Timestamp, TIMESTAMP_HEX_WIDTH};
