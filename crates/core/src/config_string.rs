//! Engine configuration strings
//!
//! Every engine primitive takes its arguments as a plain ASCII string of the
//! form `key=value[,key=value...]`. Values may be nested groups written as
//! `key=(inner=value)`. The exact rendering is the wire contract with the
//! engine's parser:
//!
//! - snapshot names render in decimal
//! - timestamps render as exactly sixteen lowercase hex digits
//!
//! ```
//! use keel_core::config_string::ConfigString;
//! use keel_core::{SnapshotName, Timestamp};
//!
//! let cfg = ConfigString::new()
//!     .snapshot_name("snapshot", SnapshotName::from_u64(12))
//!     .build();
//! assert_eq!(cfg, "snapshot=12");
//!
//! let cfg = ConfigString::new()
//!     .timestamp("read_timestamp", Timestamp::from_u64(0x1A2B))
//!     .build();
//! assert_eq!(cfg, "read_timestamp=0000000000001a2b");
//! ```

use crate::contract::{SnapshotName, Timestamp};

/// Key naming a snapshot to create
pub const KEY_NAME: &str = "name";
/// Key selecting snapshots to drop
pub const KEY_DROP: &str = "drop";
/// Nested key: drop snapshots strictly older than the given name
pub const KEY_BEFORE: &str = "before";
/// Nested flag: drop every named snapshot
pub const KEY_ALL: &str = "all";
/// Key binding a transaction to a named snapshot
pub const KEY_SNAPSHOT: &str = "snapshot";
/// Key binding a transaction to a read timestamp
pub const KEY_READ_TIMESTAMP: &str = "read_timestamp";
/// Key moving the engine's retention floor
pub const KEY_OLDEST_TIMESTAMP: &str = "oldest_timestamp";

/// Builder for `key=value` engine configuration strings
#[derive(Debug, Default, Clone)]
pub struct ConfigString {
    buf: String,
}

impl ConfigString {
    /// Start an empty configuration string
    pub fn new() -> Self {
        Self::default()
    }

    fn separator(&mut self) {
        if !self.buf.is_empty() {
            self.buf.push(',');
        }
    }

    /// Append `key=value` with a raw value
    pub fn raw(mut self, key: &str, value: &str) -> Self {
        self.separator();
        self.buf.push_str(key);
        self.buf.push('=');
        self.buf.push_str(value);
        self
    }

    /// Append `key=<decimal>`
    pub fn uint(self, key: &str, value: u64) -> Self {
        self.raw(key, &value.to_string())
    }

    /// Append `key=<decimal snapshot name>`
    pub fn snapshot_name(self, key: &str, name: SnapshotName) -> Self {
        self.uint(key, name.as_u64())
    }

    /// Append `key=<16 hex digits>`
    pub fn timestamp(self, key: &str, ts: Timestamp) -> Self {
        self.raw(key, &ts.to_config_hex())
    }

    /// Append a bare flag (`key` with no value)
    pub fn flag(mut self, key: &str) -> Self {
        self.separator();
        self.buf.push_str(key);
        self
    }

    /// Append `key=(<nested>)`
    pub fn group(self, key: &str, nested: ConfigString) -> Self {
        self.raw(key, &format!("({})", nested.buf))
    }

    /// Finish and return the configuration string
    pub fn build(self) -> String {
        self.buf
    }
}

// ============================================================================
// Canonical strings for the snapshot protocol
// ============================================================================

/// `name=<N>`: create a named snapshot
pub fn create_snapshot(name: SnapshotName) -> String {
    ConfigString::new().snapshot_name(KEY_NAME, name).build()
}

/// `drop=(before=<N>)`: drop named snapshots strictly older than `name`
pub fn drop_before(name: SnapshotName) -> String {
    ConfigString::new()
        .group(KEY_DROP, ConfigString::new().snapshot_name(KEY_BEFORE, name))
        .build()
}

/// `drop=(all)`: drop every named snapshot
pub fn drop_all() -> String {
    ConfigString::new()
        .group(KEY_DROP, ConfigString::new().flag(KEY_ALL))
        .build()
}

/// `snapshot=<N>`: begin a transaction on a named snapshot
pub fn begin_on_snapshot(name: SnapshotName) -> String {
    ConfigString::new().snapshot_name(KEY_SNAPSHOT, name).build()
}

/// `read_timestamp=<hex>`: begin a transaction at a read timestamp
pub fn begin_at_read_timestamp(ts: Timestamp) -> String {
    ConfigString::new().timestamp(KEY_READ_TIMESTAMP, ts).build()
}

/// `oldest_timestamp=<hex>`: move the retention floor
pub fn oldest_timestamp(ts: Timestamp) -> String {
    ConfigString::new().timestamp(KEY_OLDEST_TIMESTAMP, ts).build()
}
