//! Retention timestamp type
//!
//! A `Timestamp` is the engine's notion of a point in commit history. It is
//! produced by the replication layer and consumed by the engine's retention
//! and read-point machinery.
//!
//! ## Opacity
//!
//! Timestamps are ordered but never combined arithmetically. The only
//! operations are construction, comparison, and rendering for the engine.
//!
//! ## Engine rendering
//!
//! The engine's configuration parser expects timestamps as exactly sixteen
//! lowercase hexadecimal digits, zero padded. Every call site that hands a
//! timestamp to the engine goes through [`Timestamp::to_config_hex`].
//!
//! ```
//! use keel_core::Timestamp;
//!
//! let ts = Timestamp::from_u64(0x1A2B);
//! assert_eq!(ts.to_config_hex(), "0000000000001a2b");
//! ```

use serde::{Deserialize, Serialize};

/// Width of a timestamp rendered for the engine, in hex digits.
pub const TIMESTAMP_HEX_WIDTH: usize = 16;

/// Opaque, monotonic 64-bit commit-history position
///
/// ## Invariants
///
/// - Timestamps are totally ordered
/// - The zero timestamp is the beginning of history
/// - The rendered form is always exactly [`TIMESTAMP_HEX_WIDTH`] characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Beginning of history
    pub const MIN: Timestamp = Timestamp(0);

    /// Largest representable timestamp
    pub const MAX: Timestamp = Timestamp(u64::MAX);

    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create a timestamp from its raw value
    #[inline]
    pub const fn from_u64(raw: u64) -> Self {
        Timestamp(raw)
    }

    /// Parse the engine's fixed-width hex rendering
    ///
    /// Returns `None` unless `hex` is exactly sixteen hex digits.
    pub fn from_config_hex(hex: &str) -> Option<Self> {
        if hex.len() != TIMESTAMP_HEX_WIDTH || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        u64::from_str_radix(hex, 16).ok().map(Timestamp)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Raw value
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Render for the engine: 16 lowercase hex digits, zero padded
    pub fn to_config_hex(&self) -> String {
        format!("{:0width$x}", self.0, width = TIMESTAMP_HEX_WIDTH)
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::MIN
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

// ============================================================================
// From Implementations
// ============================================================================

impl From<u64> for Timestamp {
    fn from(raw: u64) -> Self {
        Timestamp::from_u64(raw)
    }
}

impl From<Timestamp> for u64 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

// ============================================================================
// Tests
// ============================================================================
