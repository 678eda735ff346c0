//! Error types for Keel
//!
//! Two tiers exist:
//!
//! - **Recoverable** errors are [`KeelError`] values returned through
//!   [`KeelResult`]. Callers inspect them and decide whether to retry.
//! - **Fatal** conditions are not errors at all. They go through
//!   [`crate::invariant`] and end the process.
//!
//! Engine primitives report failures as [`EngineError`], which carries the
//! engine's numeric return code.

use thiserror::Error;

/// Result type alias for Keel operations
pub type KeelResult<T> = std::result::Result<T, KeelError>;

/// Result type alias for raw engine calls
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Failure reported by an engine primitive
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("engine error {code}: {message}")]
pub struct EngineError {
    /// Engine return code (never zero)
    pub code: i32,
    /// Human-readable detail
    pub message: String,
}

impl EngineError {
    /// Named object does not exist
    pub const NOT_FOUND: i32 = 2;
    /// Resource is busy
    pub const BUSY: i32 = 16;
    /// Named object already exists
    pub const EXISTS: i32 = 17;
    /// Malformed configuration or illegal request
    pub const INVALID: i32 = 22;
    /// Operation on a closed handle
    pub const CLOSED: i32 = -31_800;

    /// Create an engine error
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        EngineError {
            code,
            message: message.into(),
        }
    }

    /// Short name for a well-known code
    pub fn code_name(&self) -> &'static str {
        match self.code {
            Self::NOT_FOUND => "ENOENT",
            Self::BUSY => "EBUSY",
            Self::EXISTS => "EEXIST",
            Self::INVALID => "EINVAL",
            Self::CLOSED => "ECLOSED",
            _ => "UNKNOWN",
        }
    }
}

/// Recoverable error returned by Keel operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeelError {
    /// The majority-committed view has not been established yet
    ///
    /// Expected during startup or while a majority is unavailable.
    /// Callers back off and retry.
    #[error("committed snapshot not available yet: {reason}")]
    NotYetAvailable {
        /// Why the view is unavailable
        reason: String,
    },

    /// An engine call failed
    #[error("engine error {code}: {message}")]
    Engine {
        /// Engine return code
        code: i32,
        /// Detail reported by the engine
        message: String,
    },

    /// Caller supplied invalid input
    #[error("invalid input: {message}")]
    InvalidInput {
        /// What was wrong
        message: String,
    },

    /// Unexpected internal condition
    #[error("internal error: {message}")]
    Internal {
        /// Detail
        message: String,
    },
}

impl KeelError {
    /// Create a `NotYetAvailable` error
    pub fn not_yet_available(reason: impl Into<String>) -> Self {
        KeelError::NotYetAvailable {
            reason: reason.into(),
        }
    }

    /// Create an `InvalidInput` error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        KeelError::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an `Internal` error
    pub fn internal(message: impl Into<String>) -> Self {
        KeelError::Internal {
            message: message.into(),
        }
    }

    /// Whether retrying the same operation later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            KeelError::NotYetAvailable { .. } => true,
            KeelError::Engine { code, .. } => *code == EngineError::BUSY,
            KeelError::InvalidInput { .. } | KeelError::Internal { .. } => false,
        }
    }

    /// Stable name of the error kind, for logs and metrics labels
    pub fn error_code(&self) -> &'static str {
        match self {
            KeelError::NotYetAvailable { .. } => "NotYetAvailable",
            KeelError::Engine { .. } => "Engine",
            KeelError::InvalidInput { .. } => "InvalidInput",
            KeelError::Internal { .. } => "Internal",
        }
    }
}

impl From<EngineError> for KeelError {
    fn from(e: EngineError) -> Self {
        KeelError::Engine {
            code: e.code,
            message: e.message,
        }
    }
}
