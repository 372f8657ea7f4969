//! Error types shared across the timing engine.

use thiserror::Error;

/// Errors surfaced by panel transport implementations.
#[derive(Debug, Clone, Error)]
pub enum LinkError {
    /// The link is not powered.
    #[error("panel link is powered down")]
    PoweredDown,

    /// The transfer did not complete in time.
    #[error("panel transfer timed out after {0} ms")]
    Timeout(u64),

    /// The transport rejected the command.
    #[error("panel transfer rejected: {0}")]
    Rejected(String),

    /// Underlying bus error.
    #[error("panel link I/O error: {0}")]
    Io(String),
}

/// Result alias for panel transfers.
pub type LinkResult<T> = Result<T, LinkError>;
