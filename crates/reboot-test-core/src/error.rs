//! Common error types for the reboot test orchestrator.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while parsing core value types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The input is not valid hexadecimal.
    #[error("invalid hex encoding")]
    InvalidHex,

    /// The decoded fingerprint has the wrong length.
    #[error("invalid fingerprint length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// Expected byte length.
        expected: usize,
        /// Actual byte length.
        got: usize,
    },

    /// The boot configuration name is not recognised.
    #[error("unknown boot configuration: {0}")]
    UnknownConfiguration(String),
}
