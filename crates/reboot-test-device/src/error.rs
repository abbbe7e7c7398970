//! Error types for device operations.

use thiserror::Error;

/// A result type using `DeviceError`.
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Errors that can occur while talking to a device.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The device agent could not be reached.
    #[error("device unreachable: {0}")]
    Unreachable(String),

    /// The device agent answered with an error status.
    #[error("device agent returned {status}: {message}")]
    Agent {
        /// HTTP status code.
        status: u16,
        /// Error message from the agent.
        message: String,
    },

    /// The device agent answered with something we could not understand.
    #[error("invalid response from device agent: {0}")]
    InvalidResponse(String),

    /// The session was closed or invalidated by a reboot.
    #[error("session {0} is closed")]
    SessionClosed(String),

    /// The paving command failed.
    #[error("paving failed: {0}")]
    Pave(String),

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<reboot_test_core::CoreError> for DeviceError {
    fn from(err: reboot_test_core::CoreError) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

impl DeviceError {
    /// Returns true if the device did not answer at all.
    #[must_use]
    pub const fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}
