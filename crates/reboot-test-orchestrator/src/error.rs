//! Error types for the reboot test run.
//!
//! Every failure is fatal to the run. Errors are wrapped with the phase they
//! happened in ([`RunError::Initialization`], [`RunError::Cycle`]) but never
//! swallowed or retried.

use std::fmt;
use std::time::Duration;

use reboot_test_artifacts::ArtifactError;
use reboot_test_core::{BootConfiguration, Fingerprint};
use reboot_test_device::DeviceError;
use thiserror::Error;

use crate::hooks::HookPoint;

/// A result type using `RunError`.
pub type Result<T> = std::result::Result<T, RunError>;

/// The part of the run a deadline applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Device initialization (including paving).
    Initialization,
    /// One reboot cycle.
    Cycle(u32),
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialization => f.write_str("initialization"),
            Self::Cycle(n) => write!(f, "reboot cycle {n}"),
        }
    }
}

/// Where an observed fingerprint was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintSource {
    /// The session-less device query.
    Device,
    /// The live control session.
    Session,
}

impl fmt::Display for FingerprintSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device => f.write_str("device"),
            Self::Session => f.write_str("session"),
        }
    }
}

/// A disagreement between the expected and the observed device state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Mismatch {
    /// The device is running a different system image.
    #[error("expected system image {expected}, {reported_by} reports {observed}")]
    Fingerprint {
        /// Which query observed the fingerprint.
        reported_by: FingerprintSource,
        /// The expected fingerprint.
        expected: Fingerprint,
        /// The fingerprint the device reported.
        observed: Fingerprint,
    },

    /// The device booted from a different slot.
    #[error("expected boot configuration {expected}, device reports {observed}")]
    Configuration {
        /// The expected configuration.
        expected: BootConfiguration,
        /// The configuration the device reported.
        observed: BootConfiguration,
    },
}

/// Errors that end a reboot test run.
#[derive(Debug, Error)]
pub enum RunError {
    /// A phase exceeded its deadline.
    #[error("{phase} timed out after {duration:?}")]
    Timeout {
        /// The phase that timed out.
        phase: Phase,
        /// The configured deadline.
        duration: Duration,
    },

    /// A control session could not be established.
    #[error("unable to connect to device: {0}")]
    Connection(#[source] DeviceError),

    /// The device state does not match what was expected.
    #[error("device state mismatch: {0}")]
    StateMismatch(#[from] Mismatch),

    /// The device did not answer a state query.
    #[error("failed to query device state: {0}")]
    DeviceQuery(#[source] DeviceError),

    /// The reboot command failed.
    #[error("error rebooting: {0}")]
    Reboot(#[source] DeviceError),

    /// A hook script failed.
    #[error("failed to run {hook}: {reason}")]
    Hook {
        /// The hook that failed.
        hook: HookPoint,
        /// Why it failed.
        reason: String,
    },

    /// Paving failed.
    #[error("failed to pave device: {0}")]
    Pave(#[source] DeviceError),

    /// The build's package repository could not be used.
    #[error("repository error: {0}")]
    Repository(#[source] ArtifactError),

    /// The run was cancelled from outside.
    #[error("run cancelled")]
    Cancelled,

    /// The run configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Initialization failed.
    #[error("initialization failed: {0}")]
    Initialization(#[source] Box<RunError>),

    /// A reboot cycle failed.
    #[error("reboot cycle {cycle} failed: {source}")]
    Cycle {
        /// The failing cycle, starting at 1.
        cycle: u32,
        /// What went wrong.
        #[source]
        source: Box<RunError>,
    },
}

impl RunError {
    /// Wrap a device error with `wrap`, keeping cancellation distinct.
    pub(crate) fn device(wrap: fn(DeviceError) -> Self) -> impl Fn(DeviceError) -> Self {
        move |err| match err {
            DeviceError::Cancelled => Self::Cancelled,
            other => wrap(other),
        }
    }

    /// The error beneath any phase wrappers.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Initialization(inner) | Self::Cycle { source: inner, .. } => inner.root_cause(),
            other => other,
        }
    }

    /// The cycle that failed, if the run got past initialization.
    #[must_use]
    pub const fn failed_cycle(&self) -> Option<u32> {
        match self {
            Self::Cycle { cycle, .. } => Some(*cycle),
            _ => None,
        }
    }

    /// Returns true if the run ended because a deadline elapsed.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self.root_cause(), Self::Timeout { .. })
    }

    /// Returns the state mismatch that ended the run, if any.
    #[must_use]
    pub fn mismatch(&self) -> Option<&Mismatch> {
        match self.root_cause() {
            Self::StateMismatch(mismatch) => Some(mismatch),
            _ => None,
        }
    }
}

impl From<ArtifactError> for RunError {
    fn from(err: ArtifactError) -> Self {
        match err {
            ArtifactError::Cancelled => Self::Cancelled,
            other => Self::Repository(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_wrapper_reports_root_cause() {
        let err = RunError::Cycle {
            cycle: 3,
            source: Box::new(RunError::Timeout {
                phase: Phase::Cycle(3),
                duration: Duration::from_secs(5),
            }),
        };

        assert_eq!(err.failed_cycle(), Some(3));
        assert!(err.is_timeout());
        assert!(err.mismatch().is_none());
        assert_eq!(
            err.to_string(),
            "reboot cycle 3 failed: reboot cycle 3 timed out after 5s"
        );
    }

    #[test]
    fn mismatch_is_reachable_through_wrappers() {
        let mismatch = Mismatch::Configuration {
            expected: BootConfiguration::A,
            observed: BootConfiguration::B,
        };
        let err = RunError::Initialization(Box::new(mismatch.clone().into()));

        assert_eq!(err.mismatch(), Some(&mismatch));
        assert_eq!(err.failed_cycle(), None);
        assert!(!err.is_timeout());
    }

    #[test]
    fn device_cancellation_stays_cancellation() {
        let wrap = RunError::device(RunError::Reboot);
        assert!(matches!(wrap(DeviceError::Cancelled), RunError::Cancelled));
        assert!(matches!(
            wrap(DeviceError::Unreachable("down".into())),
            RunError::Reboot(_)
        ));
    }

    #[test]
    fn artifact_cancellation_stays_cancellation() {
        assert!(matches!(
            RunError::from(ArtifactError::Cancelled),
            RunError::Cancelled
        ));
    }

    #[test]
    fn phase_display() {
        assert_eq!(Phase::Initialization.to_string(), "initialization");
        assert_eq!(Phase::Cycle(7).to_string(), "reboot cycle 7");
    }
}
