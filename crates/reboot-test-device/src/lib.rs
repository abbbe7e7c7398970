//! Device transport for the reboot test orchestrator.
//!
//! This crate owns everything that talks to the device under test:
//!
//! - [`Device`]: a handle to one physical or virtual device (reboot, version
//!   query, session establishment)
//! - [`Session`]: a live control channel used to query boot state
//! - [`Paver`]: installs a build onto a device
//!
//! The production implementations speak HTTP to a control agent running on
//! the device ([`HttpDevice`]) and shell out to the build's paving script
//! ([`ScriptPaver`]). With the `test-utils` feature, [`fake`] provides an
//! in-memory device that records every interaction.
//!
//! Every async operation takes a [`CancellationToken`]. Once the token is
//! cancelled, in-flight requests, polls and child processes stop and the
//! call fails with [`DeviceError::Cancelled`].
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod device;
pub mod error;
pub mod http;
pub mod pave;

#[cfg(any(test, feature = "test-utils"))]
pub mod fake;

pub use device::{Device, Session};
pub use error::{DeviceError, Result};
pub use http::{HttpDevice, HttpDeviceConfig, HttpSession};
pub use pave::{Paver, ScriptPaver};

pub use reboot_test_core::{BootConfiguration, Fingerprint};
