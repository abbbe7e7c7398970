//! Device and session abstractions.
//!
//! These traits abstract the device transport, allowing the orchestrator to
//! drive real hardware through [`crate::HttpDevice`] and an in-memory device
//! in tests.

use std::fmt;

use async_trait::async_trait;
use reboot_test_artifacts::PackageRepository;
use reboot_test_core::{BootConfiguration, Fingerprint};
use tokio_util::sync::CancellationToken;

use crate::error::{DeviceError, Result};

/// A handle to one device under test.
///
/// The orchestrator owns exactly one `Device` for the whole run and calls
/// [`Device::close`] once when the run ends.
#[async_trait]
pub trait Device: Send + Sync {
    /// Device name used in logs and passed to paving and hook scripts.
    fn name(&self) -> &str;

    /// Address of the device control agent.
    fn endpoint(&self) -> &str;

    /// Query the fingerprint of the running system image.
    ///
    /// This is a lightweight check that does not need a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be reached.
    async fn system_image_fingerprint(&self, cancel: &CancellationToken) -> Result<Fingerprint>;

    /// Open a control session that fetches packages from `repository`.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be established. No retry is
    /// attempted.
    async fn start_session(
        &self,
        cancel: &CancellationToken,
        repository: &PackageRepository,
    ) -> Result<Box<dyn Session>>;

    /// Reboot the device and wait for it to come back.
    ///
    /// All sessions opened before the reboot are dead afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the reboot command is rejected or the device does
    /// not come back before cancellation.
    async fn reboot(&self, cancel: &CancellationToken) -> Result<()>;

    /// Wait until the device agent answers requests.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Cancelled` if cancelled before the device answers.
    async fn wait_for_online(&self, cancel: &CancellationToken) -> Result<()>;

    /// Release the device handle.
    async fn close(&self);
}

/// A live control channel to a device.
///
/// A session never survives a reboot. Implementations must release any
/// remote resources when dropped without [`Session::close`], since a session
/// may be abandoned when its owner is cancelled.
#[async_trait]
pub trait Session: Send + Sync + fmt::Debug {
    /// Session identifier assigned by the device.
    fn id(&self) -> &str;

    /// Query the active boot configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is closed or the query fails.
    async fn active_configuration(&self, cancel: &CancellationToken) -> Result<BootConfiguration>;

    /// Query the running system image fingerprint through the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is closed or the query fails.
    async fn system_image_fingerprint(&self, cancel: &CancellationToken) -> Result<Fingerprint>;

    /// Close the session. Closing an already closed session is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the device rejects the close. Callers that close a
    /// session ahead of a reboot may ignore it.
    async fn close(&mut self) -> Result<()>;
}

/// Run `fut` unless `cancel` fires first.
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(DeviceError::Cancelled),
        result = fut => result,
    }
}
