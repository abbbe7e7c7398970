//! Single-owner control session handling.
//!
//! A [`SessionSlot`] holds at most one live session. Connecting into an
//! occupied slot closes the previous session first, and closing always leaves
//! the slot empty. Callers hand the slot to helpers by `&mut` so a helper
//! (such as a hook that reboots the device) can replace the session in place.

use reboot_test_artifacts::PackageRepository;
use reboot_test_device::{Device, Session};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, RunError};

/// Holder for the live control session, if any.
#[derive(Debug, Default)]
pub struct SessionSlot {
    session: Option<Box<dyn Session>>,
}

impl SessionSlot {
    /// Create an empty slot.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if the slot holds a session.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.session.is_some()
    }

    /// The live session, if any.
    #[must_use]
    pub fn get(&self) -> Option<&dyn Session> {
        self.session.as_deref()
    }

    /// The live session.
    ///
    /// # Errors
    ///
    /// Returns `RunError::Connection` if the slot is empty.
    pub fn require(&self) -> Result<&dyn Session> {
        self.get().ok_or_else(|| {
            RunError::Connection(reboot_test_device::DeviceError::SessionClosed(
                "no live session".to_string(),
            ))
        })
    }

    /// Open a fresh session into the slot.
    ///
    /// Any session already held is closed first. A failed connect leaves the
    /// slot empty and is not retried.
    ///
    /// # Errors
    ///
    /// Returns `RunError::Connection` if the device refuses the session.
    pub async fn connect(
        &mut self,
        cancel: &CancellationToken,
        device: &dyn Device,
        repository: &PackageRepository,
    ) -> Result<()> {
        self.close().await;

        let session = device
            .start_session(cancel, repository)
            .await
            .map_err(RunError::device(RunError::Connection))?;

        tracing::debug!(device = %device.name(), session_id = %session.id(), "Session established");
        self.session = Some(session);
        Ok(())
    }

    /// Close and drop the live session, if any.
    ///
    /// Close failures are logged and ignored: this is called ahead of
    /// reboots, where the transport may already be gone.
    pub async fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                tracing::debug!(session_id = %session.id(), error = %e, "Ignoring session close failure");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reboot_test_core::Fingerprint;
    use reboot_test_device::fake::FakeDevice;

    fn repo() -> PackageRepository {
        PackageRepository::local("/repo")
    }

    #[tokio::test]
    async fn connect_and_close() {
        let device = FakeDevice::new("dut", Fingerprint::digest(b"v1"));
        let cancel = CancellationToken::new();
        let mut slot = SessionSlot::empty();
        assert!(!slot.is_live());
        assert!(slot.require().is_err());

        slot.connect(&cancel, &device, &repo()).await.unwrap();
        assert!(slot.is_live());
        assert!(slot.require().is_ok());

        slot.close().await;
        assert!(!slot.is_live());
        // Closing an empty slot is a no-op.
        slot.close().await;

        let stats = device.stats();
        assert_eq!(stats.sessions_started, 1);
        assert_eq!(stats.sessions_closed, 1);
        assert_eq!(stats.live_sessions, 0);
    }

    #[tokio::test]
    async fn reconnect_replaces_session() {
        let device = FakeDevice::new("dut", Fingerprint::digest(b"v1"));
        let cancel = CancellationToken::new();
        let mut slot = SessionSlot::empty();

        slot.connect(&cancel, &device, &repo()).await.unwrap();
        slot.connect(&cancel, &device, &repo()).await.unwrap();

        let stats = device.stats();
        assert_eq!(stats.sessions_started, 2);
        assert_eq!(stats.max_live_sessions, 1);
        assert_eq!(stats.live_sessions, 1);
    }

    #[tokio::test]
    async fn failed_connect_leaves_slot_empty() {
        let device = FakeDevice::new("dut", Fingerprint::digest(b"v1"));
        device.refuse_sessions_after(0);
        let mut slot = SessionSlot::empty();

        let result = slot
            .connect(&CancellationToken::new(), &device, &repo())
            .await;
        assert!(matches!(result, Err(RunError::Connection(_))));
        assert!(!slot.is_live());
    }
}
