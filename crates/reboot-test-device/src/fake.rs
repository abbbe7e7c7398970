//! In-memory device for tests.
//!
//! [`FakeDevice`] keeps its system image and boot slot in memory, counts
//! every interaction in [`FakeStats`], and can be told to misbehave: fail
//! the next reboot, come back from a reboot running a different image, hang
//! during a reboot, or refuse sessions after a number of reboots.
//!
//! Sessions carry the reboot generation they were opened in. Using one after
//! a reboot fails and is counted in [`FakeStats::stale_session_uses`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reboot_test_artifacts::{Build, PackageRepository};
use reboot_test_core::{BootConfiguration, Fingerprint};
use tokio_util::sync::CancellationToken;

use crate::device::{cancellable, Device, Session};
use crate::error::{DeviceError, Result};
use crate::pave::Paver;

/// Interaction counters recorded by a [`FakeDevice`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeStats {
    /// Completed reboots.
    pub reboots: u32,
    /// Session-less fingerprint queries.
    pub fingerprint_queries: u32,
    /// Fingerprint queries made through a session.
    pub session_fingerprint_queries: u32,
    /// Boot configuration queries.
    pub configuration_queries: u32,
    /// Sessions opened.
    pub sessions_started: u32,
    /// Sessions closed explicitly.
    pub sessions_closed: u32,
    /// Sessions currently open.
    pub live_sessions: u32,
    /// Highest number of sessions open at once.
    pub max_live_sessions: u32,
    /// Sessions still open when a reboot was issued.
    pub sessions_live_at_reboot: u32,
    /// Queries made through a session opened before the latest reboot.
    pub stale_session_uses: u32,
    /// Times the device handle was closed.
    pub closes: u32,
    /// Times the device was paved.
    pub paves: u32,
}

#[derive(Debug)]
struct State {
    fingerprint: Fingerprint,
    configuration: BootConfiguration,
    generation: u64,
    next_session: u64,
    fingerprint_after_reboot: Option<Fingerprint>,
    configuration_after_reboot: Option<BootConfiguration>,
    reboot_delay: Duration,
    fail_next_reboot: bool,
    refuse_sessions_after: Option<u32>,
    stats: FakeStats,
}

impl State {
    fn release_session(&mut self) {
        self.stats.live_sessions = self.stats.live_sessions.saturating_sub(1);
    }
}

/// An in-memory device.
///
/// Clones share state, so a test can keep a clone to inspect after handing
/// the device to the orchestrator.
#[derive(Debug, Clone)]
pub struct FakeDevice {
    name: String,
    state: Arc<Mutex<State>>,
}

impl FakeDevice {
    /// Create a device running `fingerprint` with no redundant boot slots.
    #[must_use]
    pub fn new(name: impl Into<String>, fingerprint: Fingerprint) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(State {
                fingerprint,
                configuration: BootConfiguration::Unsupported,
                generation: 0,
                next_session: 0,
                fingerprint_after_reboot: None,
                configuration_after_reboot: None,
                reboot_delay: Duration::ZERO,
                fail_next_reboot: false,
                refuse_sessions_after: None,
                stats: FakeStats::default(),
            })),
        }
    }

    /// Set the active boot configuration.
    #[must_use]
    pub fn with_configuration(self, configuration: BootConfiguration) -> Self {
        self.state.lock().configuration = configuration;
        self
    }

    /// Snapshot of the interaction counters.
    #[must_use]
    pub fn stats(&self) -> FakeStats {
        self.state.lock().stats.clone()
    }

    /// The running system image.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        self.state.lock().fingerprint
    }

    /// The active boot configuration.
    #[must_use]
    pub fn configuration(&self) -> BootConfiguration {
        self.state.lock().configuration
    }

    /// Replace the active boot configuration.
    pub fn set_configuration(&self, configuration: BootConfiguration) {
        self.state.lock().configuration = configuration;
    }

    /// Come back from the next reboot running `fingerprint`.
    pub fn change_fingerprint_after_reboot(&self, fingerprint: Fingerprint) {
        self.state.lock().fingerprint_after_reboot = Some(fingerprint);
    }

    /// Come back from the next reboot in `configuration`.
    pub fn change_configuration_after_reboot(&self, configuration: BootConfiguration) {
        self.state.lock().configuration_after_reboot = Some(configuration);
    }

    /// Make every reboot take `delay`.
    pub fn set_reboot_delay(&self, delay: Duration) {
        self.state.lock().reboot_delay = delay;
    }

    /// Reject the next reboot command.
    pub fn fail_next_reboot(&self) {
        self.state.lock().fail_next_reboot = true;
    }

    /// Refuse to open sessions once `reboots` reboots have completed.
    pub fn refuse_sessions_after(&self, reboots: u32) {
        self.state.lock().refuse_sessions_after = Some(reboots);
    }

    /// Install `fingerprint` as a pave would, booting into the primary slot.
    pub fn install(&self, fingerprint: Fingerprint) {
        let mut state = self.state.lock();
        state.fingerprint = fingerprint;
        if state.configuration.is_supported() {
            state.configuration = BootConfiguration::PRIMARY;
        }
        state.generation += 1;
        state.stats.paves += 1;
    }
}

#[async_trait]
impl Device for FakeDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn endpoint(&self) -> &str {
        "fake://device"
    }

    async fn system_image_fingerprint(&self, cancel: &CancellationToken) -> Result<Fingerprint> {
        if cancel.is_cancelled() {
            return Err(DeviceError::Cancelled);
        }
        let mut state = self.state.lock();
        state.stats.fingerprint_queries += 1;
        Ok(state.fingerprint)
    }

    async fn start_session(
        &self,
        cancel: &CancellationToken,
        _repository: &PackageRepository,
    ) -> Result<Box<dyn Session>> {
        if cancel.is_cancelled() {
            return Err(DeviceError::Cancelled);
        }
        let mut state = self.state.lock();
        if let Some(limit) = state.refuse_sessions_after {
            if state.stats.reboots >= limit {
                return Err(DeviceError::Unreachable("session refused".to_string()));
            }
        }

        state.next_session += 1;
        state.stats.sessions_started += 1;
        state.stats.live_sessions += 1;
        state.stats.max_live_sessions = state.stats.max_live_sessions.max(state.stats.live_sessions);

        Ok(Box::new(FakeSession {
            id: format!("fake-session-{}", state.next_session),
            generation: state.generation,
            closed: false,
            state: Arc::clone(&self.state),
        }))
    }

    async fn reboot(&self, cancel: &CancellationToken) -> Result<()> {
        let delay = {
            let mut state = self.state.lock();
            if std::mem::take(&mut state.fail_next_reboot) {
                return Err(DeviceError::Agent {
                    status: 500,
                    message: "reboot rejected".to_string(),
                });
            }
            state.stats.sessions_live_at_reboot += state.stats.live_sessions;
            state.generation += 1;
            state.reboot_delay
        };

        cancellable(cancel, async {
            tokio::time::sleep(delay).await;
            Ok(())
        })
        .await?;

        let mut state = self.state.lock();
        if let Some(fingerprint) = state.fingerprint_after_reboot.take() {
            state.fingerprint = fingerprint;
        }
        if let Some(configuration) = state.configuration_after_reboot.take() {
            state.configuration = configuration;
        }
        state.stats.reboots += 1;
        Ok(())
    }

    async fn wait_for_online(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(DeviceError::Cancelled);
        }
        Ok(())
    }

    async fn close(&self) {
        self.state.lock().stats.closes += 1;
    }
}

/// A session opened on a [`FakeDevice`].
#[derive(Debug)]
pub struct FakeSession {
    id: String,
    generation: u64,
    closed: bool,
    state: Arc<Mutex<State>>,
}

impl FakeSession {
    fn check(&self, state: &mut State) -> Result<()> {
        if self.closed {
            return Err(DeviceError::SessionClosed(self.id.clone()));
        }
        if state.generation != self.generation {
            state.stats.stale_session_uses += 1;
            return Err(DeviceError::Unreachable(format!(
                "session {} invalidated by reboot",
                self.id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Session for FakeSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn active_configuration(&self, cancel: &CancellationToken) -> Result<BootConfiguration> {
        if cancel.is_cancelled() {
            return Err(DeviceError::Cancelled);
        }
        let mut state = self.state.lock();
        self.check(&mut state)?;
        state.stats.configuration_queries += 1;
        Ok(state.configuration)
    }

    async fn system_image_fingerprint(&self, cancel: &CancellationToken) -> Result<Fingerprint> {
        if cancel.is_cancelled() {
            return Err(DeviceError::Cancelled);
        }
        let mut state = self.state.lock();
        self.check(&mut state)?;
        state.stats.session_fingerprint_queries += 1;
        Ok(state.fingerprint)
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut state = self.state.lock();
        state.release_session();
        state.stats.sessions_closed += 1;
        Ok(())
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        if !self.closed {
            self.state.lock().release_session();
        }
    }
}

/// A paver that installs a fixed image onto a [`FakeDevice`].
#[derive(Debug, Clone)]
pub struct FakePaver {
    device: FakeDevice,
    image: Fingerprint,
    fail: bool,
    delay: Duration,
}

impl FakePaver {
    /// Pave `device` with `image`.
    #[must_use]
    pub fn new(device: FakeDevice, image: Fingerprint) -> Self {
        Self {
            device,
            image,
            fail: false,
            delay: Duration::ZERO,
        }
    }

    /// Make every pave fail.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Make every pave take `delay` before installing.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Paver for FakePaver {
    async fn pave(
        &self,
        cancel: &CancellationToken,
        _device: &dyn Device,
        _build: &dyn Build,
        _to_recovery: bool,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(DeviceError::Cancelled);
        }
        if self.fail {
            return Err(DeviceError::Pave("fake paver failure".to_string()));
        }
        cancellable(cancel, async {
            tokio::time::sleep(self.delay).await;
            Ok(())
        })
        .await?;
        self.device.install(self.image);
        Ok(())
    }
}
