//! User-supplied hook scripts.
//!
//! Hooks run at three points: before initialization, after initialization
//! and after each reboot cycle. An empty script is a no-op; a failing script
//! ends the run.

use std::fmt;
use std::process::Stdio;

use async_trait::async_trait;
use reboot_test_artifacts::PackageRepository;
use reboot_test_device::Device;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, RunError};
use crate::session::SessionSlot;

/// A lifecycle point where a hook may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    /// Before the device is initialized.
    BeforeInit,
    /// After initialization validated the device.
    AfterInit,
    /// After a reboot cycle validated the device.
    AfterTest,
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeforeInit => f.write_str("before-init-script"),
            Self::AfterInit => f.write_str("after-init-script"),
            Self::AfterTest => f.write_str("after-test-script"),
        }
    }
}

/// Executes hook scripts.
#[async_trait]
pub trait HookRunner: Send + Sync {
    /// Run `script` for `hook` against the device.
    ///
    /// `session` is the caller's session slot, if it has one. The runner may
    /// replace the session in place (for example, when the script reboots the
    /// device).
    ///
    /// # Errors
    ///
    /// Returns `RunError::Hook` if the script fails.
    async fn run(
        &self,
        cancel: &CancellationToken,
        hook: HookPoint,
        script: &str,
        device: &dyn Device,
        repository: &PackageRepository,
        session: Option<&mut SessionSlot>,
    ) -> Result<()>;
}

/// Run the hook configured for `hook`, doing nothing when `script` is empty.
///
/// # Errors
///
/// Returns the runner's error unchanged.
pub async fn run_hook(
    runner: &dyn HookRunner,
    cancel: &CancellationToken,
    hook: HookPoint,
    script: &str,
    device: &dyn Device,
    repository: &PackageRepository,
    session: Option<&mut SessionSlot>,
) -> Result<()> {
    let script = script.trim();
    if script.is_empty() {
        tracing::debug!(%hook, "No script configured");
        return Ok(());
    }

    tracing::info!(%hook, script, "Running hook");
    runner
        .run(cancel, hook, script, device, repository, session)
        .await
}

/// Runs hooks with `sh -c`.
///
/// The script sees the device through `REBOOT_TEST_DEVICE_NAME` and
/// `REBOOT_TEST_DEVICE_URL`, and the build's packages through
/// `REBOOT_TEST_REPOSITORY_DIR` and `REBOOT_TEST_REPOSITORY_URL`. A live
/// session is closed before the script starts and re-established after it
/// exits, since the script is free to reboot the device.
#[derive(Debug, Clone)]
pub struct ScriptHookRunner {
    shell: String,
}

impl ScriptHookRunner {
    /// Create a runner using `/bin/sh`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_shell("/bin/sh")
    }

    /// Create a runner using a custom shell.
    #[must_use]
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ScriptHookRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HookRunner for ScriptHookRunner {
    async fn run(
        &self,
        cancel: &CancellationToken,
        hook: HookPoint,
        script: &str,
        device: &dyn Device,
        repository: &PackageRepository,
        session: Option<&mut SessionSlot>,
    ) -> Result<()> {
        let mut session = session.filter(|slot| slot.is_live());
        if let Some(slot) = session.as_deref_mut() {
            slot.close().await;
        }

        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(script)
            .env("REBOOT_TEST_DEVICE_NAME", device.name())
            .env("REBOOT_TEST_DEVICE_URL", device.endpoint())
            .env("REBOOT_TEST_REPOSITORY_DIR", repository.dir())
            .env("REBOOT_TEST_REPOSITORY_URL", repository.url())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RunError::Hook {
                hook,
                reason: format!("failed to start: {e}"),
            })?;

        let status = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(RunError::Cancelled),
            status = child.wait() => status.map_err(|e| RunError::Hook {
                hook,
                reason: format!("failed to wait: {e}"),
            })?,
        };

        if !status.success() {
            return Err(RunError::Hook {
                hook,
                reason: format!("script exited with {status}"),
            });
        }

        if let Some(slot) = session {
            slot.connect(cancel, device, repository).await?;
        }

        tracing::debug!(%hook, "Hook finished");
        Ok(())
    }
}
