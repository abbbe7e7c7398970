//! Paving builds onto devices.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use reboot_test_artifacts::Build;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::device::{cancellable, Device};
use crate::error::{DeviceError, Result};

/// Installs a build onto a device.
#[async_trait]
pub trait Paver: Send + Sync {
    /// Pave `build` onto `device` and wait for the device to come back.
    ///
    /// When `to_recovery` is set the device is paved into its recovery
    /// image instead of the main system slots.
    ///
    /// # Errors
    ///
    /// Returns an error if paving fails or is cancelled.
    async fn pave(
        &self,
        cancel: &CancellationToken,
        device: &dyn Device,
        build: &dyn Build,
        to_recovery: bool,
    ) -> Result<()>;
}

/// Paves by running the build's paving script.
///
/// The script is invoked as `<script> --device <name> [--recovery]` with
/// `REBOOT_TEST_DEVICE_URL` set to the device agent address.
#[derive(Debug, Clone, Default)]
pub struct ScriptPaver {
    command: Option<PathBuf>,
}

impl ScriptPaver {
    /// Use the paving script shipped with each build.
    #[must_use]
    pub const fn new() -> Self {
        Self { command: None }
    }

    /// Use a fixed paving command instead of the build's script.
    #[must_use]
    pub fn with_command(command: impl Into<PathBuf>) -> Self {
        Self {
            command: Some(command.into()),
        }
    }
}

#[async_trait]
impl Paver for ScriptPaver {
    async fn pave(
        &self,
        cancel: &CancellationToken,
        device: &dyn Device,
        build: &dyn Build,
        to_recovery: bool,
    ) -> Result<()> {
        let script = self.command.clone().unwrap_or_else(|| build.pave_script());

        let mut command = Command::new(&script);
        command
            .arg("--device")
            .arg(device.name())
            .env("REBOOT_TEST_DEVICE_URL", device.endpoint())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if to_recovery {
            command.arg("--recovery");
        }

        tracing::info!(
            device = %device.name(),
            build = %build.id(),
            script = %script.display(),
            to_recovery,
            "Paving device"
        );

        let mut child = command
            .spawn()
            .map_err(|e| DeviceError::Pave(format!("failed to run {}: {e}", script.display())))?;

        let status = cancellable(cancel, async {
            child
                .wait()
                .await
                .map_err(|e| DeviceError::Pave(format!("failed to wait for paver: {e}")))
        })
        .await?;

        if !status.success() {
            return Err(DeviceError::Pave(format!(
                "{} exited with {status}",
                script.display()
            )));
        }

        device.wait_for_online(cancel).await?;
        tracing::info!(device = %device.name(), "Paving complete");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::fake::FakeDevice;
    use reboot_test_artifacts::LocalBuild;
    use reboot_test_core::Fingerprint;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn write_script(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("pave.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn runs_build_script_with_arguments() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("args");
        write_script(&dir, &format!("echo \"$@\" > {}", log.display()));

        let device = FakeDevice::new("dut", Fingerprint::digest(b"old"));
        let build = LocalBuild::new(dir.path());

        ScriptPaver::new()
            .pave(&CancellationToken::new(), &device, &build, true)
            .await
            .unwrap();

        let args = std::fs::read_to_string(log).unwrap();
        assert_eq!(args.trim(), "--device dut --recovery");
    }

    #[tokio::test]
    async fn failing_script_is_an_error() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "exit 3");

        let device = FakeDevice::new("dut", Fingerprint::digest(b"old"));
        let build = LocalBuild::new("/nonexistent");

        let err = ScriptPaver::with_command(script)
            .pave(&CancellationToken::new(), &device, &build, false)
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::Pave(_)));
    }

    #[tokio::test]
    async fn missing_script_is_an_error() {
        let device = FakeDevice::new("dut", Fingerprint::digest(b"old"));
        let build = LocalBuild::new("/nonexistent");

        let err = ScriptPaver::new()
            .pave(&CancellationToken::new(), &device, &build, false)
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::Pave(_)));
    }

    #[tokio::test]
    async fn cancellation_stops_paving() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "sleep 30");

        let device = FakeDevice::new("dut", Fingerprint::digest(b"old"));
        let build = LocalBuild::new(dir.path());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = ScriptPaver::with_command(script)
            .pave(&cancel, &device, &build, false)
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::Cancelled));
    }
}
