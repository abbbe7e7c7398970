//! Device state validation.
//!
//! The same [`ExpectedState`] is checked before and after every reboot: a
//! reboot must not change the running image or the active boot slot.

use reboot_test_core::{BootConfiguration, Fingerprint};
use reboot_test_device::{Device, Session};
use tokio_util::sync::CancellationToken;

use crate::error::{FingerprintSource, Mismatch, Result, RunError};

/// The state a device is expected to be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedState {
    /// Fingerprint of the system image that should be running.
    pub fingerprint: Fingerprint,
    /// Slot the device should be running from. `Unsupported` skips the check.
    pub configuration: BootConfiguration,
}

/// Check whether the device already runs `fingerprint`.
///
/// Uses the session-less device query, so it works before any session can
/// be established.
///
/// # Errors
///
/// Returns `RunError::DeviceQuery` if the device cannot be queried.
pub async fn is_device_up_to_date(
    cancel: &CancellationToken,
    device: &dyn Device,
    fingerprint: &Fingerprint,
) -> Result<bool> {
    let observed = device
        .system_image_fingerprint(cancel)
        .await
        .map_err(RunError::device(RunError::DeviceQuery))?;
    Ok(observed == *fingerprint)
}

/// Query the active boot configuration through `session`.
///
/// # Errors
///
/// Returns `RunError::DeviceQuery` if the query fails.
pub async fn determine_active_configuration(
    cancel: &CancellationToken,
    session: &dyn Session,
) -> Result<BootConfiguration> {
    session
        .active_configuration(cancel)
        .await
        .map_err(RunError::device(RunError::DeviceQuery))
}

/// The configuration a device must boot into after being paved.
///
/// A fresh pave always boots the primary slot on devices with redundant
/// slots, whatever was active before.
#[must_use]
pub const fn configuration_after_pave(observed: BootConfiguration) -> BootConfiguration {
    match observed {
        BootConfiguration::Unsupported => BootConfiguration::Unsupported,
        BootConfiguration::A | BootConfiguration::B | BootConfiguration::Recovery => {
            BootConfiguration::PRIMARY
        }
    }
}

/// Confirm the device matches `expected`.
///
/// The boot configuration is compared first, then the running image. With
/// `strict_version_check` the image reported through the session must match
/// as well.
///
/// # Errors
///
/// Returns `RunError::StateMismatch` naming the failed check, or
/// `RunError::DeviceQuery` if the device did not answer.
pub async fn validate_device(
    cancel: &CancellationToken,
    device: &dyn Device,
    session: &dyn Session,
    expected: &ExpectedState,
    strict_version_check: bool,
) -> Result<()> {
    match expected.configuration {
        BootConfiguration::Unsupported => {
            tracing::debug!(device = %device.name(), "Device has no boot slots, skipping configuration check");
        }
        wanted @ (BootConfiguration::A | BootConfiguration::B | BootConfiguration::Recovery) => {
            let observed = determine_active_configuration(cancel, session).await?;
            if observed != wanted {
                return Err(Mismatch::Configuration {
                    expected: wanted,
                    observed,
                }
                .into());
            }
        }
    }

    let observed = device
        .system_image_fingerprint(cancel)
        .await
        .map_err(RunError::device(RunError::DeviceQuery))?;
    check_fingerprint(FingerprintSource::Device, expected.fingerprint, observed)?;

    if strict_version_check {
        let observed = session
            .system_image_fingerprint(cancel)
            .await
            .map_err(RunError::device(RunError::DeviceQuery))?;
        check_fingerprint(FingerprintSource::Session, expected.fingerprint, observed)?;
    }

    tracing::debug!(
        device = %device.name(),
        fingerprint = %expected.fingerprint.short(),
        configuration = %expected.configuration,
        "Device state validated"
    );
    Ok(())
}

fn check_fingerprint(
    reported_by: FingerprintSource,
    expected: Fingerprint,
    observed: Fingerprint,
) -> Result<()> {
    if observed == expected {
        Ok(())
    } else {
        Err(Mismatch::Fingerprint {
            reported_by,
            expected,
            observed,
        }
        .into())
    }
}
