//! Initialization phase.
//!
//! Brings the device to the build under test. A device that already runs
//! the expected image is left alone; otherwise the build is paved, the
//! device is expected to boot its primary slot, and its state is validated.

use reboot_test_core::Fingerprint;
use reboot_test_artifacts::PackageRepository;
use tokio_util::sync::CancellationToken;

use crate::context::RunContext;
use crate::error::{Result, RunError};
use crate::hooks::{run_hook, HookPoint};
use crate::session::SessionSlot;
use crate::validate::{
    configuration_after_pave, determine_active_configuration, is_device_up_to_date,
    validate_device, ExpectedState,
};

/// How initialization brought the device to the expected image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// The device already ran the expected image; nothing was installed.
    AlreadyUpToDate {
        /// The image the device runs.
        fingerprint: Fingerprint,
    },
    /// The build was paved and the device validated.
    Paved {
        /// The state the device was validated against.
        expected: ExpectedState,
    },
}

impl InitOutcome {
    /// Returns true if the build was paved.
    #[must_use]
    pub const fn paved(&self) -> bool {
        matches!(self, Self::Paved { .. })
    }
}

/// Initialize the device.
///
/// # Errors
///
/// Returns the first error encountered; every step depends on the previous one.
pub async fn initialize(ctx: RunContext<'_>, cancel: &CancellationToken) -> Result<InitOutcome> {
    tracing::info!(device = %ctx.device.name(), build = %ctx.build.id(), "Initializing device");

    let repository = ctx.build.package_repository(cancel).await?;

    run_hook(
        ctx.hooks,
        cancel,
        HookPoint::BeforeInit,
        ctx.config.script(HookPoint::BeforeInit),
        ctx.device,
        &repository,
        None,
    )
    .await?;

    let fingerprint = repository.lookup_update_fingerprint().await?;

    if is_device_up_to_date(cancel, ctx.device, &fingerprint).await? {
        tracing::info!(fingerprint = %fingerprint.short(), "Device already up to date");
        return Ok(InitOutcome::AlreadyUpToDate { fingerprint });
    }

    ctx.paver
        .pave(cancel, ctx.device, ctx.build, ctx.config.pave_to_recovery)
        .await
        .map_err(RunError::device(RunError::Pave))?;

    let mut slot = SessionSlot::empty();
    let result = validate_paved_device(ctx, cancel, &repository, fingerprint, &mut slot).await;
    slot.close().await;

    let expected = result?;
    tracing::info!(
        fingerprint = %expected.fingerprint.short(),
        configuration = %expected.configuration,
        "Device initialized"
    );
    Ok(InitOutcome::Paved { expected })
}

async fn validate_paved_device(
    ctx: RunContext<'_>,
    cancel: &CancellationToken,
    repository: &PackageRepository,
    fingerprint: Fingerprint,
    slot: &mut SessionSlot,
) -> Result<ExpectedState> {
    slot.connect(cancel, ctx.device, repository).await?;

    let observed = determine_active_configuration(cancel, slot.require()?).await?;
    let expected = ExpectedState {
        fingerprint,
        configuration: configuration_after_pave(observed),
    };

    validate_device(
        cancel,
        ctx.device,
        slot.require()?,
        &expected,
        ctx.config.strict_version_check,
    )
    .await?;

    run_hook(
        ctx.hooks,
        cancel,
        HookPoint::AfterInit,
        ctx.config.script(HookPoint::AfterInit),
        ctx.device,
        repository,
        Some(slot),
    )
    .await?;

    Ok(expected)
}
