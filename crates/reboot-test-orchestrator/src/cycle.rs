//! One reboot cycle: validate, reboot, reconnect, validate.

use reboot_test_core::Fingerprint;
use reboot_test_artifacts::PackageRepository;
use tokio_util::sync::CancellationToken;

use crate::context::RunContext;
use crate::error::{Result, RunError};
use crate::hooks::{run_hook, HookPoint};
use crate::session::SessionSlot;
use crate::validate::{determine_active_configuration, validate_device, ExpectedState};

/// Run reboot cycle `cycle`.
///
/// The expected state is re-derived at the start of every cycle and then
/// held fixed across the reboot. The session opened for the pre-reboot check
/// is closed before the reboot is issued and never reused.
///
/// # Errors
///
/// Returns the first error encountered. Nothing is retried.
pub async fn run_cycle(ctx: RunContext<'_>, cancel: &CancellationToken, cycle: u32) -> Result<()> {
    let repository = ctx.build.package_repository(cancel).await?;
    let fingerprint = repository.lookup_update_fingerprint().await?;

    let mut slot = SessionSlot::empty();
    let result = reboot_and_validate(ctx, cancel, cycle, &repository, fingerprint, &mut slot).await;
    slot.close().await;
    result
}

async fn reboot_and_validate(
    ctx: RunContext<'_>,
    cancel: &CancellationToken,
    cycle: u32,
    repository: &PackageRepository,
    fingerprint: Fingerprint,
    slot: &mut SessionSlot,
) -> Result<()> {
    let strict = ctx.config.strict_version_check;

    slot.connect(cancel, ctx.device, repository).await?;
    let configuration = determine_active_configuration(cancel, slot.require()?).await?;
    let expected = ExpectedState {
        fingerprint,
        configuration,
    };

    validate_device(cancel, ctx.device, slot.require()?, &expected, strict).await?;
    tracing::debug!(cycle, configuration = %configuration, "Pre-reboot state valid");

    // The session dies with the reboot.
    slot.close().await;

    ctx.device
        .reboot(cancel)
        .await
        .map_err(RunError::device(RunError::Reboot))?;

    slot.connect(cancel, ctx.device, repository).await?;
    validate_device(cancel, ctx.device, slot.require()?, &expected, strict).await?;
    tracing::info!(cycle, fingerprint = %fingerprint.short(), "Device survived reboot");

    run_hook(
        ctx.hooks,
        cancel,
        HookPoint::AfterTest,
        ctx.config.script(HookPoint::AfterTest),
        ctx.device,
        repository,
        Some(slot),
    )
    .await
}
