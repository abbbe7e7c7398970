//! Reboot Test - device reboot cycle runner.
//!
//! This is the entry point for the `reboot-test` binary. It brings a device
//! to the build under test, then reboots it the configured number of times,
//! checking after every reboot that the device still runs the same image
//! from the same boot slot.
//!
//! # Exit Status
//!
//! - `0` - every cycle passed
//! - `1` - the run failed; the log names the failing cycle
//! - `2` - the configuration is invalid

mod args;

use std::process::ExitCode;

use anyhow::anyhow;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reboot_test_artifacts::LocalBuild;
use reboot_test_device::{HttpDevice, HttpDeviceConfig, ScriptPaver};
use reboot_test_orchestrator::{Orchestrator, RunConfig, ScriptHookRunner};

use args::Args;

const EXIT_INVALID_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,reboot_test=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match args.run_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Invalid configuration");
            return ExitCode::from(EXIT_INVALID_CONFIG);
        }
    };

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    match run(&args, config, &cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Reboot test aborted");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args, config: RunConfig, cancel: &CancellationToken) -> anyhow::Result<()> {
    tracing::info!(
        device = %args.device_name,
        endpoint = %args.device_url,
        build_dir = %args.build_dir.display(),
        cycles = config.cycle_count,
        cycle_timeout_seconds = config.cycle_timeout_seconds,
        pave_timeout_seconds = config.pave_timeout_seconds,
        "Reboot test configuration loaded"
    );

    let device = HttpDevice::connect(
        HttpDeviceConfig::new(&args.device_name, &args.device_url),
        cancel,
    )
    .await
    .map_err(|e| anyhow!("failed to reach device at {}: {e}", args.device_url))?;

    let mut build = LocalBuild::new(&args.build_dir);
    if let Some(url) = &args.repository_url {
        build = build.with_repository_url(url);
    }

    let paver = match &args.pave_command {
        Some(command) => ScriptPaver::with_command(command),
        None => ScriptPaver::new(),
    };

    let report = Orchestrator::new(config, device, build, paver, ScriptHookRunner::new())?
        .run(cancel)
        .await?;

    tracing::info!(
        started_at = %report.started_at,
        cycles = report.cycles_completed,
        "All reboot cycles passed"
    );
    Ok(())
}

/// Cancel the run on Ctrl-C so sessions and child processes are released.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling run");
            cancel.cancel();
        }
    });
}
