//! Top-level run sequencing.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reboot_test_artifacts::Build;
use reboot_test_device::{Device, Paver};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::RunConfig;
use crate::context::RunContext;
use crate::cycle::run_cycle;
use crate::error::{Phase, Result, RunError};
use crate::hooks::HookRunner;
use crate::init::{initialize, InitOutcome};
use crate::timeout::run_with_timeout;

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Device that was tested.
    pub device: String,
    /// Build that was tested.
    pub build: String,
    /// How initialization went.
    pub init: InitOutcome,
    /// Reboot cycles that passed.
    pub cycles_completed: u32,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Wall time of the whole run.
    pub elapsed: Duration,
}

/// Drives one device through initialization and the configured reboot cycles.
///
/// The orchestrator owns the device handle for the whole run and closes it
/// exactly once when [`Orchestrator::run`] returns, whatever the outcome.
pub struct Orchestrator {
    config: RunConfig,
    device: Box<dyn Device>,
    build: Box<dyn Build>,
    paver: Box<dyn Paver>,
    hooks: Box<dyn HookRunner>,
}

impl Orchestrator {
    /// Create an orchestrator for one run.
    ///
    /// # Errors
    ///
    /// Returns `RunError::InvalidConfig` if the configuration is invalid.
    pub fn new(
        config: RunConfig,
        device: impl Device + 'static,
        build: impl Build + 'static,
        paver: impl Paver + 'static,
        hooks: impl HookRunner + 'static,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            device: Box::new(device),
            build: Box::new(build),
            paver: Box::new(paver),
            hooks: Box::new(hooks),
        })
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    fn context(&self) -> RunContext<'_> {
        RunContext {
            config: &self.config,
            device: self.device.as_ref(),
            build: self.build.as_ref(),
            paver: self.paver.as_ref(),
            hooks: self.hooks.as_ref(),
        }
    }

    /// Run initialization once, then every reboot cycle.
    ///
    /// The first failure ends the run; no later cycle is attempted.
    ///
    /// # Errors
    ///
    /// Returns `RunError::Initialization` or `RunError::Cycle` wrapping the
    /// failure, or `RunError::Cancelled` if `cancel` fires.
    pub async fn run(self, cancel: &CancellationToken) -> Result<RunReport> {
        let result = self.run_phases(cancel).await;
        self.device.close().await;

        match &result {
            Ok(report) => tracing::info!(
                device = %report.device,
                build = %report.build,
                paved = report.init.paved(),
                cycles = report.cycles_completed,
                elapsed = ?report.elapsed,
                "Reboot test passed"
            ),
            Err(e) => tracing::error!(
                device = %self.device.name(),
                cycle = ?e.failed_cycle(),
                error = %e,
                "Reboot test failed"
            ),
        }
        result
    }

    async fn run_phases(&self, cancel: &CancellationToken) -> Result<RunReport> {
        let ctx = self.context();
        let started_at = Utc::now();
        let start = Instant::now();

        let init = run_with_timeout(
            cancel,
            Phase::Initialization,
            self.config.pave_timeout(),
            |token| async move { initialize(ctx, &token).await },
        )
        .await
        .map_err(|e| match e {
            RunError::Cancelled => RunError::Cancelled,
            other => RunError::Initialization(Box::new(other)),
        })?;

        let mut cycles_completed = 0;
        for cycle in 1..=self.config.cycle_count {
            tracing::info!(cycle, total = self.config.cycle_count, "Reboot attempt {cycle}");

            run_with_timeout(
                cancel,
                Phase::Cycle(cycle),
                self.config.cycle_timeout(),
                |token| async move { run_cycle(ctx, &token, cycle).await },
            )
            .await
            .map_err(|e| match e {
                RunError::Cancelled => RunError::Cancelled,
                other => RunError::Cycle {
                    cycle,
                    source: Box::new(other),
                },
            })?;

            cycles_completed = cycle;
        }

        Ok(RunReport {
            device: self.device.name().to_string(),
            build: self.build.id().to_string(),
            init,
            cycles_completed,
            started_at,
            elapsed: start.elapsed(),
        })
    }
}
