//! Run configuration.
//!
//! A [`RunConfig`] is built once at process start and passed by reference
//! through every phase. Nothing in the orchestrator reads configuration from
//! ambient state.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, RunError};
use crate::hooks::HookPoint;

/// Configuration for a reboot test run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunConfig {
    /// Number of reboot cycles to run after initialization.
    #[serde(default = "RunConfig::default_cycle_count")]
    pub cycle_count: u32,

    /// Deadline for the whole initialization phase, paving included (seconds).
    #[serde(default = "RunConfig::default_pave_timeout")]
    pub pave_timeout_seconds: u64,

    /// Deadline for each individual reboot cycle (seconds).
    #[serde(default = "RunConfig::default_cycle_timeout")]
    pub cycle_timeout_seconds: u64,

    /// Script run before initialization. Empty to skip.
    #[serde(default)]
    pub before_init_script: String,

    /// Script run after initialization. Empty to skip.
    #[serde(default)]
    pub after_init_script: String,

    /// Script run after each reboot cycle. Empty to skip.
    #[serde(default)]
    pub after_test_script: String,

    /// Pave into the recovery image rather than the system slots.
    #[serde(default)]
    pub pave_to_recovery: bool,

    /// Also compare the fingerprint reported through the control session.
    #[serde(default)]
    pub strict_version_check: bool,
}

impl RunConfig {
    const fn default_cycle_count() -> u32 {
        5
    }

    const fn default_pave_timeout() -> u64 {
        300 // 5 minutes
    }

    const fn default_cycle_timeout() -> u64 {
        300 // 5 minutes
    }

    /// Get the initialization deadline as a `Duration`.
    #[must_use]
    pub const fn pave_timeout(&self) -> Duration {
        Duration::from_secs(self.pave_timeout_seconds)
    }

    /// Get the per-cycle deadline as a `Duration`.
    #[must_use]
    pub const fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_seconds)
    }

    /// The script configured for `hook`, empty if none.
    #[must_use]
    pub fn script(&self, hook: HookPoint) -> &str {
        match hook {
            HookPoint::BeforeInit => &self.before_init_script,
            HookPoint::AfterInit => &self.after_init_script,
            HookPoint::AfterTest => &self.after_test_script,
        }
    }

    /// Check the configuration before a run starts.
    ///
    /// # Errors
    ///
    /// Returns `RunError::InvalidConfig` if there are no cycles to run or a
    /// deadline is zero.
    pub fn validate(&self) -> Result<()> {
        if self.cycle_count == 0 {
            return Err(RunError::InvalidConfig(
                "cycle count must be at least 1".to_string(),
            ));
        }
        if self.pave_timeout_seconds == 0 {
            return Err(RunError::InvalidConfig(
                "pave timeout must be greater than zero".to_string(),
            ));
        }
        if self.cycle_timeout_seconds == 0 {
            return Err(RunError::InvalidConfig(
                "cycle timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            cycle_count: Self::default_cycle_count(),
            pave_timeout_seconds: Self::default_pave_timeout(),
            cycle_timeout_seconds: Self::default_cycle_timeout(),
            before_init_script: String::new(),
            after_init_script: String::new(),
            after_test_script: String::new(),
            pave_to_recovery: false,
            strict_version_check: false,
        }
    }
}
