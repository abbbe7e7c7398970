//! Reboot cycle state machine for device lifecycle testing.
//!
//! This crate drives a single device through an initialization phase and
//! then N reboot cycles, checking after every reboot that the device came
//! back running the same system image from the same boot slot.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Orchestrator                          │
//! │   run_with_timeout(initialize)   run_with_timeout(cycle i)   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────┐
//!        │ Session  │   │  State   │   │   Hook   │
//!        │  Slot    │   │Validator │   │  Runner  │
//!        └──────────┘   └──────────┘   └──────────┘
//!               │              │              │
//!               ▼              ▼              ▼
//!        ┌─────────────────────────────────────────┐
//!        │   Device / Paver / Build collaborators   │
//!        └─────────────────────────────────────────┘
//! ```
//!
//! # Cycle
//!
//! Each cycle runs under its own deadline:
//!
//! 1. Open a session and read the active boot configuration
//! 2. Validate the image and configuration (pre-reboot)
//! 3. Close the session and reboot the device
//! 4. Open a fresh session and validate again (post-reboot)
//! 5. Run the after-test hook
//!
//! # Failure policy
//!
//! Every failure ends the run. There are no retries anywhere: retrying a
//! reboot would hide exactly the faults this test exists to find.
//!
//! # Usage
//!
//! ```no_run
//! use reboot_test_artifacts::LocalBuild;
//! use reboot_test_device::{HttpDevice, HttpDeviceConfig, ScriptPaver};
//! use reboot_test_orchestrator::{Orchestrator, RunConfig, ScriptHookRunner};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cancel = CancellationToken::new();
//! let device = HttpDevice::connect(
//!     HttpDeviceConfig::new("dut", "http://192.168.42.2:8080"),
//!     &cancel,
//! )
//! .await?;
//!
//! let orchestrator = Orchestrator::new(
//!     RunConfig::default(),
//!     device,
//!     LocalBuild::new("out/build"),
//!     ScriptPaver::new(),
//!     ScriptHookRunner::new(),
//! )?;
//!
//! let report = orchestrator.run(&cancel).await?;
//! println!("{} cycles passed", report.cycles_completed);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod context;
pub mod cycle;
pub mod error;
pub mod hooks;
pub mod init;
pub mod orchestrator;
pub mod session;
pub mod timeout;
pub mod validate;

pub use config::RunConfig;
pub use context::RunContext;
pub use error::{FingerprintSource, Mismatch, Phase, Result, RunError};
pub use hooks::{HookPoint, HookRunner, ScriptHookRunner};
pub use init::InitOutcome;
pub use orchestrator::{Orchestrator, RunReport};
pub use session::SessionSlot;
pub use validate::ExpectedState;

// Re-export commonly used types from dependencies for convenience
pub use reboot_test_core::{BootConfiguration, Fingerprint};
