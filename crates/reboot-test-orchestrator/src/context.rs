//! Borrowed view of everything a phase needs.

use reboot_test_artifacts::Build;
use reboot_test_device::{Device, Paver};

use crate::config::RunConfig;
use crate::hooks::HookRunner;

/// The collaborators and configuration of one run.
///
/// All fields are shared references owned by the [`crate::Orchestrator`];
/// phases receive the context by value and never outlive the run.
#[derive(Clone, Copy)]
pub struct RunContext<'a> {
    /// Run configuration.
    pub config: &'a RunConfig,
    /// The device under test.
    pub device: &'a dyn Device,
    /// The build under test.
    pub build: &'a dyn Build,
    /// Installs the build when the device is out of date.
    pub paver: &'a dyn Paver,
    /// Executes hook scripts.
    pub hooks: &'a dyn HookRunner,
}
