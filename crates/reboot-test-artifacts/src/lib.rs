//! Build artifacts for the reboot test orchestrator.
//!
//! A build under test is a directory produced by the build system. It holds
//! the package repository the device fetches from, the update manifest that
//! names the expected system image, and the script used to pave devices.
//!
//! ```text
//! <build-dir>/
//! ├── pave.sh
//! └── repository/
//!     ├── update-manifest.json   {"system_image": "<64 hex chars>"}
//!     └── ...
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod build;
pub mod error;
pub mod repository;

pub use build::{Build, LocalBuild};
pub use error::{ArtifactError, Result};
pub use repository::{PackageRepository, UpdateManifest};

pub use reboot_test_core::Fingerprint;
