//! Core types and utilities for the reboot test orchestrator.
//!
//! This crate provides the value types shared by every other crate in the
//! workspace:
//!
//! - **Fingerprints**: the content-derived identifier of an installed system image
//! - **Boot configurations**: which redundant boot slot a device is running from
//! - **Error types**: parse failures for the above
//!
//! # Example
//!
//! ```
//! use reboot_test_core::{BootConfiguration, Fingerprint};
//!
//! let fingerprint = Fingerprint::from_hex(
//!     "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef"
//! ).unwrap();
//! assert_eq!(fingerprint.to_hex().len(), 64);
//!
//! let config: BootConfiguration = "a".parse().unwrap();
//! assert!(config.is_supported());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod boot;
pub mod error;
pub mod fingerprint;

pub use boot::BootConfiguration;
pub use error::{CoreError, Result};
pub use fingerprint::Fingerprint;
