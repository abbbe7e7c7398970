//! Command line arguments.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use reboot_test_orchestrator::RunConfig;

/// Reboot Test - reboot a device repeatedly and check it comes back unchanged.
#[derive(Parser, Debug)]
#[command(name = "reboot-test")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Build output directory holding the package repository and paving script.
    #[arg(long, env = "REBOOT_TEST_BUILD_DIR")]
    pub build_dir: PathBuf,

    /// Address of the device control agent.
    #[arg(long, env = "REBOOT_TEST_DEVICE_URL")]
    pub device_url: String,

    /// Device name handed to the paving script.
    #[arg(long, env = "REBOOT_TEST_DEVICE_NAME", default_value = "device")]
    pub device_name: String,

    /// JSON run configuration. Flags below override its values.
    #[arg(long, env = "REBOOT_TEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of reboot cycles.
    #[arg(long)]
    pub cycle_count: Option<u32>,

    /// Deadline for each reboot cycle, in seconds.
    #[arg(long)]
    pub cycle_timeout_secs: Option<u64>,

    /// Deadline for initialization, paving included, in seconds.
    #[arg(long)]
    pub pave_timeout_secs: Option<u64>,

    /// Script run before initialization.
    #[arg(long)]
    pub before_init_script: Option<String>,

    /// Script run after initialization.
    #[arg(long)]
    pub after_init_script: Option<String>,

    /// Script run after every reboot cycle.
    #[arg(long)]
    pub after_test_script: Option<String>,

    /// Pave into the recovery image.
    #[arg(long)]
    pub pave_to_recovery: bool,

    /// Also check the image reported through the control session.
    #[arg(long)]
    pub strict_version_check: bool,

    /// Paving command to run instead of the build's `pave.sh`.
    #[arg(long)]
    pub pave_command: Option<PathBuf>,

    /// Package repository URL the device should use instead of the local path.
    #[arg(long)]
    pub repository_url: Option<String>,
}

impl Args {
    /// Build and check the run configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be read or parsed,
    /// or if the resulting configuration is invalid.
    pub fn run_config(&self) -> anyhow::Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("failed to parse {}", path.display()))?
            }
            None => RunConfig::default(),
        };

        if let Some(count) = self.cycle_count {
            config.cycle_count = count;
        }
        if let Some(secs) = self.cycle_timeout_secs {
            config.cycle_timeout_seconds = secs;
        }
        if let Some(secs) = self.pave_timeout_secs {
            config.pave_timeout_seconds = secs;
        }
        if let Some(script) = &self.before_init_script {
            config.before_init_script.clone_from(script);
        }
        if let Some(script) = &self.after_init_script {
            config.after_init_script.clone_from(script);
        }
        if let Some(script) = &self.after_test_script {
            config.after_test_script.clone_from(script);
        }
        config.pave_to_recovery |= self.pave_to_recovery;
        config.strict_version_check |= self.strict_version_check;

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec![
            "reboot-test",
            "--build-dir",
            "/out",
            "--device-url",
            "http://10.0.0.2:8000",
        ];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults() {
        let args = parse(&[]);
        assert_eq!(args.device_name, "device");
        assert_eq!(args.run_config().unwrap(), RunConfig::default());
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "--cycle-count",
            "20",
            "--cycle-timeout-secs",
            "90",
            "--after-test-script",
            "./collect-logs.sh",
            "--pave-to-recovery",
        ])
        .run_config()
        .unwrap();

        assert_eq!(config.cycle_count, 20);
        assert_eq!(config.cycle_timeout_seconds, 90);
        assert_eq!(config.after_test_script, "./collect-logs.sh");
        assert!(config.pave_to_recovery);
        assert!(!config.strict_version_check);
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(
            &path,
            r#"{"cycle_count": 3, "before_init_script": "./prep.sh", "strict_version_check": true}"#,
        )
        .unwrap();

        let config = parse(&["--config", path.to_str().unwrap(), "--cycle-count", "7"])
            .run_config()
            .unwrap();

        assert_eq!(config.cycle_count, 7);
        assert_eq!(config.before_init_script, "./prep.sh");
        assert!(config.strict_version_check);
    }

    #[test]
    fn zero_cycles_rejected() {
        assert!(parse(&["--cycle-count", "0"]).run_config().is_err());
    }

    #[test]
    fn unreadable_config_rejected() {
        assert!(parse(&["--config", "/nonexistent/run.json"])
            .run_config()
            .is_err());
    }
}
