//! Builds under test.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{ArtifactError, Result};
use crate::repository::PackageRepository;

/// Name of the repository directory inside a build.
pub const REPOSITORY_DIR: &str = "repository";

/// Name of the paving script inside a build.
pub const PAVE_SCRIPT: &str = "pave.sh";

/// A specific software build under test.
///
/// Builds are immutable once obtained. The orchestrator only needs to find
/// the package source and the paving entry point.
#[async_trait]
pub trait Build: Send + Sync {
    /// Human-readable identifier for logs.
    fn id(&self) -> &str;

    /// Resolve the package repository for this build.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository is missing or the call is cancelled.
    async fn package_repository(&self, cancel: &CancellationToken) -> Result<PackageRepository>;

    /// Path of the script that paves this build onto a device.
    fn pave_script(&self) -> PathBuf;
}

/// A build already present in a local output directory.
#[derive(Debug, Clone)]
pub struct LocalBuild {
    dir: PathBuf,
    id: String,
    repository_url: Option<String>,
}

impl LocalBuild {
    /// Create a build rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let id = dir
            .file_name()
            .map_or_else(|| dir.display().to_string(), |n| n.to_string_lossy().into_owned());
        Self {
            dir,
            id,
            repository_url: None,
        }
    }

    /// Serve the repository to the device from `url` instead of its local path.
    #[must_use]
    pub fn with_repository_url(mut self, url: impl Into<String>) -> Self {
        self.repository_url = Some(url.into());
        self
    }

    /// The build output directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl Build for LocalBuild {
    fn id(&self) -> &str {
        &self.id
    }

    async fn package_repository(&self, cancel: &CancellationToken) -> Result<PackageRepository> {
        if cancel.is_cancelled() {
            return Err(ArtifactError::Cancelled);
        }

        let dir = self.dir.join(REPOSITORY_DIR);
        let is_dir = tokio::fs::metadata(&dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(ArtifactError::MissingRepository(dir));
        }

        Ok(match &self.repository_url {
            Some(url) => PackageRepository::new(dir, url.clone()),
            None => PackageRepository::local(dir),
        })
    }

    fn pave_script(&self) -> PathBuf {
        self.dir.join(PAVE_SCRIPT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn repository_found() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(REPOSITORY_DIR)).unwrap();

        let build = LocalBuild::new(dir.path());
        let repo = build
            .package_repository(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(repo.dir(), dir.path().join(REPOSITORY_DIR));
        assert!(repo.url().starts_with("file://"));
    }

    #[tokio::test]
    async fn repository_url_override() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(REPOSITORY_DIR)).unwrap();

        let build = LocalBuild::new(dir.path()).with_repository_url("http://10.0.0.1:8083");
        let repo = build
            .package_repository(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(repo.url(), "http://10.0.0.1:8083");
    }

    #[tokio::test]
    async fn repository_missing() {
        let dir = TempDir::new().unwrap();
        let build = LocalBuild::new(dir.path());

        let result = build.package_repository(&CancellationToken::new()).await;
        assert!(matches!(result, Err(ArtifactError::MissingRepository(_))));
    }

    #[tokio::test]
    async fn cancelled_before_lookup() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(REPOSITORY_DIR)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = LocalBuild::new(dir.path()).package_repository(&cancel).await;
        assert!(matches!(result, Err(ArtifactError::Cancelled)));
    }

    #[test]
    fn id_and_pave_script() {
        let build = LocalBuild::new("/out/build-42");
        assert_eq!(build.id(), "build-42");
        assert_eq!(build.pave_script(), PathBuf::from("/out/build-42/pave.sh"));
    }
}
