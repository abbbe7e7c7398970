//! Package repositories and update manifests.

use std::path::{Path, PathBuf};

use reboot_test_core::Fingerprint;
use serde::{Deserialize, Serialize};

use crate::error::{ArtifactError, Result};

/// File name of the update manifest inside a repository.
pub const UPDATE_MANIFEST: &str = "update-manifest.json";

/// Contents of `update-manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateManifest {
    /// Fingerprint of the system image the update installs.
    pub system_image: Fingerprint,
}

/// A package source the device can fetch packages from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRepository {
    dir: PathBuf,
    url: String,
}

impl PackageRepository {
    /// Create a repository rooted at `dir`, served to the device at `url`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, url: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            url: url.into(),
        }
    }

    /// Create a repository the device reads straight from the local path.
    #[must_use]
    pub fn local(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let url = format!("file://{}", dir.display());
        Self { dir, url }
    }

    /// The repository root on the host.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The URL the device agent uses to reach this repository.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Read the update manifest and return the expected system image fingerprint.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest is missing, unreadable, or names an
    /// invalid fingerprint.
    pub async fn lookup_update_fingerprint(&self) -> Result<Fingerprint> {
        let path = self.dir.join(UPDATE_MANIFEST);
        let raw = tokio::fs::read(&path)
            .await
            .map_err(|source| ArtifactError::Io {
                path: path.clone(),
                source,
            })?;

        let manifest: UpdateManifest =
            serde_json::from_slice(&raw).map_err(|e| ArtifactError::Manifest {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        tracing::debug!(
            repository = %self.dir.display(),
            fingerprint = %manifest.system_image,
            "Resolved update fingerprint"
        );

        Ok(manifest.system_image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HEX: &str = "aa00000000000000000000000000000000000000000000000000000000000001";

    fn write_manifest(dir: &Path, body: &str) {
        std::fs::write(dir.join(UPDATE_MANIFEST), body).unwrap();
    }

    #[tokio::test]
    async fn lookup_reads_manifest() {
        let dir = TempDir::new().unwrap();
        write_manifest(dir.path(), &format!(r#"{{"system_image": "{HEX}"}}"#));

        let repo = PackageRepository::local(dir.path());
        let fingerprint = repo.lookup_update_fingerprint().await.unwrap();
        assert_eq!(fingerprint.to_hex(), HEX);
    }

    #[tokio::test]
    async fn lookup_missing_manifest() {
        let dir = TempDir::new().unwrap();
        let repo = PackageRepository::local(dir.path());

        let result = repo.lookup_update_fingerprint().await;
        assert!(matches!(result, Err(ArtifactError::Io { .. })));
    }

    #[tokio::test]
    async fn lookup_malformed_manifest() {
        let dir = TempDir::new().unwrap();
        write_manifest(dir.path(), r#"{"system_image": "xyz"}"#);

        let repo = PackageRepository::local(dir.path());
        let result = repo.lookup_update_fingerprint().await;
        assert!(matches!(result, Err(ArtifactError::Manifest { .. })));
    }

    #[test]
    fn local_url() {
        let repo = PackageRepository::local("/tmp/build/repository");
        assert_eq!(repo.url(), "file:///tmp/build/repository");
        assert_eq!(repo.dir(), Path::new("/tmp/build/repository"));
    }
}
