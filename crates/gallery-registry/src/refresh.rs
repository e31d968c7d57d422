//! Refresh of the self-distributed tool executable.
//!
//! When a new latest stable release of the configured tool package is
//! published, the executable inside it is copied out so it can be served
//! directly.

use std::io::Write;
use std::path::PathBuf;

use crate::archive::PackageArtifact;
use crate::error::{RegistryError, Result};
use crate::manifest::PackageManifest;

/// Post-publish hook for the tool package.
pub trait ExecutableRefresh: Send + Sync {
    fn refresh_from_artifact(&self, manifest: &PackageManifest, artifact: &[u8]) -> Result<()>;
}

/// Refresh that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRefresh;

impl ExecutableRefresh for NoRefresh {
    fn refresh_from_artifact(&self, _manifest: &PackageManifest, _artifact: &[u8]) -> Result<()> {
        Ok(())
    }
}

/// Copies one archive entry to a fixed destination.
#[derive(Debug, Clone)]
pub struct ExtractExecutable {
    pub entry: String,
    pub destination: PathBuf,
}

impl ExtractExecutable {
    pub fn new(entry: impl Into<String>, destination: PathBuf) -> Self {
        ExtractExecutable {
            entry: entry.into(),
            destination,
        }
    }
}

impl ExecutableRefresh for ExtractExecutable {
    fn refresh_from_artifact(&self, manifest: &PackageManifest, artifact: &[u8]) -> Result<()> {
        let parsed = PackageArtifact::from_bytes(artifact.to_vec())?;
        let data = parsed
            .entry(&self.entry)?
            .ok_or_else(|| RegistryError::MalformedArtifact {
                detail: format!(
                    "{} {} has no entry '{}'",
                    manifest.id(),
                    manifest.version(),
                    self.entry
                ),
            })?;

        let dir = self
            .destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&dir)?;
        let mut file = tempfile::NamedTempFile::new_in(&dir)?;
        file.write_all(&data)?;
        file.persist(&self.destination)
            .map_err(|e| RegistryError::Io(e.error))?;

        tracing::info!(
            id = %manifest.id(),
            version = %manifest.version(),
            path = %self.destination.display(),
            "tool executable refreshed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::pack;
    use gallery_core::PackageVersion;

    #[test]
    fn extracts_entry_to_destination() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("tools").join("gallery");
        let manifest = PackageManifest::new("Gallery.CommandLine", PackageVersion::new(2, 0, 0));
        let bytes = pack(&manifest, &[("tools/gallery", b"#!/bin/sh\n")]).unwrap();

        ExtractExecutable::new("tools/gallery", destination.clone())
            .refresh_from_artifact(&manifest, &bytes)
            .unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), b"#!/bin/sh\n");
    }

    #[test]
    fn missing_entry_fails() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = PackageManifest::new("Gallery.CommandLine", PackageVersion::new(2, 0, 0));
        let bytes = pack(&manifest, &[]).unwrap();

        let err = ExtractExecutable::new("tools/gallery", dir.path().join("gallery"))
            .refresh_from_artifact(&manifest, &bytes)
            .unwrap_err();
        assert!(err.to_string().contains("no entry 'tools/gallery'"));
    }
}
