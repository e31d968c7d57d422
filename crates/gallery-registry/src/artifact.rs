//! Artifact storage.
//!
//! Layout of [`LocalArtifactStore`]:
//! ```text
//! <root>/
//!   <normalized-id>/
//!     <canonical-version>/
//!       <normalized-id>.<canonical-version>.pkg
//! ```

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use gallery_core::{normalize_id, PackageVersion};

use crate::error::{RegistryError, Result};

/// A readable artifact byte stream.
pub type ArtifactReader = Box<dyn Read + Send>;

/// Storage for package artifact bytes.
pub trait ArtifactStore: Send + Sync {
    /// Open the artifact of `(id, version)` for reading.
    fn read_artifact(&self, id: &str, version: &PackageVersion) -> Result<ArtifactReader>;

    /// Store the artifact of `(id, version)`, replacing nothing on failure.
    fn save_artifact(&self, id: &str, version: &PackageVersion, bytes: &[u8]) -> Result<()>;
}

/// File name under which an artifact is stored and served.
pub fn artifact_file_name(id: &str, version: &PackageVersion) -> String {
    format!("{}.{}.pkg", normalize_id(id), version.canonical_key())
}

/// Relative location of an artifact, shared by the local store and CDN URLs.
pub fn artifact_path(id: &str, version: &PackageVersion) -> String {
    format!(
        "{}/{}/{}",
        normalize_id(id),
        version.canonical_key(),
        artifact_file_name(id, version)
    )
}

/// An artifact store backed by a local directory tree.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: PathBuf) -> Self {
        LocalArtifactStore { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, id: &str, version: &PackageVersion) -> PathBuf {
        self.root.join(artifact_path(id, version))
    }

    /// Whether an artifact is stored for `(id, version)`.
    pub fn contains(&self, id: &str, version: &PackageVersion) -> bool {
        self.path_of(id, version).is_file()
    }
}

impl ArtifactStore for LocalArtifactStore {
    fn read_artifact(&self, id: &str, version: &PackageVersion) -> Result<ArtifactReader> {
        let path = self.path_of(id, version);
        match std::fs::File::open(&path) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(RegistryError::NotFound {
                id: id.to_string(),
                version: Some(version.to_string()),
            }),
            Err(e) => Err(RegistryError::Storage {
                detail: format!("opening {}: {e}", path.display()),
            }),
        }
    }

    fn save_artifact(&self, id: &str, version: &PackageVersion, bytes: &[u8]) -> Result<()> {
        let path = self.path_of(id, version);
        let storage = |what: &str, e: std::io::Error| RegistryError::Storage {
            detail: format!("{what} {}: {e}", path.display()),
        };

        let dir = path.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(dir).map_err(|e| storage("creating directory for", e))?;

        let mut file =
            tempfile::NamedTempFile::new_in(dir).map_err(|e| storage("staging", e))?;
        file.write_all(bytes).map_err(|e| storage("writing", e))?;
        file.persist(&path).map_err(|e| storage("committing", e.error))?;

        tracing::debug!(path = %path.display(), size = bytes.len(), "artifact stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> PackageVersion {
        PackageVersion::parse(s).unwrap()
    }

    #[test]
    fn file_names_are_normalized() {
        assert_eq!(artifact_file_name("My.Lib", &v("1.0-Beta")), "my.lib.1.0.0-beta.pkg");
        assert_eq!(
            artifact_path("My.Lib", &v("2.1")),
            "my.lib/2.1.0/my.lib.2.1.0.pkg"
        );
    }

    #[test]
    fn save_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path().to_path_buf());
        store.save_artifact("A", &v("1.0.0"), b"payload").unwrap();
        assert!(store.contains("a", &v("1.0")));

        let mut data = Vec::new();
        store
            .read_artifact("a", &v("1.0.0"))
            .unwrap()
            .read_to_end(&mut data)
            .unwrap();
        assert_eq!(data, b"payload");
    }

    #[test]
    fn missing_artifact_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path().to_path_buf());
        let err = store.read_artifact("A", &v("1.0.0")).err().unwrap();
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }
}
