//! Package publishing workflow.
//!
//! Authenticates the publisher, parses the uploaded artifact, then inserts
//! the package through the catalog's atomic insert. Artifact bytes are
//! written from inside the insert so that a failed write never leaves a
//! catalog record behind.

use std::io::Read;
use std::sync::Arc;

use gallery_core::{ids_match, Package, Principal};

use crate::archive::PackageArtifact;
use crate::artifact::ArtifactStore;
use crate::auth::{self, Action};
use crate::catalog::{CatalogStore, NewPackage};
use crate::error::{RegistryError, Result};
use crate::principal::PrincipalDirectory;
use crate::refresh::ExecutableRefresh;

/// Options for the publish operation.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// Perform every check but don't insert or store anything.
    pub dry_run: bool,
    /// Package whose new latest stable release triggers an executable refresh.
    pub tool_package_id: Option<String>,
}

/// Publishes artifacts into a catalog and artifact store.
#[derive(Clone)]
pub struct Publisher {
    catalog: Arc<dyn CatalogStore>,
    artifacts: Arc<dyn ArtifactStore>,
    directory: Arc<dyn PrincipalDirectory>,
    refresh: Arc<dyn ExecutableRefresh>,
}

impl Publisher {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        artifacts: Arc<dyn ArtifactStore>,
        directory: Arc<dyn PrincipalDirectory>,
        refresh: Arc<dyn ExecutableRefresh>,
    ) -> Self {
        Publisher {
            catalog,
            artifacts,
            directory,
            refresh,
        }
    }

    /// Publish the artifact read from `stream` on behalf of `api_key`.
    ///
    /// On a dry run the returned package is what would have been inserted;
    /// its latest flags are not computed.
    pub fn publish(
        &self,
        api_key: &str,
        stream: impl Read,
        options: &PublishOptions,
    ) -> Result<Package> {
        let principal = auth::authenticate(self.directory.as_ref(), api_key)?;
        let artifact = PackageArtifact::read(stream)?;
        let manifest = &artifact.manifest;

        let new = NewPackage {
            id: manifest.id().to_string(),
            version: manifest.version().clone(),
            external_url: manifest.package.external_url.clone(),
            dependencies: manifest.dependency_list(),
            digest: artifact.digest.clone(),
            description: manifest.package.description.clone(),
            authors: manifest.package.authors.clone(),
        };

        if options.dry_run {
            return self.check_only(new, &principal);
        }

        let hosted_locally = new.external_url.is_none();
        let package = self.catalog.insert_package(new, &principal, &|package: &Package| {
            if hosted_locally {
                self.artifacts
                    .save_artifact(&package.id, &package.version, &artifact.bytes)?;
            }
            Ok(())
        })?;

        tracing::info!(
            id = %package.id,
            version = %package.version,
            user = %principal.username,
            latest = package.is_latest,
            latest_stable = package.is_latest_stable,
            "package published"
        );

        let is_tool = options
            .tool_package_id
            .as_deref()
            .is_some_and(|tool| ids_match(tool, &package.id));
        if is_tool && package.is_latest_stable {
            if let Err(e) = self
                .refresh
                .refresh_from_artifact(&artifact.manifest, &artifact.bytes)
            {
                tracing::warn!(
                    id = %package.id,
                    version = %package.version,
                    error = %e,
                    "executable refresh failed"
                );
            }
        }

        Ok(package)
    }

    fn check_only(&self, new: NewPackage, principal: &Principal) -> Result<Package> {
        let mut id = new.id.clone();
        if let Some(registration) = self.catalog.find_registration(&new.id)? {
            auth::require(principal, &registration, Action::Push)?;
            if self.catalog.find_package(&new.id, &new.version)?.is_some() {
                return Err(RegistryError::VersionConflict {
                    id: registration.id,
                    version: new.version.to_string(),
                });
            }
            id = registration.id;
        }
        tracing::info!(id = %id, version = %new.version, "dry run: package would be published");
        Ok(new.into_package(id))
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::pack;
    use crate::artifact::LocalArtifactStore;
    use crate::catalog::MemoryCatalog;
    use crate::manifest::PackageManifest;
    use crate::principal::MemoryDirectory;
    use crate::refresh::NoRefresh;
    use gallery_core::PackageVersion;
    use parking_lot::Mutex;

    struct Fixture {
        _dir: tempfile::TempDir,
        catalog: Arc<MemoryCatalog>,
        artifacts: Arc<LocalArtifactStore>,
        directory: Arc<MemoryDirectory>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let artifacts = Arc::new(LocalArtifactStore::new(dir.path().join("packages")));
            Fixture {
                _dir: dir,
                catalog: Arc::new(MemoryCatalog::new()),
                artifacts,
                directory: Arc::new(MemoryDirectory::new()),
            }
        }

        fn publisher(&self, refresh: Arc<dyn ExecutableRefresh>) -> Publisher {
            Publisher::new(
                self.catalog.clone(),
                self.artifacts.clone(),
                self.directory.clone(),
                refresh,
            )
        }
    }

    fn artifact(id: &str, version: &str) -> Vec<u8> {
        let manifest = PackageManifest::new(id, PackageVersion::parse(version).unwrap());
        pack(&manifest, &[]).unwrap()
    }

    fn key(p: &Principal) -> String {
        p.api_key.to_string()
    }

    #[derive(Default)]
    struct RecordingRefresh {
        seen: Mutex<Vec<String>>,
        fail: bool,
    }

    impl ExecutableRefresh for RecordingRefresh {
        fn refresh_from_artifact(&self, manifest: &PackageManifest, _artifact: &[u8]) -> Result<()> {
            self.seen.lock().push(manifest.version().to_string());
            if self.fail {
                return Err(RegistryError::Storage {
                    detail: "tool dir not writable".into(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn publish_stores_artifact_and_record() {
        let fx = Fixture::new();
        let alice = fx.directory.add("alice").unwrap();
        let publisher = fx.publisher(Arc::new(NoRefresh));

        let bytes = artifact("A", "1.0.0");
        let package = publisher
            .publish(&key(&alice), bytes.as_slice(), &PublishOptions::default())
            .unwrap();
        assert!(package.is_latest_stable);
        assert!(package.digest.matches(&bytes));
        assert!(fx.artifacts.contains("A", &package.version));
    }

    #[test]
    fn external_packages_store_no_bytes() {
        let fx = Fixture::new();
        let alice = fx.directory.add("alice").unwrap();
        let mut manifest = PackageManifest::new("Ext", PackageVersion::new(1, 0, 0));
        manifest.package.external_url = Some("https://example.org/ext.zip".into());
        let bytes = pack(&manifest, &[]).unwrap();

        let package = fx
            .publisher(Arc::new(NoRefresh))
            .publish(&key(&alice), bytes.as_slice(), &PublishOptions::default())
            .unwrap();
        assert_eq!(package.external_url.as_deref(), Some("https://example.org/ext.zip"));
        assert!(!fx.artifacts.contains("Ext", &package.version));
    }

    #[test]
    fn malformed_artifact_persists_nothing() {
        let fx = Fixture::new();
        let alice = fx.directory.add("alice").unwrap();
        let err = fx
            .publisher(Arc::new(NoRefresh))
            .publish(&key(&alice), &b"garbage"[..], &PublishOptions::default())
            .unwrap_err();
        assert!(matches!(err, RegistryError::MalformedArtifact { .. }));
        assert!(fx.catalog.package_ids("", true, 30).unwrap().is_empty());
    }

    #[test]
    fn dry_run_checks_without_inserting() {
        let fx = Fixture::new();
        let alice = fx.directory.add("alice").unwrap();
        let publisher = fx.publisher(Arc::new(NoRefresh));
        let dry = PublishOptions {
            dry_run: true,
            ..Default::default()
        };

        let bytes = artifact("A", "1.0.0");
        publisher.publish(&key(&alice), bytes.as_slice(), &dry).unwrap();
        assert!(fx.catalog.find_registration("A").unwrap().is_none());

        publisher
            .publish(&key(&alice), bytes.as_slice(), &PublishOptions::default())
            .unwrap();
        let err = publisher.publish(&key(&alice), bytes.as_slice(), &dry).unwrap_err();
        assert!(matches!(err, RegistryError::VersionConflict { .. }));
    }

    #[test]
    fn tool_refresh_only_for_new_latest_stable() {
        let fx = Fixture::new();
        let alice = fx.directory.add("alice").unwrap();
        let refresh = Arc::new(RecordingRefresh::default());
        let publisher = fx.publisher(refresh.clone());
        let options = PublishOptions {
            tool_package_id: Some("Gallery.CommandLine".into()),
            ..Default::default()
        };

        for version in ["2.0.0", "1.0.0", "3.0.0-beta"] {
            publisher
                .publish(&key(&alice), artifact("gallery.commandline", version).as_slice(), &options)
                .unwrap();
        }
        publisher
            .publish(&key(&alice), artifact("Other", "9.0.0").as_slice(), &options)
            .unwrap();

        assert_eq!(*refresh.seen.lock(), vec!["2.0.0".to_string()]);
    }

    #[test]
    fn refresh_failure_does_not_fail_publish() {
        let fx = Fixture::new();
        let alice = fx.directory.add("alice").unwrap();
        let refresh = Arc::new(RecordingRefresh {
            fail: true,
            ..Default::default()
        });
        let options = PublishOptions {
            tool_package_id: Some("Tool".into()),
            ..Default::default()
        };

        let package = fx
            .publisher(refresh.clone())
            .publish(&key(&alice), artifact("Tool", "1.0.0").as_slice(), &options)
            .unwrap();
        assert!(package.is_latest_stable);
        assert_eq!(refresh.seen.lock().len(), 1);
        assert!(fx.catalog.find_package("Tool", &package.version).unwrap().is_some());
    }
}
