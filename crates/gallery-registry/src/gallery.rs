//! The registry facade.
//!
//! `Gallery` wires the collaborators together and exposes the operations a
//! front end (HTTP binding, CLI) calls. Every failure carries a
//! [`Status`](crate::error::Status) through [`RegistryError::status`]; a
//! successful push maps to `Created`, everything else to `Ok`.

use std::io::Read;
use std::sync::Arc;

use gallery_core::{Package, PackageState, PackageVersion, Principal, Registration};

use crate::artifact::{ArtifactStore, LocalArtifactStore};
use crate::auth::{self, Action};
use crate::catalog::{CatalogStore, MemoryCatalog};
use crate::config::GalleryConfig;
use crate::dependents::{self, Dependents};
use crate::downloads::DownloadRecorder;
use crate::error::{ErrorReport, RegistryError, Result};
use crate::principal::{MemoryDirectory, PrincipalDirectory};
use crate::publish::{PublishOptions, Publisher};
use crate::refresh::{ExecutableRefresh, ExtractExecutable};
use crate::resolve::{self, Caller, Delivery, ResolveOptions, Resolver};

/// Most ids returned by [`Gallery::package_ids`].
pub const MAX_PACKAGE_IDS: usize = 30;

/// The registry's publish/resolve core.
pub struct Gallery {
    config: GalleryConfig,
    catalog: Arc<dyn CatalogStore>,
    directory: Arc<dyn PrincipalDirectory>,
    downloads: Arc<DownloadRecorder>,
    publisher: Publisher,
    resolver: Resolver,
}

impl Gallery {
    /// Assemble a gallery from explicit collaborators.
    pub fn new(
        config: GalleryConfig,
        catalog: Arc<dyn CatalogStore>,
        artifacts: Arc<dyn ArtifactStore>,
        directory: Arc<dyn PrincipalDirectory>,
        refresh: Arc<dyn ExecutableRefresh>,
    ) -> Result<Self> {
        let downloads = Arc::new(DownloadRecorder::spawn(
            catalog.clone(),
            config.download_queue_capacity,
        )?);
        let publisher = Publisher::new(
            catalog.clone(),
            artifacts.clone(),
            directory.clone(),
            refresh,
        );
        let resolver = Resolver::new(
            catalog.clone(),
            artifacts,
            downloads.clone(),
            ResolveOptions {
                allow_prerelease_fallback: config.allow_prerelease_fallback,
                cdn_base_url: config.cdn_base_url.clone(),
            },
        );
        Ok(Gallery {
            config,
            catalog,
            directory,
            downloads,
            publisher,
            resolver,
        })
    }

    /// Open the file-backed reference stores under `config.data_dir`.
    pub fn open(config: GalleryConfig) -> Result<Self> {
        let catalog = Arc::new(MemoryCatalog::open(&config.catalog_path())?);
        let directory = Arc::new(MemoryDirectory::open(&config.principals_path())?);
        let artifacts = Arc::new(LocalArtifactStore::new(config.artifacts_dir()));
        let refresh = Arc::new(ExtractExecutable::new(
            config.tool_executable_entry.clone(),
            config.tool_executable_path(),
        ));
        tracing::debug!(data_dir = %config.data_dir.display(), "opened gallery");
        Self::new(config, catalog, artifacts, directory, refresh)
    }

    pub fn config(&self) -> &GalleryConfig {
        &self.config
    }

    /// Resolve a package and plan its delivery.
    pub fn get_package(
        &self,
        id: &str,
        version: Option<&str>,
        use_cdn: bool,
        caller: &Caller,
    ) -> Result<Delivery> {
        self.resolver.resolve(id, version, use_cdn, caller)
    }

    /// Check an API key, and its ownership of `id` when one is given.
    ///
    /// Without a version the latest package, pre-releases included, must
    /// exist.
    pub fn verify_key(
        &self,
        api_key: &str,
        id: Option<&str>,
        version: Option<&str>,
    ) -> Result<Principal> {
        let principal = auth::authenticate(self.directory.as_ref(), api_key)?;
        let Some(id) = id.map(str::trim).filter(|id| !id.is_empty()) else {
            return Ok(principal);
        };

        resolve::find_target(self.catalog.as_ref(), id, version, true)?;
        let registration = self.registration(id, version)?;
        auth::require(&principal, &registration, Action::Verify)?;
        Ok(principal)
    }

    /// Publish an artifact.
    pub fn push_package(&self, api_key: &str, artifact: impl Read) -> Result<Package> {
        self.publisher.publish(api_key, artifact, &self.publish_options(false))
    }

    /// Run every publish check without storing anything.
    pub fn check_package(&self, api_key: &str, artifact: impl Read) -> Result<Package> {
        self.publisher.publish(api_key, artifact, &self.publish_options(true))
    }

    /// Unlist a package. It stays resolvable by exact version.
    pub fn delete_package(&self, api_key: &str, id: &str, version: &str) -> Result<Package> {
        let principal = auth::authenticate(self.directory.as_ref(), api_key)?;
        let package = resolve::find_target(self.catalog.as_ref(), id, Some(version), false)?;
        let registration = self.registration(id, Some(version))?;
        auth::require(&principal, &registration, Action::Delete)?;

        let updated =
            self.catalog
                .set_package_state(&package.id, &package.version, PackageState::Unlisted)?;
        tracing::info!(
            id = %updated.id,
            version = %updated.version,
            user = %principal.username,
            "package unlisted"
        );
        Ok(updated)
    }

    /// Latest packages whose dependency on `id` accepts its version.
    pub fn get_dependents(&self, id: &str, version: Option<&str>) -> Result<Dependents> {
        dependents::find_dependents(self.catalog.as_ref(), id, version)
    }

    /// Ids starting with `partial_id`, capped at [`MAX_PACKAGE_IDS`].
    pub fn package_ids(&self, partial_id: Option<&str>, include_prerelease: bool) -> Result<Vec<String>> {
        self.catalog.package_ids(
            partial_id.map(str::trim).unwrap_or_default(),
            include_prerelease,
            MAX_PACKAGE_IDS,
        )
    }

    /// Listed versions of `id`, ascending.
    pub fn package_versions(&self, id: &str, include_prerelease: bool) -> Result<Vec<String>> {
        Ok(self
            .catalog
            .package_versions(id, include_prerelease)?
            .iter()
            .map(PackageVersion::to_string)
            .collect())
    }

    /// Render an error for a caller.
    pub fn report(&self, err: &RegistryError, caller_trusted: bool) -> ErrorReport {
        ErrorReport::from_error(err, caller_trusted || self.config.trusted_errors)
    }

    /// Render an error from [`get_package`](Self::get_package) for `caller`.
    pub fn report_to(&self, err: &RegistryError, caller: &Caller) -> ErrorReport {
        self.report(err, caller.trusted)
    }

    /// Number of download events dropped because the queue was full.
    pub fn dropped_downloads(&self) -> u64 {
        self.downloads.dropped()
    }

    /// Flush pending download events.
    pub fn shutdown(&self) {
        self.downloads.close();
    }

    fn publish_options(&self, dry_run: bool) -> PublishOptions {
        PublishOptions {
            dry_run,
            tool_package_id: Some(self.config.tool_package_id.clone()),
        }
    }

    fn registration(&self, id: &str, version: Option<&str>) -> Result<Registration> {
        self.catalog
            .find_registration(id)?
            .ok_or_else(|| RegistryError::NotFound {
                id: id.to_string(),
                version: version.map(str::to_string),
            })
    }
}

impl std::fmt::Debug for Gallery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gallery")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
