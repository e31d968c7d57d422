//! Package resolution and delivery planning.

use std::fmt;
use std::sync::Arc;

use gallery_core::{unix_now, ArtifactDigest, DownloadEvent, Package, PackageVersion};

use crate::artifact::{artifact_file_name, artifact_path, ArtifactReader, ArtifactStore};
use crate::catalog::CatalogStore;
use crate::downloads::DownloadRecorder;
use crate::error::{RegistryError, Result};

/// Who is asking for a package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub address: String,
    pub agent: String,
    /// Trusted callers see internal error detail (see `Gallery::report_to`).
    pub trusted: bool,
}

impl Caller {
    pub fn new(address: impl Into<String>, agent: impl Into<String>) -> Self {
        Caller {
            address: address.into(),
            agent: agent.into(),
            trusted: false,
        }
    }
}

/// Resolution settings.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Fall back to the latest pre-release when an id has no stable release.
    pub allow_prerelease_fallback: bool,
    /// Base URL of the CDN mirror, if any.
    pub cdn_base_url: Option<String>,
}

/// How an artifact reaches the caller.
pub enum DeliveryPlan {
    /// The artifact is hosted elsewhere.
    ExternalRedirect { url: String },
    /// The artifact is served from the CDN mirror.
    CdnRedirect { url: String },
    /// Stream the bytes from the artifact store.
    Stream {
        file_name: String,
        digest: ArtifactDigest,
        body: ArtifactReader,
    },
}

impl DeliveryPlan {
    /// The redirect target, if this plan is a redirect.
    pub fn redirect_url(&self) -> Option<&str> {
        match self {
            DeliveryPlan::ExternalRedirect { url } | DeliveryPlan::CdnRedirect { url } => {
                Some(url)
            }
            DeliveryPlan::Stream { .. } => None,
        }
    }
}

impl fmt::Debug for DeliveryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryPlan::ExternalRedirect { url } => {
                f.debug_struct("ExternalRedirect").field("url", url).finish()
            }
            DeliveryPlan::CdnRedirect { url } => {
                f.debug_struct("CdnRedirect").field("url", url).finish()
            }
            DeliveryPlan::Stream {
                file_name, digest, ..
            } => f
                .debug_struct("Stream")
                .field("file_name", file_name)
                .field("digest", digest)
                .finish_non_exhaustive(),
        }
    }
}

/// A resolved package and how to deliver it.
#[derive(Debug)]
pub struct Delivery {
    pub package: Package,
    pub plan: DeliveryPlan,
}

/// Find the package a request refers to.
///
/// Without a version the latest stable is chosen, or with
/// `allow_prerelease_fallback` the latest pre-release when no stable exists.
/// With a version the exact package is returned, unlisted or not. A version
/// that does not parse cannot name a published package and is not found.
pub fn find_target(
    catalog: &dyn CatalogStore,
    id: &str,
    version: Option<&str>,
    allow_prerelease_fallback: bool,
) -> Result<Package> {
    let not_found = || RegistryError::NotFound {
        id: id.to_string(),
        version: version.map(str::to_string),
    };

    let found = match version.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => match PackageVersion::parse(raw) {
            Ok(version) => catalog.find_package(id, &version)?,
            Err(e) => {
                tracing::debug!(%id, version = raw, error = %e, "unparsable version requested");
                None
            }
        },
        None => match catalog.find_latest(id, false)? {
            Some(package) => Some(package),
            None if allow_prerelease_fallback => catalog.find_latest(id, true)?,
            None => None,
        },
    };

    found.ok_or_else(not_found)
}

/// Resolves packages and plans their delivery.
pub struct Resolver {
    catalog: Arc<dyn CatalogStore>,
    artifacts: Arc<dyn ArtifactStore>,
    downloads: Arc<DownloadRecorder>,
    options: ResolveOptions,
}

impl Resolver {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        artifacts: Arc<dyn ArtifactStore>,
        downloads: Arc<DownloadRecorder>,
        options: ResolveOptions,
    ) -> Self {
        Resolver {
            catalog,
            artifacts,
            downloads,
            options,
        }
    }

    /// Resolve `(id, version?)`, record the download and plan delivery.
    pub fn resolve(
        &self,
        id: &str,
        version: Option<&str>,
        use_cdn: bool,
        caller: &Caller,
    ) -> Result<Delivery> {
        let package = find_target(
            self.catalog.as_ref(),
            id,
            version,
            self.options.allow_prerelease_fallback,
        )?;
        tracing::debug!(id = %package.id, version = %package.version, use_cdn, "resolved package");

        self.downloads.submit(DownloadEvent {
            id: package.id.clone(),
            version: package.version.clone(),
            address: caller.address.clone(),
            agent: caller.agent.clone(),
            timestamp: unix_now(),
        });

        let plan = self.plan(&package, use_cdn)?;
        Ok(Delivery { package, plan })
    }

    fn plan(&self, package: &Package, use_cdn: bool) -> Result<DeliveryPlan> {
        if let Some(url) = &package.external_url {
            return Ok(DeliveryPlan::ExternalRedirect { url: url.clone() });
        }

        if use_cdn {
            if let Some(base) = &self.options.cdn_base_url {
                let url = format!(
                    "{}/{}",
                    base.trim_end_matches('/'),
                    artifact_path(&package.id, &package.version)
                );
                return Ok(DeliveryPlan::CdnRedirect { url });
            }
        }

        let body = self.artifacts.read_artifact(&package.id, &package.version)?;
        Ok(DeliveryPlan::Stream {
            file_name: artifact_file_name(&package.id, &package.version),
            digest: package.digest.clone(),
            body,
        })
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MemoryCatalog, NewPackage};
    use gallery_core::{ApiKey, PackageState, Principal};

    fn v(s: &str) -> PackageVersion {
        PackageVersion::parse(s).unwrap()
    }

    fn seed(catalog: &MemoryCatalog, id: &str, version: &str) {
        catalog
            .insert_package(
                NewPackage {
                    id: id.into(),
                    version: v(version),
                    external_url: None,
                    dependencies: Vec::new(),
                    digest: ArtifactDigest::of(version.as_bytes()),
                    description: None,
                    authors: Vec::new(),
                },
                &Principal {
                    username: "alice".into(),
                    api_key: ApiKey::generate(),
                },
                &|_| Ok(()),
            )
            .unwrap();
    }

    #[test]
    fn versionless_picks_latest_stable() {
        let catalog = MemoryCatalog::new();
        seed(&catalog, "A", "1.0.0");
        seed(&catalog, "A", "1.1.0-beta");
        let found = find_target(&catalog, "a", None, false).unwrap();
        assert_eq!(found.version, v("1.0.0"));
    }

    #[test]
    fn prerelease_only_needs_fallback() {
        let catalog = MemoryCatalog::new();
        seed(&catalog, "Beta.Only", "0.1.0-alpha");

        let err = find_target(&catalog, "Beta.Only", None, false).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { version: None, .. }));

        let found = find_target(&catalog, "Beta.Only", None, true).unwrap();
        assert_eq!(found.version, v("0.1.0-alpha"));
    }

    #[test]
    fn exact_version_includes_unlisted() {
        let catalog = MemoryCatalog::new();
        seed(&catalog, "A", "1.0.0");
        catalog
            .set_package_state("A", &v("1.0.0"), PackageState::Unlisted)
            .unwrap();

        assert!(find_target(&catalog, "A", Some("1.0"), false).is_ok());
        assert!(find_target(&catalog, "A", None, true).is_err());
    }

    #[test]
    fn unknown_and_unparsable_versions_are_not_found() {
        let catalog = MemoryCatalog::new();
        seed(&catalog, "A", "1.0.0");
        for version in ["2.0.0", "not-a-version"] {
            let err = find_target(&catalog, "A", Some(version), false).unwrap_err();
            match err {
                RegistryError::NotFound { id, version: echoed } => {
                    assert_eq!(id, "A");
                    assert_eq!(echoed.as_deref(), Some(version));
                }
                other => panic!("expected NotFound, got {other:?}"),
            }
        }
    }

    #[test]
    fn stream_plan_debug_omits_body() {
        let plan = DeliveryPlan::Stream {
            file_name: "a.1.0.0.pkg".into(),
            digest: ArtifactDigest::of(b"x"),
            body: Box::new(std::io::empty()),
        };
        let rendered = format!("{plan:?}");
        assert!(rendered.contains("a.1.0.0.pkg"));
        assert!(plan.redirect_url().is_none());
    }
}
