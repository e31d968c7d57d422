//! Reverse dependency lookup.

use std::cmp::Ordering;

use gallery_core::{normalize_id, PackageVersion};
use serde::Serialize;

use crate::catalog::{CatalogStore, DependentCandidate};
use crate::error::{RegistryError, Result};

/// Most dependents returned by one query.
pub const MAX_DEPENDENTS: usize = 20;

/// A package depending on the queried one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependentRef {
    pub id: String,
    pub version: String,
}

/// Result of a dependents query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependents {
    /// The source version the ranges were checked against.
    pub source: String,
    pub dependents: Vec<DependentRef>,
}

/// Latest packages whose dependency on `id` accepts `version`.
///
/// Without a version the current latest of `id` is used. Results are ranked
/// by registration downloads, then id, then version, and capped at
/// [`MAX_DEPENDENTS`].
pub fn find_dependents(
    catalog: &dyn CatalogStore,
    id: &str,
    version: Option<&str>,
) -> Result<Dependents> {
    let source = match version.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => PackageVersion::parse(raw)?,
        None => {
            catalog
                .find_latest(id, true)?
                .ok_or_else(|| RegistryError::NotFound {
                    id: id.to_string(),
                    version: None,
                })?
                .version
        }
    };

    let mut accepted: Vec<DependentCandidate> = catalog
        .list_latest_with_dependency_on(id)?
        .into_iter()
        .filter(|candidate| accepts(candidate, id, &source))
        .collect();

    accepted.sort_by(rank);
    accepted.truncate(MAX_DEPENDENTS);

    Ok(Dependents {
        source: source.to_string(),
        dependents: accepted
            .into_iter()
            .map(|c| DependentRef {
                id: c.package.id,
                version: c.package.version.to_string(),
            })
            .collect(),
    })
}

fn accepts(candidate: &DependentCandidate, id: &str, source: &PackageVersion) -> bool {
    let Some(dependency) = candidate.package.dependency_on(id) else {
        return false;
    };
    match dependency.accepts(source) {
        Ok(accepted) => accepted,
        Err(e) => {
            tracing::debug!(
                dependent = %candidate.package.id,
                version = %candidate.package.version,
                error = %e,
                "skipping dependent with unparsable range"
            );
            false
        }
    }
}

fn rank(a: &DependentCandidate, b: &DependentCandidate) -> Ordering {
    b.registration_downloads
        .cmp(&a.registration_downloads)
        .then_with(|| normalize_id(&a.package.id).cmp(&normalize_id(&b.package.id)))
        .then_with(|| a.package.version.cmp(&b.package.version))
}
