//! Package manifest parsing.
//!
//! Every uploaded artifact carries a `package.toml` with its identity and
//! declared dependencies:
//!
//! ```toml
//! [package]
//! id = "Example.Lib"
//! version = "1.2.0"
//! description = "Example library"
//! authors = ["alice"]
//!
//! [dependencies]
//! "Other.Lib" = "[1.0.0, 2.0.0)"
//! "Any.Lib" = ""
//! ```

use std::collections::BTreeMap;

use gallery_core::{Dependency, PackageVersion, VersionSpec};
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};

/// Longest accepted package id.
pub const MAX_ID_LENGTH: usize = 100;

/// A parsed `package.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageManifest {
    pub package: PackageMetadata,
    /// Dependency id to version-range expression. Blank means any version.
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

/// Identity and descriptive metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub id: String,
    pub version: PackageVersion,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    /// The artifact is served from this URL instead of local storage.
    #[serde(default, rename = "external-url")]
    pub external_url: Option<String>,
}

impl PackageManifest {
    /// Build a manifest with no optional metadata.
    pub fn new(id: impl Into<String>, version: PackageVersion) -> Self {
        PackageManifest {
            package: PackageMetadata {
                id: id.into(),
                version,
                description: None,
                authors: Vec::new(),
                external_url: None,
            },
            dependencies: BTreeMap::new(),
        }
    }

    /// Parse and validate a manifest from TOML text.
    pub fn parse(input: &str) -> Result<Self> {
        let manifest: PackageManifest =
            toml::from_str(input).map_err(|e| RegistryError::MalformedArtifact {
                detail: format!("invalid package.toml: {e}"),
            })?;

        validate_id(&manifest.package.id)?;

        for (id, range) in &manifest.dependencies {
            validate_id(id)?;
            if !range.trim().is_empty() {
                VersionSpec::parse(range).map_err(|e| RegistryError::MalformedArtifact {
                    detail: format!("dependency '{id}': {e}"),
                })?;
            }
        }

        if let Some(url) = &manifest.package.external_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(RegistryError::MalformedArtifact {
                    detail: format!("external-url '{url}' is not an http(s) URL"),
                });
            }
        }

        Ok(manifest)
    }

    pub fn id(&self) -> &str {
        &self.package.id
    }

    pub fn version(&self) -> &PackageVersion {
        &self.package.version
    }

    /// Declared dependencies, ordered by id.
    pub fn dependency_list(&self) -> Vec<Dependency> {
        self.dependencies
            .iter()
            .map(|(id, range)| Dependency::new(id.clone(), Some(range.clone())))
            .collect()
    }

    /// Serialize this manifest to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| RegistryError::MalformedArtifact {
            detail: format!("failed to serialize package.toml: {e}"),
        })
    }
}

/// Check a package id against the id rules.
pub fn validate_id(id: &str) -> Result<()> {
    let invalid = |detail: String| RegistryError::MalformedArtifact { detail };

    if id.is_empty() {
        return Err(invalid("package id is required".to_string()));
    }
    if id.len() > MAX_ID_LENGTH {
        return Err(invalid(format!(
            "package id '{id}' exceeds {MAX_ID_LENGTH} characters"
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err(invalid(format!("package id '{id}' contains invalid characters")));
    }
    Ok(())
}
