//! Registry domain model: registrations, packages, dependencies, principals.
//!
//! Package ids are case-insensitive everywhere. Records keep the casing they
//! were first published with; lookups go through [`normalize_id`].

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::integrity::ArtifactDigest;
use crate::version::{PackageVersion, VersionSpec};

/// Lookup key for a package id.
pub fn normalize_id(id: &str) -> String {
    id.trim().to_ascii_lowercase()
}

/// Case-insensitive id comparison.
pub fn ids_match(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Current time as unix seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Listing state of a package. Deleting a package unlists it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageState {
    #[default]
    Listed,
    Unlisted,
}

impl fmt::Display for PackageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listed => write!(f, "listed"),
            Self::Unlisted => write!(f, "unlisted"),
        }
    }
}

/// A declared dependency of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Target package id.
    pub id: String,
    /// Range expression; `None` or blank accepts any version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_range: Option<String>,
}

impl Dependency {
    pub fn new(id: impl Into<String>, version_range: Option<String>) -> Self {
        Dependency {
            id: id.into(),
            version_range: version_range.filter(|r| !r.trim().is_empty()),
        }
    }

    /// Parsed range, or `None` when any version is accepted.
    pub fn spec(&self) -> Result<Option<VersionSpec>> {
        self.version_range
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(VersionSpec::parse)
            .transpose()
    }

    /// Whether `version` satisfies this dependency's range.
    pub fn accepts(&self, version: &PackageVersion) -> Result<bool> {
        Ok(match self.spec()? {
            Some(spec) => spec.satisfies(version),
            None => true,
        })
    }
}

/// The identity-level record for a package id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Id with the casing of its first publish.
    pub id: String,
    /// Usernames of owning principals.
    pub owners: BTreeSet<String>,
    /// Downloads across every package of this registration.
    #[serde(default)]
    pub download_count: u64,
}

impl Registration {
    pub fn new(id: impl Into<String>, owner: impl Into<String>) -> Self {
        Registration {
            id: id.into(),
            owners: BTreeSet::from([owner.into()]),
            download_count: 0,
        }
    }

    /// Whether `username` is in the owner set.
    pub fn is_owned_by(&self, username: &str) -> bool {
        self.owners.iter().any(|o| o.eq_ignore_ascii_case(username))
    }
}

/// One published version of a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub id: String,
    pub version: PackageVersion,
    #[serde(default)]
    pub state: PackageState,
    #[serde(default)]
    pub is_latest: bool,
    #[serde(default)]
    pub is_latest_stable: bool,
    /// When set, the artifact lives at this URL and is not hosted locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub download_count: u64,
    pub digest: ArtifactDigest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    /// Publish time, unix seconds.
    pub published: u64,
}

impl Package {
    pub fn is_listed(&self) -> bool {
        self.state == PackageState::Listed
    }

    pub fn is_prerelease(&self) -> bool {
        self.version.is_prerelease()
    }

    /// The dependency entry targeting `id`, if declared.
    pub fn dependency_on(&self, id: &str) -> Option<&Dependency> {
        self.dependencies.iter().find(|d| ids_match(&d.id, id))
    }
}

/// An opaque API key. Keys are UUIDs in their hyphenated text form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(Uuid);

impl ApiKey {
    /// Parse a key token, rejecting anything that is not a UUID.
    pub fn parse(token: &str) -> Result<Self> {
        Uuid::parse_str(token.trim())
            .map(ApiKey)
            .map_err(|_| CoreError::InvalidApiKey {
                token: token.to_string(),
            })
    }

    /// Generate a fresh random key.
    pub fn generate() -> Self {
        ApiKey(Uuid::new_v4())
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// An authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub username: String,
    pub api_key: ApiKey,
}

/// One download of a package. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadEvent {
    pub id: String,
    pub version: PackageVersion,
    pub address: String,
    pub agent: String,
    /// Unix seconds.
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(deps: Vec<Dependency>) -> Package {
        Package {
            id: "Consumer".into(),
            version: PackageVersion::new(1, 0, 0),
            state: PackageState::Listed,
            is_latest: true,
            is_latest_stable: true,
            external_url: None,
            dependencies: deps,
            download_count: 0,
            digest: ArtifactDigest::of(b"zip"),
            description: None,
            authors: Vec::new(),
            published: 0,
        }
    }

    #[test]
    fn id_helpers_ignore_case() {
        assert_eq!(normalize_id(" Newtonsoft.Json "), "newtonsoft.json");
        assert!(ids_match("Foo.Bar", "foo.bar"));
        assert!(!ids_match("Foo.Bar", "Foo.Baz"));
    }

    #[test]
    fn blank_range_is_dropped() {
        let dep = Dependency::new("A", Some("  ".into()));
        assert_eq!(dep.version_range, None);
        assert!(dep.accepts(&PackageVersion::new(0, 0, 1)).unwrap());
    }

    #[test]
    fn dependency_range_checks_version() {
        let dep = Dependency::new("A", Some("[1.0.0, 2.0.0)".into()));
        assert!(dep.accepts(&PackageVersion::new(1, 5, 0)).unwrap());
        assert!(!dep.accepts(&PackageVersion::new(2, 0, 0)).unwrap());
    }

    #[test]
    fn malformed_dependency_range_errors() {
        let dep = Dependency::new("A", Some("[1.0".into()));
        assert!(dep.accepts(&PackageVersion::new(1, 0, 0)).is_err());
    }

    #[test]
    fn dependency_lookup_is_case_insensitive() {
        let pkg = package(vec![Dependency::new("Core.Lib", None)]);
        assert!(pkg.dependency_on("core.lib").is_some());
        assert!(pkg.dependency_on("core").is_none());
    }

    #[test]
    fn ownership_is_case_insensitive() {
        let reg = Registration::new("A", "Alice");
        assert!(reg.is_owned_by("alice"));
        assert!(!reg.is_owned_by("bob"));
    }

    #[test]
    fn api_key_parsing() {
        let key = ApiKey::generate();
        assert_eq!(ApiKey::parse(&key.to_string()).unwrap(), key);
        assert!(matches!(
            ApiKey::parse("not-a-key"),
            Err(CoreError::InvalidApiKey { .. })
        ));
        assert!(ApiKey::parse("").is_err());
    }

    #[test]
    fn package_state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&PackageState::Unlisted).unwrap(),
            "\"unlisted\""
        );
        assert_eq!(PackageState::default(), PackageState::Listed);
    }
}
