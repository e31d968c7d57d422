//! Package versions and version-range matching.
//!
//! Versions follow a lenient semantic-version grammar: one to three numeric
//! components, an optional pre-release label, and optional build metadata
//! (accepted and dropped). Ordering follows `semver` precedence, so a
//! pre-release sorts before its release. Pre-release labels compare without
//! regard to case; the original spelling is kept for display.
//!
//! Ranges use interval notation:
//!
//! ```text
//! 1.0          >= 1.0
//! [1.0]        == 1.0
//! (,1.0]       <= 1.0
//! (,1.0)       <  1.0
//! [1.0,2.0)    >= 1.0, < 2.0
//! (1.0,)       >  1.0
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// A parsed package version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageVersion {
    version: semver::Version,
    /// Lowercased pre-release label; equality, ordering and hashing use it.
    pre_key: semver::Prerelease,
}

impl PackageVersion {
    /// Build a release version from its numeric components.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        PackageVersion {
            version: semver::Version::new(major, minor, patch),
            pre_key: semver::Prerelease::EMPTY,
        }
    }

    /// Parse a version string like "1.2", "1.2.3" or "1.2.3-beta.1".
    pub fn parse(input: &str) -> Result<Self> {
        let malformed = |detail: &str| CoreError::MalformedVersion {
            input: input.to_string(),
            detail: detail.to_string(),
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(malformed("empty version"));
        }

        let core = match trimmed.split_once('+') {
            Some((_, "")) => return Err(malformed("empty build metadata")),
            Some((core, _)) => core,
            None => trimmed,
        };

        let (numbers, label) = match core.split_once('-') {
            Some((_, "")) => return Err(malformed("empty pre-release label")),
            Some((numbers, label)) => (numbers, Some(label)),
            None => (core, None),
        };

        let parts: Vec<&str> = numbers.split('.').collect();
        if parts.len() > 3 {
            return Err(malformed("expected at most three numeric components"));
        }

        let mut components = [0u64; 3];
        for (slot, part) in components.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed("numeric component expected"));
            }
            *slot = part
                .parse()
                .map_err(|_| malformed("numeric component out of range"))?;
        }

        let (pre, pre_key) = match label {
            Some(label) => {
                let invalid = |e: semver::Error| malformed(&format!("invalid pre-release label: {e}"));
                (
                    semver::Prerelease::new(label).map_err(invalid)?,
                    semver::Prerelease::new(&label.to_ascii_lowercase()).map_err(invalid)?,
                )
            }
            None => (semver::Prerelease::EMPTY, semver::Prerelease::EMPTY),
        };

        Ok(PackageVersion {
            version: semver::Version {
                major: components[0],
                minor: components[1],
                patch: components[2],
                pre,
                build: semver::BuildMetadata::EMPTY,
            },
            pre_key,
        })
    }

    /// Whether this version carries a pre-release label.
    pub fn is_prerelease(&self) -> bool {
        !self.version.pre.is_empty()
    }

    /// Case-insensitive canonical form, used to detect duplicate publishes.
    pub fn canonical_key(&self) -> String {
        self.version.to_string().to_ascii_lowercase()
    }

    /// Whether two versions share a canonical form.
    pub fn same_as(&self, other: &PackageVersion) -> bool {
        self == other
    }

    /// The underlying semantic version, with the label as published.
    pub fn as_semver(&self) -> &semver::Version {
        &self.version
    }

    fn precedence(&self) -> (u64, u64, u64, &semver::Prerelease) {
        (
            self.version.major,
            self.version.minor,
            self.version.patch,
            &self.pre_key,
        )
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.precedence() == other.precedence()
    }
}

impl Eq for PackageVersion {}

impl Hash for PackageVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.precedence().hash(state);
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.precedence().cmp(&other.precedence())
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.version)
    }
}

impl FromStr for PackageVersion {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        PackageVersion::parse(s)
    }
}

impl TryFrom<String> for PackageVersion {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        PackageVersion::parse(&value)
    }
}

impl From<PackageVersion> for String {
    fn from(value: PackageVersion) -> Self {
        value.to_string()
    }
}

/// One end of a version interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bound {
    pub version: PackageVersion,
    pub inclusive: bool,
}

/// A parsed version-range expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSpec {
    pub min: Option<Bound>,
    pub max: Option<Bound>,
}

impl VersionSpec {
    /// Parse a range expression in interval notation.
    pub fn parse(input: &str) -> Result<Self> {
        let malformed = |detail: &str| CoreError::MalformedRange {
            input: input.to_string(),
            detail: detail.to_string(),
        };
        let version = |text: &str| {
            PackageVersion::parse(text).map_err(|e| match e {
                CoreError::MalformedVersion { detail, .. } => malformed(&detail),
                other => other,
            })
        };

        let s = input.trim();
        if s.is_empty() {
            return Err(malformed("empty range"));
        }

        let open = s.as_bytes()[0];
        if open != b'[' && open != b'(' {
            // A bare version is an inclusive lower bound.
            return Ok(VersionSpec {
                min: Some(Bound {
                    version: version(s)?,
                    inclusive: true,
                }),
                max: None,
            });
        }

        let close = s.as_bytes()[s.len() - 1];
        if s.len() < 3 || (close != b']' && close != b')') {
            return Err(malformed("unbalanced interval brackets"));
        }
        let min_inclusive = open == b'[';
        let max_inclusive = close == b']';
        let inner = &s[1..s.len() - 1];

        let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
        let spec = match parts.as_slice() {
            [exact] => {
                if !(min_inclusive && max_inclusive) {
                    return Err(malformed("an exact version must use inclusive brackets"));
                }
                let v = version(exact)?;
                VersionSpec {
                    min: Some(Bound {
                        version: v.clone(),
                        inclusive: true,
                    }),
                    max: Some(Bound {
                        version: v,
                        inclusive: true,
                    }),
                }
            }
            [lower, upper] => {
                if lower.is_empty() && upper.is_empty() {
                    return Err(malformed("at least one bound is required"));
                }
                let min = if lower.is_empty() {
                    None
                } else {
                    Some(Bound {
                        version: version(lower)?,
                        inclusive: min_inclusive,
                    })
                };
                let max = if upper.is_empty() {
                    None
                } else {
                    Some(Bound {
                        version: version(upper)?,
                        inclusive: max_inclusive,
                    })
                };
                VersionSpec { min, max }
            }
            _ => return Err(malformed("expected at most two bounds")),
        };

        if let (Some(min), Some(max)) = (&spec.min, &spec.max) {
            if min.version > max.version {
                return Err(malformed("lower bound exceeds upper bound"));
            }
            if min.version == max.version && !(min.inclusive && max.inclusive) {
                return Err(malformed("interval is empty"));
            }
        }

        Ok(spec)
    }

    /// Check whether a version falls inside this range.
    pub fn satisfies(&self, version: &PackageVersion) -> bool {
        let above_min = match &self.min {
            Some(b) if b.inclusive => version >= &b.version,
            Some(b) => version > &b.version,
            None => true,
        };
        let below_max = match &self.max {
            Some(b) if b.inclusive => version <= &b.version,
            Some(b) => version < &b.version,
            None => true,
        };
        above_min && below_max
    }
}

impl FromStr for VersionSpec {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        VersionSpec::parse(s)
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.min, &self.max) {
            (Some(min), None) if min.inclusive => write!(f, "{}", min.version),
            (Some(min), Some(max)) if min.version == max.version => {
                write!(f, "[{}]", min.version)
            }
            (min, max) => {
                let open = if min.as_ref().is_some_and(|b| b.inclusive) { '[' } else { '(' };
                let close = if max.as_ref().is_some_and(|b| b.inclusive) { ']' } else { ')' };
                let lower = min.as_ref().map(|b| b.version.to_string()).unwrap_or_default();
                let upper = max.as_ref().map(|b| b.version.to_string()).unwrap_or_default();
                write!(f, "{open}{lower}, {upper}{close}")
            }
        }
    }
}

/// Decide whether `version` satisfies `range`.
///
/// An absent or blank range accepts every version.
pub fn satisfies(version: &str, range: Option<&str>) -> Result<bool> {
    let version = PackageVersion::parse(version)?;
    match range.map(str::trim) {
        None | Some("") => Ok(true),
        Some(expr) => Ok(VersionSpec::parse(expr)?.satisfies(&version)),
    }
}
