//! Core types for the Gallery package registry.
//!
//! Provides the version grammar and range matcher used by publish and
//! dependents queries, plus the domain model shared by every registry
//! component:
//! - **Registration**: identity-level record of a package id and its owners
//! - **Package**: one immutable published version
//! - **Principal**: an API-key holder that may own registrations

pub mod error;
pub mod integrity;
pub mod model;
pub mod version;

pub use error::{CoreError, Result};
pub use integrity::{ArtifactDigest, ContentHash};
pub use model::{
    ids_match, normalize_id, unix_now, ApiKey, Dependency, DownloadEvent, Package, PackageState,
    Principal, Registration,
};
pub use version::{satisfies, PackageVersion, VersionSpec};
