//! Publish/resolve core for the Gallery package registry.
//!
//! Accepts uploaded package artifacts, authorizes who may publish or unlist
//! them, resolves package requests against a versioned catalog and decides
//! how an artifact is delivered.
//!
//! # Architecture
//!
//! Storage is reached through collaborator traits:
//! - **CatalogStore**: package metadata, with an atomic insert
//! - **ArtifactStore**: artifact bytes
//! - **PrincipalDirectory**: API-key holders
//! - **ExecutableRefresh**: post-publish hook for the self-distributed tool
//!
//! Reference implementations keep state in memory and mirror it to a data
//! directory. [`Gallery`] wires them together and exposes the operations.

pub mod archive;
pub mod artifact;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod dependents;
pub mod downloads;
pub mod error;
pub mod gallery;
pub mod manifest;
pub mod principal;
pub mod publish;
pub mod refresh;
pub mod resolve;

// Re-exports for convenience.
pub use archive::{pack, PackageArtifact};
pub use artifact::{artifact_file_name, ArtifactStore, LocalArtifactStore};
pub use auth::{authenticate, authorize, Action};
pub use catalog::{CatalogStore, MemoryCatalog, NewPackage};
pub use config::GalleryConfig;
pub use dependents::{find_dependents, DependentRef, Dependents, MAX_DEPENDENTS};
pub use downloads::DownloadRecorder;
pub use error::{ErrorReport, RegistryError, Result, Status};
pub use gallery::{Gallery, MAX_PACKAGE_IDS};
pub use manifest::PackageManifest;
pub use principal::{MemoryDirectory, PrincipalDirectory};
pub use publish::{PublishOptions, Publisher};
pub use refresh::{ExecutableRefresh, ExtractExecutable, NoRefresh};
pub use resolve::{Caller, Delivery, DeliveryPlan, ResolveOptions, Resolver};
