//! CLI command implementations.

pub mod config;
pub mod fetch;
pub mod pack;
pub mod principal;
pub mod publish;
pub mod query;

use anyhow::{anyhow, Context, Result};
use gallery_registry::{ErrorReport, Gallery, GalleryConfig, RegistryError};
use serde::Serialize;

/// Open the gallery stored under `config.data_dir`.
pub fn open(config: &GalleryConfig) -> Result<Gallery> {
    tracing::debug!(data_dir = %config.data_dir.display(), "opening gallery");
    Gallery::open(config.clone())
        .with_context(|| format!("opening gallery at {}", config.data_dir.display()))
}

/// Turn a registry failure into a CLI error carrying its status.
///
/// The operator runs locally, so internal detail is always shown.
pub fn failure(gallery: &Gallery, err: RegistryError) -> anyhow::Error {
    render(gallery.report(&err, true))
}

/// Format an error report, with its detail when present.
pub fn render(report: ErrorReport) -> anyhow::Error {
    let status = format!("{} {}", report.status.code(), report.status);
    match report.detail {
        Some(detail) => anyhow!("{} [{status}]: {detail}", report.message),
        None => anyhow!("{} [{status}]", report.message),
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
