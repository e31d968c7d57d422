//! Mutating commands: push, delete, verify-key.

use std::path::Path;

use anyhow::{Context, Result};
use gallery_core::Package;
use gallery_registry::GalleryConfig;

/// Run `gallery push <file> --key <key> [--dry-run]`.
pub fn push(config: &GalleryConfig, file: &Path, key: &str, dry_run: bool, json: bool) -> Result<()> {
    let gallery = super::open(config)?;
    let artifact =
        std::fs::File::open(file).with_context(|| format!("opening {}", file.display()))?;

    let result = if dry_run {
        gallery.check_package(key, artifact)
    } else {
        gallery.push_package(key, artifact)
    };
    let package = result.map_err(|e| super::failure(&gallery, e))?;

    if json {
        return super::print_json(&package);
    }
    if dry_run {
        println!("{} {} is ready to publish", package.id, package.version);
    } else {
        println!("Published {} {}{}", package.id, package.version, flags(&package));
    }
    Ok(())
}

/// Run `gallery delete <id> <version> --key <key>`.
pub fn delete(config: &GalleryConfig, id: &str, version: &str, key: &str, json: bool) -> Result<()> {
    let gallery = super::open(config)?;
    let package = gallery
        .delete_package(key, id, version)
        .map_err(|e| super::failure(&gallery, e))?;

    if json {
        return super::print_json(&package);
    }
    println!("Unlisted {} {}", package.id, package.version);
    Ok(())
}

/// Run `gallery verify-key --key <key> [--id <id>] [--version <v>]`.
pub fn verify_key(
    config: &GalleryConfig,
    key: &str,
    id: Option<&str>,
    version: Option<&str>,
) -> Result<()> {
    let gallery = super::open(config)?;
    let principal = gallery
        .verify_key(key, id, version)
        .map_err(|e| super::failure(&gallery, e))?;

    match id {
        Some(id) => println!("Key of '{}' may publish '{id}'", principal.username),
        None => println!("Key belongs to '{}'", principal.username),
    }
    Ok(())
}

fn flags(package: &Package) -> &'static str {
    match (package.is_latest, package.is_latest_stable) {
        (true, true) => " (latest)",
        (true, false) => " (latest pre-release)",
        (false, true) => " (latest stable)",
        (false, false) => "",
    }
}
