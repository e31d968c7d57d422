//! Read-only catalog queries: dependents, ids, versions.

use anyhow::Result;
use gallery_registry::GalleryConfig;

/// Run `gallery dependents <id> [--version <v>]`.
pub fn dependents(config: &GalleryConfig, id: &str, version: Option<&str>, json: bool) -> Result<()> {
    let gallery = super::open(config)?;
    let found = gallery
        .get_dependents(id, version)
        .map_err(|e| super::failure(&gallery, e))?;

    if json {
        return super::print_json(&found);
    }
    if found.dependents.is_empty() {
        println!("No packages depend on {id} {}", found.source);
        return Ok(());
    }
    println!("Packages depending on {id} {}:", found.source);
    for dependent in &found.dependents {
        println!("  {} {}", dependent.id, dependent.version);
    }
    Ok(())
}

/// Run `gallery ids [--partial <prefix>] [--prerelease]`.
pub fn ids(config: &GalleryConfig, partial: Option<&str>, prerelease: bool, json: bool) -> Result<()> {
    let gallery = super::open(config)?;
    let ids = gallery
        .package_ids(partial, prerelease)
        .map_err(|e| super::failure(&gallery, e))?;

    if json {
        return super::print_json(&ids);
    }
    for id in ids {
        println!("{id}");
    }
    Ok(())
}

/// Run `gallery versions <id> [--prerelease]`.
pub fn versions(config: &GalleryConfig, id: &str, prerelease: bool, json: bool) -> Result<()> {
    let gallery = super::open(config)?;
    let versions = gallery
        .package_versions(id, prerelease)
        .map_err(|e| super::failure(&gallery, e))?;

    if json {
        return super::print_json(&versions);
    }
    if versions.is_empty() {
        println!("No listed versions of {id}");
    }
    for version in versions {
        println!("{version}");
    }
    Ok(())
}
