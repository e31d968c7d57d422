//! Principal commands: add-principal.

use anyhow::{Context, Result};
use gallery_registry::{GalleryConfig, MemoryDirectory};

/// Run `gallery add-principal <name>`.
///
/// Prints the generated API key; it is not shown again.
pub fn add(config: &GalleryConfig, name: &str, json: bool) -> Result<()> {
    let path = config.principals_path();
    let directory = MemoryDirectory::open(&path)
        .with_context(|| format!("opening {}", path.display()))?;
    let principal = directory
        .add(name)
        .with_context(|| format!("registering principal '{name}'"))?;

    if json {
        return super::print_json(&principal);
    }
    println!("Registered principal '{}'", principal.username);
    println!("API key: {}", principal.api_key);
    Ok(())
}
