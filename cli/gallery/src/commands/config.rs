//! `gallery config`: print the effective configuration.

use anyhow::{Context, Result};
use gallery_registry::config::ConfigFile;
use gallery_registry::GalleryConfig;

pub fn show(config: &GalleryConfig) -> Result<()> {
    let file = ConfigFile {
        gallery: config.clone(),
    };
    let text = toml::to_string_pretty(&file).context("serializing configuration")?;
    print!("{text}");
    Ok(())
}
