//! `gallery.toml` configuration.
//!
//! Every key is optional; a missing file yields the defaults.
//!
//! ```toml
//! [gallery]
//! data-dir = ".gallery"
//! cdn-base-url = "https://cdn.example.org/packages"
//! allow-prerelease-fallback = false
//! tool-package-id = "Gallery.CommandLine"
//! tool-executable-entry = "tools/gallery"
//! download-queue-capacity = 1024
//! trusted-errors = false
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Top-level structure of `gallery.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub gallery: GalleryConfig,
}

/// Registry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GalleryConfig {
    /// Root for the catalog snapshot, principals, artifacts and tools.
    pub data_dir: PathBuf,
    /// Base URL of the CDN mirror of the artifact store.
    pub cdn_base_url: Option<String>,
    /// Resolve a versionless request to a pre-release when no stable exists.
    pub allow_prerelease_fallback: bool,
    /// Package whose latest stable release carries the distributable tool.
    pub tool_package_id: String,
    /// Archive entry holding the tool executable.
    pub tool_executable_entry: String,
    /// Pending download events kept before new ones are dropped.
    pub download_queue_capacity: usize,
    /// Include internal failure detail in every error report.
    pub trusted_errors: bool,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        GalleryConfig {
            data_dir: PathBuf::from(".gallery"),
            cdn_base_url: None,
            allow_prerelease_fallback: false,
            tool_package_id: "Gallery.CommandLine".to_string(),
            tool_executable_entry: "tools/gallery".to_string(),
            download_queue_capacity: 1024,
            trusted_errors: false,
        }
    }
}

impl GalleryConfig {
    /// Parse configuration from TOML text.
    pub fn parse(input: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(input)?;
        Ok(file.gallery)
    }

    /// Load configuration from `path`, falling back to defaults when absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(GalleryConfig::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir.join("catalog.json")
    }

    pub fn principals_path(&self) -> PathBuf {
        self.data_dir.join("principals.json")
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.data_dir.join("packages")
    }

    /// Where the refreshed tool executable is written.
    pub fn tool_executable_path(&self) -> PathBuf {
        let file_name = self
            .tool_executable_entry
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("tool");
        self.data_dir.join("tools").join(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let config = GalleryConfig::parse(
            r#"
[gallery]
data-dir = "/srv/gallery"
cdn-base-url = "https://cdn.example.org/packages"
allow-prerelease-fallback = true
tool-package-id = "My.Tool"
tool-executable-entry = "tools/my-tool.exe"
download-queue-capacity = 16
trusted-errors = true
"#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/gallery"));
        assert_eq!(
            config.cdn_base_url.as_deref(),
            Some("https://cdn.example.org/packages")
        );
        assert!(config.allow_prerelease_fallback);
        assert_eq!(config.download_queue_capacity, 16);
        assert_eq!(
            config.tool_executable_path(),
            PathBuf::from("/srv/gallery/tools/my-tool.exe")
        );
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config = GalleryConfig::parse("[gallery]\ntrusted-errors = true\n").unwrap();
        assert!(config.trusted_errors);
        assert_eq!(config.tool_package_id, "Gallery.CommandLine");
        assert!(!config.allow_prerelease_fallback);
    }

    #[test]
    fn empty_config_is_default() {
        assert_eq!(GalleryConfig::parse("").unwrap(), GalleryConfig::default());
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = GalleryConfig::load(&dir.path().join("gallery.toml")).unwrap();
        assert_eq!(config, GalleryConfig::default());
    }

    #[test]
    fn reject_unparseable_config() {
        assert!(GalleryConfig::parse("[gallery]\ndownload-queue-capacity = \"many\"\n").is_err());
    }

    #[test]
    fn derived_paths() {
        let config = GalleryConfig {
            data_dir: PathBuf::from("data"),
            ..Default::default()
        };
        assert_eq!(config.catalog_path(), PathBuf::from("data/catalog.json"));
        assert_eq!(config.artifacts_dir(), PathBuf::from("data/packages"));
        assert_eq!(config.tool_executable_path(), PathBuf::from("data/tools/gallery"));
    }
}
