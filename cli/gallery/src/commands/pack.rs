//! `gallery pack`: build an artifact from a manifest and files.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use gallery_registry::{artifact_file_name, pack, PackageManifest};

pub fn run(manifest_path: &Path, output: Option<&Path>, files: &[PathBuf]) -> Result<()> {
    let text = std::fs::read_to_string(manifest_path)
        .with_context(|| format!("reading {}", manifest_path.display()))?;
    let manifest = PackageManifest::parse(&text)
        .with_context(|| format!("parsing {}", manifest_path.display()))?;

    let mut contents = Vec::with_capacity(files.len());
    for file in files {
        if !file.is_file() {
            bail!("{} is not a file", file.display());
        }
        let data =
            std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
        let name = entry_name(file);
        tracing::debug!(file = %file.display(), entry = %name, "adding artifact entry");
        contents.push((name, data));
    }
    let entries: Vec<(&str, &[u8])> = contents
        .iter()
        .map(|(name, data)| (name.as_str(), data.as_slice()))
        .collect();

    let bytes = pack(&manifest, &entries).context("building artifact")?;
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(artifact_file_name(manifest.id(), manifest.version())));
    std::fs::write(&output, &bytes).with_context(|| format!("writing {}", output.display()))?;
    tracing::debug!(path = %output.display(), bytes = bytes.len(), "artifact written");

    println!(
        "Packed {} {} into {} ({} bytes, {} files)",
        manifest.id(),
        manifest.version(),
        output.display(),
        bytes.len(),
        entries.len() + 1
    );
    Ok(())
}

/// Archive entry name for a file: its relative path with `/` separators.
fn entry_name(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            std::path::Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
