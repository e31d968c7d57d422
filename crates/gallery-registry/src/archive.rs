//! Package artifacts: zip archives carrying a `package.toml` manifest.

use std::io::{Cursor, Read, Write};

use gallery_core::ArtifactDigest;

use crate::error::{RegistryError, Result};
use crate::manifest::PackageManifest;

/// Archive entry holding the package manifest.
pub const MANIFEST_ENTRY: &str = "package.toml";

/// An uploaded artifact with its parsed manifest.
#[derive(Debug, Clone)]
pub struct PackageArtifact {
    pub manifest: PackageManifest,
    pub bytes: Vec<u8>,
    pub digest: ArtifactDigest,
}

impl PackageArtifact {
    /// Read an artifact stream to the end and parse it.
    pub fn read(mut reader: impl Read) -> Result<Self> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| malformed(format!("failed to read artifact stream: {e}")))?;
        Self::from_bytes(bytes)
    }

    /// Parse an in-memory artifact.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(malformed("artifact is empty".to_string()));
        }

        let manifest_text = {
            let mut archive = zip::ZipArchive::new(Cursor::new(bytes.as_slice()))
                .map_err(|e| malformed(format!("not a zip archive: {e}")))?;
            let mut entry = archive
                .by_name(MANIFEST_ENTRY)
                .map_err(|_| malformed(format!("archive has no {MANIFEST_ENTRY}")))?;
            let mut text = String::new();
            entry
                .read_to_string(&mut text)
                .map_err(|e| malformed(format!("unreadable {MANIFEST_ENTRY}: {e}")))?;
            text
        };

        let manifest = PackageManifest::parse(&manifest_text)?;
        let digest = ArtifactDigest::of(&bytes);
        Ok(PackageArtifact {
            manifest,
            bytes,
            digest,
        })
    }

    /// Contents of a named archive entry, if present.
    pub fn entry(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let mut archive = zip::ZipArchive::new(Cursor::new(self.bytes.as_slice()))?;
        let mut file = match archive.by_name(name) {
            Ok(file) => file,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(Some(data))
    }
}

fn malformed(detail: String) -> RegistryError {
    RegistryError::MalformedArtifact { detail }
}

/// Build an artifact from a manifest and extra `(entry name, contents)` files.
pub fn pack(manifest: &PackageManifest, files: &[(&str, &[u8])]) -> Result<Vec<u8>> {
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));

    writer.start_file(MANIFEST_ENTRY, options)?;
    writer.write_all(manifest.to_toml()?.as_bytes())?;

    for (name, data) in files {
        if *name == MANIFEST_ENTRY {
            continue;
        }
        writer.start_file(*name, options)?;
        writer.write_all(data)?;
    }

    Ok(writer.finish()?.into_inner())
}
