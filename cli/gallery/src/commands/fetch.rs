//! `gallery get`: resolve and download a package.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use gallery_registry::{Caller, DeliveryPlan, GalleryConfig};
use serde::Serialize;

#[derive(Serialize)]
struct Fetched<'a> {
    id: &'a str,
    version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
}

pub fn run(
    config: &GalleryConfig,
    id: &str,
    version: Option<&str>,
    use_cdn: bool,
    output: Option<&Path>,
    json: bool,
) -> Result<()> {
    let gallery = super::open(config)?;
    let caller = Caller {
        address: "local".to_string(),
        agent: format!("gallery-cli/{}", env!("CARGO_PKG_VERSION")),
        trusted: true,
    };
    let delivery = gallery
        .get_package(id, version, use_cdn, &caller)
        .map_err(|e| super::render(gallery.report_to(&e, &caller)))?;
    let package = &delivery.package;

    let saved = match delivery.plan {
        DeliveryPlan::ExternalRedirect { ref url } | DeliveryPlan::CdnRedirect { ref url } => {
            if json {
                super::print_json(&Fetched {
                    id: &package.id,
                    version: package.version.to_string(),
                    redirect: Some(url.as_str()),
                    path: None,
                })?;
            } else {
                tracing::debug!(url = %url, "delivery redirected");
                println!("{} {} is served from {url}", package.id, package.version);
            }
            None
        }
        DeliveryPlan::Stream {
            file_name,
            digest,
            mut body,
        } => {
            let mut bytes = Vec::new();
            body.read_to_end(&mut bytes).context("reading artifact")?;
            if !digest.matches(&bytes) {
                bail!(
                    "artifact of {} {} does not match its recorded digest {}",
                    package.id,
                    package.version,
                    digest.hash
                );
            }
            let path = output.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(file_name));
            std::fs::write(&path, &bytes).with_context(|| format!("writing {}", path.display()))?;
            tracing::debug!(path = %path.display(), bytes = bytes.len(), "artifact saved");
            Some((path, bytes.len()))
        }
    };

    if let Some((path, size)) = saved {
        if json {
            super::print_json(&Fetched {
                id: &package.id,
                version: package.version.to_string(),
                redirect: None,
                path: Some(path.display().to_string()),
            })?;
        } else {
            println!(
                "Saved {} {} to {} ({size} bytes)",
                package.id,
                package.version,
                path.display()
            );
        }
    }

    // Flush the download event before exiting.
    gallery.shutdown();
    Ok(())
}
