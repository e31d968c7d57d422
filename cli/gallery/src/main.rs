//! Gallery CLI: operator interface for a local Gallery package registry.

mod commands;

use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::{Parser, Subcommand};
use gallery_registry::GalleryConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gallery", version, about = "Gallery package registry")]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = "gallery.toml")]
    config: PathBuf,
    /// Data directory (overrides the configuration file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a principal and print its API key
    AddPrincipal {
        /// Username
        name: String,
    },
    /// Build a package artifact from a package.toml and extra files
    Pack {
        /// Manifest file
        #[arg(long, default_value = "package.toml")]
        manifest: PathBuf,
        /// Output artifact path (default: <id>.<version>.pkg)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Files to include, stored under their relative paths
        files: Vec<PathBuf>,
    },
    /// Publish a package artifact
    Push {
        /// Artifact file
        file: PathBuf,
        /// API key
        #[arg(long)]
        key: String,
        /// Validate without publishing
        #[arg(long)]
        dry_run: bool,
    },
    /// Unlist a package version
    Delete {
        /// Package id
        id: String,
        /// Package version
        version: String,
        /// API key
        #[arg(long)]
        key: String,
    },
    /// Check an API key, optionally against a package
    VerifyKey {
        /// API key
        #[arg(long)]
        key: String,
        /// Package id the key must own
        #[arg(long)]
        id: Option<String>,
        /// Package version (default: latest)
        #[arg(long)]
        version: Option<String>,
    },
    /// Download a package
    Get {
        /// Package id
        id: String,
        /// Package version (default: latest stable)
        #[arg(long)]
        version: Option<String>,
        /// Prefer the CDN mirror
        #[arg(long)]
        cdn: bool,
        /// Where to write the artifact (default: its file name)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List latest packages depending on a package
    Dependents {
        /// Package id
        id: String,
        /// Package version (default: latest)
        #[arg(long)]
        version: Option<String>,
    },
    /// List package ids
    Ids {
        /// Id prefix
        #[arg(long)]
        partial: Option<String>,
        /// Include ids with only pre-release versions
        #[arg(long)]
        prerelease: bool,
    },
    /// List the versions of a package
    Versions {
        /// Package id
        id: String,
        /// Include pre-release versions
        #[arg(long)]
        prerelease: bool,
    },
    /// Print the effective configuration
    Config,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = GalleryConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    tracing::debug!(
        config = %cli.config.display(),
        data_dir = %config.data_dir.display(),
        "configuration loaded"
    );
    let json = cli.json;

    match cli.command {
        Commands::AddPrincipal { name } => commands::principal::add(&config, &name, json),

        Commands::Pack {
            manifest,
            output,
            files,
        } => commands::pack::run(&manifest, output.as_deref(), &files),

        Commands::Push { file, key, dry_run } => {
            commands::publish::push(&config, &file, &key, dry_run, json)
        }

        Commands::Delete { id, version, key } => {
            commands::publish::delete(&config, &id, &version, &key, json)
        }

        Commands::VerifyKey { key, id, version } => {
            commands::publish::verify_key(&config, &key, id.as_deref(), version.as_deref())
        }

        Commands::Get {
            id,
            version,
            cdn,
            output,
        } => commands::fetch::run(
            &config,
            &id,
            version.as_deref(),
            cdn,
            output.as_deref(),
            json,
        ),

        Commands::Dependents { id, version } => {
            commands::query::dependents(&config, &id, version.as_deref(), json)
        }

        Commands::Ids {
            partial,
            prerelease,
        } => commands::query::ids(&config, partial.as_deref(), prerelease, json),

        Commands::Versions { id, prerelease } => {
            commands::query::versions(&config, &id, prerelease, json)
        }

        Commands::Config => commands::config::show(&config),
    }
}
