//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `library`: local discovery, albums and fan-out search
//! - `services`: listing, enabling and disabling music services
//! - `settings`: showing and writing the configuration file

mod library;
mod services;
mod settings;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::runtime::Runtime;

use crate::artwork::ArtworkStore;
use crate::catalog::{CatalogBackend, CatalogClient};
use crate::config::{self, Config};
use crate::local::LocalBackend;
use crate::metadata::LoftyTagParser;
use crate::model::{ObjectCache, SourceType};
use crate::platform::{AudioOutput, DetachedOutput, NativeFileSystem};
use crate::registry::ServiceRegistry;
use crate::service::{ErrorResolver, FixedResolver, PromptResolver, Resolution, ServiceContext};
use crate::store::{StateStore, TomlStateStore};

pub use library::{cmd_albums, cmd_hints, cmd_scan, cmd_search};
pub use services::{cmd_disable, cmd_enable, cmd_services};
pub use settings::cmd_config;

/// Medley CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Ignore failures instead of asking how to recover
    #[arg(long, global = true)]
    pub no_prompt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Discover songs in the local music folder
    Scan {
        /// Forget cached songs and read every file again
        #[arg(long)]
        refresh: bool,
        /// Print the songs as JSON
        #[arg(long)]
        json: bool,
    },
    /// Group local songs into albums
    Albums {
        /// Print the albums as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search every enabled service
    Search {
        term: String,
        /// Result page, starting at 0
        #[arg(short, long, default_value_t = 0)]
        page: usize,
    },
    /// Suggest search terms
    Hints { term: String },
    /// List music services and their state
    Services,
    /// Enable a music service (local, catalog)
    Enable { source: SourceType },
    /// Disable a music service (local, catalog)
    Disable { source: SourceType },
    /// Show the effective configuration
    Config {
        /// Write the configuration file, keeping any existing settings
        #[arg(long)]
        init: bool,
    },
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;
    let config = config::load();

    let services = || -> anyhow::Result<ServiceRegistry> {
        let registry = build_registry(&config, cli.no_prompt)?;
        rt.block_on(registry.restore_all());
        Ok(registry)
    };

    match &cli.command {
        Commands::Scan { refresh, json } => cmd_scan(&rt, &services()?, *refresh, *json),
        Commands::Albums { json } => cmd_albums(&rt, &services()?, *json),
        Commands::Search { term, page } => cmd_search(&rt, &services()?, term, *page),
        Commands::Hints { term } => cmd_hints(&rt, &services()?, term),
        Commands::Services => cmd_services(&services()?),
        Commands::Enable { source } => cmd_enable(&rt, &services()?, *source),
        Commands::Disable { source } => cmd_disable(&rt, &services()?, *source),
        Commands::Config { init } => cmd_config(&rt, &config, *init),
    }
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// Wire every service to the platform implementations.
pub(crate) fn build_registry(config: &Config, no_prompt: bool) -> anyhow::Result<ServiceRegistry> {
    let resolver: Arc<dyn ErrorResolver> = if no_prompt {
        Arc::new(FixedResolver(Resolution::Ignore))
    } else {
        Arc::new(PromptResolver)
    };

    let state_path = config
        .state
        .path
        .clone()
        .or_else(TomlStateStore::default_path)
        .context("could not determine where to keep the state file")?;
    let store: Arc<dyn StateStore> = Arc::new(TomlStateStore::open(state_path));

    let cache = Arc::new(ObjectCache::new());
    let context = ServiceContext::new(Arc::clone(&cache), resolver, store);
    let output: Arc<dyn AudioOutput> = Arc::new(DetachedOutput::new());

    let mut registry = ServiceRegistry::new(context);

    registry.register(Arc::new(LocalBackend::new(
        Arc::new(NativeFileSystem::from_config(&config.library)),
        Arc::new(LoftyTagParser),
        Arc::clone(&output),
        Some(ArtworkStore::from_config(&config.artwork)),
        Arc::clone(&cache),
        config.search.page_size,
    )));

    let client = CatalogClient::new(&config.catalog, &config.credentials)?;
    registry.register(Arc::new(CatalogBackend::new(Arc::new(client), output, cache)));

    Ok(registry)
}

/// The registered service for `source`.
pub(crate) fn registered(
    registry: &ServiceRegistry,
    source: SourceType,
) -> anyhow::Result<Arc<crate::service::MusicService>> {
    registry
        .get(source)
        .cloned()
        .with_context(|| format!("no {source} service registered"))
}
