//! cli
//!
//! Command-line interface layer for gitprovider.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Resolve configuration, with flags overriding the config file
//! - Build the provider and delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. It parses arguments via clap, builds a
//! [`GitProvider`](crate::provider::GitProvider) through the factory and
//! dispatches. Every remote change goes through the provider's reconcile or
//! delete operations.

pub mod args;
pub mod commands;
pub mod manifest;

pub use args::{Cli, Command, Shell};

use anyhow::{Context as _, Result};

use crate::config::Config;
use crate::context::CallContext;
use crate::provider::create_provider;

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`. `ctx` is cancelled
/// when the user interrupts.
pub async fn run(cli: Cli, ctx: &CallContext) -> Result<()> {
    // Completion needs no configuration or network access
    if let Command::Completion { shell } = cli.command {
        return commands::completion(shell);
    }

    let config = load_config(&cli)?;
    let provider = create_provider(&config).context("failed to create provider")?;
    tracing::debug!(provider = provider.name(), "dispatching command");

    commands::dispatch(cli.command, provider.as_ref(), ctx, cli.quiet).await
}

/// Load configuration and apply flag overrides.
pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Some(provider) = &cli.provider {
        config.settings.provider = Some(provider.clone());
    }
    if let Some(base_url) = &cli.base_url {
        config.settings.base_url = Some(base_url.clone());
    }
    config
        .settings
        .validate()
        .context("invalid configuration after applying flags")?;

    Ok(config)
}
