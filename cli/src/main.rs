// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

//! # fsrelay
//!
//! Runs one side of the filesystem endpoint relation.
//!
//! ## Commands
//!
//! - `fsrelay provider --state FILE` - Publish this unit's endpoint while it leads
//! - `fsrelay client --state FILE` - Keep the advertised filesystem mounted
//! - `fsrelay config show|validate` - Configuration management
//! - `fsrelay codec decode|encode FILE` - Inspect relation payloads
//!
//! Both agent loops read newline-delimited JSON host events from stdin, for
//! example `{"event":"relation-changed","endpoint":"filesystem","relation":1}`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod commands;
mod telemetry;

use commands::{CodecCommand, ConfigCommand};
use fsrelay_core::domain::agent_config::AgentConfigManifest;

/// fsrelay - advertise and mount network filesystems
#[derive(Parser)]
#[command(name = "fsrelay")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "FSRELAY_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the provider agent
    #[command(name = "provider")]
    Provider {
        /// Host state file holding relations, peer data and leadership
        #[arg(long, value_name = "FILE")]
        state: PathBuf,
    },

    /// Run the client agent
    #[command(name = "client")]
    Client {
        /// Host state file holding relations and leadership
        #[arg(long, value_name = "FILE")]
        state: PathBuf,

        /// Reconcile against an in-memory mount table instead of the host
        #[arg(long)]
        dry_run: bool,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Relation payload encoding
    #[command(name = "codec")]
    Codec {
        #[command(subcommand)]
        command: CodecCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Provider { state }) => {
            let manifest = load_manifest(cli.config.clone(), cli.log_level.as_deref())?;
            commands::agent::run_provider(state, cli.config, manifest).await
        }
        Some(Commands::Client { state, dry_run }) => {
            let manifest = load_manifest(cli.config.clone(), cli.log_level.as_deref())?;
            commands::agent::run_client(state, cli.config, manifest, dry_run).await
        }
        Some(Commands::Config { command }) => {
            telemetry::init_logging(cli.log_level.as_deref().unwrap_or("warn"), "text")?;
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::Codec { command }) => {
            telemetry::init_logging(cli.log_level.as_deref().unwrap_or("warn"), "text")?;
            commands::codec::handle_command(command).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Load and validate the manifest, then bring up logging and metrics from it
fn load_manifest(path: Option<PathBuf>, log_level: Option<&str>) -> Result<AgentConfigManifest> {
    let (manifest, source) =
        AgentConfigManifest::load_with_source(path).context("Failed to load configuration")?;
    manifest.validate().context("Configuration validation failed")?;

    let logging = manifest
        .spec
        .observability
        .as_ref()
        .and_then(|o| o.logging.as_ref());
    let level = log_level
        .or_else(|| logging.map(|l| l.level.as_str()))
        .unwrap_or("info");
    let format = logging.map(|l| l.format.as_str()).unwrap_or("text");
    telemetry::init_logging(level, format)?;

    match &source {
        Some(path) => tracing::info!(path = %path.display(), "Loaded configuration"),
        None => tracing::warn!("No configuration file found in standard locations. Using defaults."),
    }

    if let Some(metrics) = manifest.spec.observability.as_ref().and_then(|o| o.metrics.as_ref()) {
        if metrics.enabled {
            telemetry::init_prometheus_exporter(metrics.port)?;
        }
    }

    Ok(manifest)
}
