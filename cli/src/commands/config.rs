// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use fsrelay_core::domain::agent_config::AgentConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file, including the provider endpoint and
    /// client mountpoint it describes
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = AgentConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. FSRELAY_CONFIG_PATH: {}",
            std::env::var("FSRELAY_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./fsrelay.yaml");
        println!("  4. ~/.fsrelay/config.yaml");
        println!("  5. /etc/fsrelay/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Unit:".bold());
    println!("  ID: {}", config.spec.unit.id);
    println!();

    println!("{}", "Provider:".bold());
    match config.spec.provider.build_descriptor() {
        Ok(descriptor) => println!("  Endpoint: {}", descriptor),
        Err(e) => println!("  Endpoint: {}", e.to_string().yellow()),
    }
    println!();

    println!("{}", "Client:".bold());
    match config.spec.client.mount_options() {
        Some(options) => {
            println!("  Mountpoint: {}", options.mountpoint.display());
            println!("  Flags: {}", options.flags.option_words().join(","));
        }
        None => println!("  Mountpoint: {}", "(from `mount` integration)".dimmed()),
    }
    println!();

    let retry = &config.spec.retry;
    println!("{}", "Retry policy:".bold());
    println!(
        "  Backoff: {}s doubling to {}s",
        retry.base_backoff_secs, retry.max_backoff_secs
    );
    println!("  Blocked after: {} failures", retry.blocked_after_failures);
    println!("  Operation timeout: {}s", retry.operation_timeout_secs);
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = AgentConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    if config.spec.provider.protocol.is_some() {
        config
            .spec
            .provider
            .build_descriptor()
            .context("Provider endpoint is invalid")?;
    }
    if let Some(options) = config.spec.client.mount_options() {
        options.validate().context("Client mountpoint is invalid")?;
    }

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}
