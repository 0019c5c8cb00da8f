// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use codeswarm_core::domain::config::BackendConfig;

const SAMPLE_CONFIG: &str = include_str!("../../templates/codeswarm-config.yaml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./codeswarm-config.yaml")]
        output: PathBuf,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output } => generate(output).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = BackendConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. CODESWARM_CONFIG_PATH: {}",
            std::env::var("CODESWARM_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./codeswarm-config.yaml");
        println!("  4. ~/.codeswarm/config.yaml");
        println!("  5. /etc/codeswarm/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    let spec = &config.spec;
    println!("{}", "Router:".bold());
    println!("  Address: {}", spec.router.address());
    println!("  Connect deadline: {}s", spec.router.connect_deadline_secs);
    println!(
        "  Backoff: {}ms → {}ms (x{})",
        spec.router.backoff.initial_ms, spec.router.backoff.max_ms, spec.router.backoff.multiplier
    );
    println!();

    println!("{}", "Server:".bold());
    println!("  Listen: {}", spec.server.bind_address());
    println!("  Hub capacity: {}", spec.hub.capacity);
    println!(
        "  Launch reservation: {}s",
        spec.server.launch_reservation_secs
    );
    println!();

    println!("{}", "State:".bold());
    println!("  Registry file: {}", spec.state.resolved_path().display());
    println!();

    println!("{}", "Status polling:".bold());
    if spec.status_poll.enabled {
        println!("  Every {}s", spec.status_poll.interval_secs);
    } else {
        println!("  {}", "disabled".dimmed());
    }

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = BackendConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf) -> Result<()> {
    std::fs::write(&output, SAMPLE_CONFIG)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
