// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # codeswarm CLI
//!
//! The `codeswarm` binary runs the backend that sits between the swarm
//! router and browser dashboards, and offers operator commands against a
//! running backend.
//!
//! ## Commands
//!
//! - `codeswarm serve` - Run the backend in the foreground
//! - `codeswarm status` - Check backend health
//! - `codeswarm swarm list|show|launch|inject|terminate|watch` - Swarm operations
//! - `codeswarm config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use codeswarm_cli::commands::{self, ConfigCommand, ServeArgs, SwarmCommand};

/// codeswarm - launch, monitor and converse with agent swarms
#[derive(Parser)]
#[command(name = "codeswarm")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "CODESWARM_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Backend HTTP port used by client commands
    #[arg(long, global = true, env = "CODESWARM_PORT", default_value = "4000")]
    port: u16,

    /// Backend host used by client commands
    #[arg(long, global = true, env = "CODESWARM_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "CODESWARM_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "CODESWARM_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the backend in the foreground
    #[command(name = "serve")]
    Serve {
        #[command(flatten)]
        args: ServeArgs,
    },

    /// Check backend health
    #[command(name = "status")]
    Status,

    /// Swarm operations
    #[command(name = "swarm")]
    Swarm {
        #[command(subcommand)]
        command: SwarmCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_json)?;

    match cli.command {
        Some(Commands::Serve { args }) => commands::backend::serve(cli.config, args).await,
        Some(Commands::Status) => commands::backend::status(&cli.host, cli.port).await,
        Some(Commands::Swarm { command }) => {
            commands::swarm::handle_command(command, &cli.host, cli.port).await
        }
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
