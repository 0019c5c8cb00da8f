// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Backend lifecycle commands
//!
//! Commands: serve, status

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::daemon::{check_backend, start_backend, BackendStatus};
use codeswarm_core::domain::config::BackendConfig;

/// Overrides accepted by `codeswarm serve`.
#[derive(Debug, Default, Clone, clap::Args)]
pub struct ServeArgs {
    /// Router address as HOST:PORT (overrides spec.router)
    #[arg(long, value_name = "HOST:PORT")]
    pub router: Option<String>,

    /// Listen address as HOST:PORT (overrides spec.server)
    #[arg(long, value_name = "HOST:PORT")]
    pub listen: Option<String>,

    /// Registry file (overrides spec.state.path)
    #[arg(long, value_name = "FILE")]
    pub state: Option<PathBuf>,

    /// Enable periodic swarm_status polling
    #[arg(long)]
    pub poll_status: bool,
}

pub async fn serve(config_path: Option<PathBuf>, args: ServeArgs) -> Result<()> {
    let mut config = BackendConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;
    apply_serve_args(&mut config, &args)?;
    config
        .validate()
        .context("Configuration validation failed")?;

    info!(
        "Starting codeswarm backend '{}' (router {}, listen {})",
        config.metadata.name,
        config.spec.router.address(),
        config.spec.server.bind_address()
    );
    start_backend(config).await
}

fn apply_serve_args(config: &mut BackendConfig, args: &ServeArgs) -> Result<()> {
    if let Some(router) = &args.router {
        let (host, port) = split_address(router)?;
        config.spec.router.host = host;
        config.spec.router.port = port;
    }
    if let Some(listen) = &args.listen {
        let (host, port) = split_address(listen)?;
        config.spec.server.host = host;
        config.spec.server.port = port;
    }
    if let Some(state) = &args.state {
        config.spec.state.path = state.clone();
    }
    if args.poll_status {
        config.spec.status_poll.enabled = true;
    }
    Ok(())
}

fn split_address(address: &str) -> Result<(String, u16)> {
    let (host, port) = address
        .rsplit_once(':')
        .with_context(|| format!("Expected HOST:PORT, got '{}'", address))?;
    let port = port
        .parse::<u16>()
        .with_context(|| format!("Invalid port in '{}'", address))?;
    if host.is_empty() {
        anyhow::bail!("Missing host in '{}'", address);
    }
    Ok((host.to_string(), port))
}

pub async fn status(host: &str, port: u16) -> Result<()> {
    match check_backend(host, port).await {
        Ok(BackendStatus::Running(report)) => {
            let headline = format!("✓ Backend is {}", report.status);
            if report.status == "healthy" {
                println!("{}", headline.green());
            } else {
                println!("{}", headline.yellow());
            }
            let router = report
                .router
                .get("state")
                .and_then(|s| s.as_str())
                .unwrap_or("unknown");
            println!("  Router: {}", router);
            println!("  Uptime: {}", format_uptime(report.uptime_seconds));
            println!("  Swarms: {}", report.swarms);
            println!("  Dashboards: {}", report.dashboards);
        }
        Ok(BackendStatus::Unhealthy { error }) => {
            println!("{}", "✗ Backend is unhealthy".red());
            println!("  Error: {}", error);
        }
        Ok(BackendStatus::Stopped) => {
            println!("{}", format!("✗ No backend answering on {}:{}", host, port).red());
            println!("Use 'codeswarm serve' to start one.");
        }
        Err(e) => {
            warn!("Failed to check backend status: {}", e);
            return Err(e);
        }
    }
    Ok(())
}

fn format_uptime(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}
