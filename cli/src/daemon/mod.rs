// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Backend mode
//!
//! Handles:
//! - The HTTP/WebSocket server dashboards talk to
//! - The router event pump and optional status poller
//! - Health checks against a running backend

use anyhow::Result;
use codeswarm_sdk::{CodeswarmClient, HealthReport};

pub mod pump;
pub mod server;

pub use server::{build_router, start_backend, AppState};

#[derive(Debug, Clone)]
pub enum BackendStatus {
    Running(HealthReport),
    Unhealthy { error: String },
    Stopped,
}

/// Base URL for a backend listening on `host:port`.
pub fn backend_url(host: &str, port: u16) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{}:{}", host, port)
    } else {
        format!("http://{}:{}", host, port)
    }
}

/// Check whether a backend answers its health endpoint.
pub async fn check_backend(host: &str, port: u16) -> Result<BackendStatus> {
    let client = CodeswarmClient::new(&backend_url(host, port))?;
    match client.health().await {
        Ok(report) => Ok(BackendStatus::Running(report)),
        Err(e) if e.status().is_some() => Ok(BackendStatus::Unhealthy {
            error: e.to_string(),
        }),
        Err(_) => Ok(BackendStatus::Stopped),
    }
}
