// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Backend Configuration Types
//
// Kubernetes-style manifest for the codeswarm backend:
// - Router endpoint and reconnect policy
// - HTTP/WebSocket bind address
// - Registry persistence path
// - Fan-out hub sizing
// - Optional (non-authoritative) status polling

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "codeswarm/v1";
pub const KIND: &str = "BackendConfig";

/// Top-level backend configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// API version (must be "codeswarm/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "BackendConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: BackendSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable deployment name
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendSpec {
    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub state: StateConfig,

    #[serde(default)]
    pub hub: HubConfig,

    #[serde(default)]
    pub status_poll: StatusPollConfig,
}

/// Upstream router endpoint and connection policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_router_host")]
    pub host: String,

    #[serde(default = "default_router_port")]
    pub port: u16,

    /// How long the initial connection may take before startup fails
    #[serde(default = "default_connect_deadline_secs")]
    pub connect_deadline_secs: u64,

    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Buffered inbound messages per subscriber before it starts lagging
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
}

/// Exponential reconnect backoff (multiplier 1.0 gives a fixed interval)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_backoff_initial_ms")]
    pub initial_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub max_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,

    /// How long an alias stays reserved for a launch the router never answered
    #[serde(default = "default_launch_reservation_secs")]
    pub launch_reservation_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// JSON file holding the persisted swarm registry
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Messages buffered per dashboard connection
    #[serde(default = "default_hub_capacity")]
    pub capacity: usize,
}

/// Periodic `swarm_status` refresh. Push events are the source of truth;
/// polling only refreshes and never overrides status on inconclusive status checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusPollConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
}

impl RouterConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_deadline(&self) -> Duration {
        Duration::from_secs(self.connect_deadline_secs)
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn launch_reservation_ttl(&self) -> Duration {
        Duration::from_secs(self.launch_reservation_secs)
    }
}

impl StateConfig {
    /// `path` with a leading `~/` expanded to the home directory.
    pub fn resolved_path(&self) -> PathBuf {
        match (self.path.strip_prefix("~"), dirs::home_dir()) {
            (Ok(rest), Some(home)) => home.join(rest),
            _ => self.path.clone(),
        }
    }
}

impl StatusPollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            host: default_router_host(),
            port: default_router_port(),
            connect_deadline_secs: default_connect_deadline_secs(),
            backoff: BackoffConfig::default(),
            subscriber_capacity: default_subscriber_capacity(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: default_backoff_initial_ms(),
            max_ms: default_backoff_max_ms(),
            multiplier: default_backoff_multiplier(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            launch_reservation_secs: default_launch_reservation_secs(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            capacity: default_hub_capacity(),
        }
    }
}

impl Default for StatusPollConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "codeswarm".to_string(),
            },
            spec: BackendSpec::default(),
        }
    }
}

impl BackendConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. CODESWARM_CONFIG_PATH environment variable
    /// 2. ./codeswarm-config.yaml (working directory)
    /// 3. ~/.codeswarm/config.yaml (user home)
    /// 4. /etc/codeswarm/config.yaml (system, Unix)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("CODESWARM_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./codeswarm-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".codeswarm").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        {
            let system_config = PathBuf::from("/etc/codeswarm/config.yaml");
            if system_config.exists() {
                return Some(system_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("CODESWARM_ROUTER_HOST") {
            tracing::info!("Environment override: CODESWARM_ROUTER_HOST={}", host);
            self.spec.router.host = host;
        }

        if let Ok(val) = std::env::var("CODESWARM_ROUTER_PORT") {
            match val.parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Environment override: CODESWARM_ROUTER_PORT={}", port);
                    self.spec.router.port = port;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for CODESWARM_ROUTER_PORT: '{}'. Expected a port number. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Ok(path) = std::env::var("CODESWARM_STATE_PATH") {
            tracing::info!("Environment override: CODESWARM_STATE_PATH={}", path);
            self.spec.state.path = PathBuf::from(path);
        }

        if let Ok(val) = std::env::var("CODESWARM_STATUS_POLL") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => self.spec.status_poll.enabled = true,
                "false" | "0" | "no" | "off" => self.spec.status_poll.enabled = false,
                _ => {
                    tracing::warn!(
                        "Invalid value for CODESWARM_STATUS_POLL: '{}'. Expected true/false. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let router = &self.spec.router;
        if router.host.is_empty() {
            anyhow::bail!("spec.router.host cannot be empty");
        }
        if router.port == 0 {
            anyhow::bail!("spec.router.port cannot be 0");
        }
        if router.subscriber_capacity == 0 {
            anyhow::bail!("spec.router.subscriber_capacity must be at least 1");
        }
        if router.backoff.initial_ms == 0 {
            anyhow::bail!("spec.router.backoff.initial_ms must be at least 1");
        }
        if router.backoff.max_ms < router.backoff.initial_ms {
            anyhow::bail!(
                "spec.router.backoff.max_ms ({}) is below initial_ms ({})",
                router.backoff.max_ms,
                router.backoff.initial_ms
            );
        }
        if router.backoff.multiplier < 1.0 {
            anyhow::bail!("spec.router.backoff.multiplier must be >= 1.0");
        }

        if self.spec.server.port == 0 {
            anyhow::bail!("spec.server.port cannot be 0");
        }
        if self.spec.server.launch_reservation_secs == 0 {
            anyhow::bail!("spec.server.launch_reservation_secs must be at least 1");
        }

        if self.spec.hub.capacity == 0 {
            anyhow::bail!("spec.hub.capacity must be at least 1");
        }

        if self.spec.status_poll.enabled && self.spec.status_poll.interval_secs == 0 {
            anyhow::bail!("spec.status_poll.interval_secs must be at least 1 when polling is enabled");
        }

        Ok(())
    }
}

fn default_router_host() -> String {
    "127.0.0.1".to_string()
}

fn default_router_port() -> u16 {
    8765
}

fn default_connect_deadline_secs() -> u64 {
    120
}

fn default_subscriber_capacity() -> usize {
    1024
}

fn default_backoff_initial_ms() -> u64 {
    250
}

fn default_backoff_max_ms() -> u64 {
    5_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    4000
}

fn default_launch_reservation_secs() -> u64 {
    120
}

fn default_state_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".codeswarm").join("swarms.json"))
        .unwrap_or_else(|| PathBuf::from("./codeswarm-swarms.json"))
}

fn default_hub_capacity() -> usize {
    1000
}

fn default_poll_interval_secs() -> u64 {
    5
}
