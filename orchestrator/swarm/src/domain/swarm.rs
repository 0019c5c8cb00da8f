// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Records
//!
//! - [`SwarmId`] — opaque identifier assigned by the router.
//! - [`SwarmStatus`] — lifecycle tag.
//! - [`SwarmRecord`] — the registry's view of one swarm.
//! - [`ListedSwarm`] — one entry of a router `swarm_list` enumeration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identifier assigned by the router. Immutable primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SwarmId(pub String);

impl SwarmId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SwarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SwarmId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Lifecycle tag reported by the router.
///
/// Unrecognised values are kept verbatim in [`SwarmStatus::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SwarmStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Terminated,
    Other(String),
}

impl SwarmStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SwarmStatus::Pending => "pending",
            SwarmStatus::Running => "running",
            SwarmStatus::Completed => "completed",
            SwarmStatus::Failed => "failed",
            SwarmStatus::Terminated => "terminated",
            SwarmStatus::Other(s) => s,
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, SwarmStatus::Terminated)
    }

    /// Parse a status value from a router event.
    ///
    /// Returns `None` for inconclusive status checks (missing, null, `not_found`,
    /// `unknown`), which must never replace a known status.
    pub fn from_report(value: Option<&Value>) -> Option<Self> {
        let text = value?.as_str()?.trim();
        if text.is_empty() {
            return None;
        }
        match text.to_ascii_lowercase().as_str() {
            "not_found" | "notfound" | "not found" | "unknown" => None,
            _ => Some(SwarmStatus::from(text.to_string())),
        }
    }
}

impl From<String> for SwarmStatus {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "pending" => SwarmStatus::Pending,
            "running" => SwarmStatus::Running,
            "completed" => SwarmStatus::Completed,
            "failed" => SwarmStatus::Failed,
            "terminated" => SwarmStatus::Terminated,
            _ => SwarmStatus::Other(value),
        }
    }
}

impl From<SwarmStatus> for String {
    fn from(value: SwarmStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for SwarmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmRecord {
    pub swarm_id: SwarmId,
    pub alias: String,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub node_count: u32,
    pub status: SwarmStatus,
    /// Scheduler state as last reported. Advisory only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slurm_state: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SwarmRecord {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Alias given to swarms that arrive without an operator-chosen one.
pub fn default_alias(swarm_id: &SwarmId) -> String {
    let prefix: String = swarm_id.as_str().chars().take(8).collect();
    format!("swarm-{}", prefix)
}

/// One swarm as enumerated by the router's `swarm_list`.
#[derive(Debug, Clone, PartialEq)]
pub struct ListedSwarm {
    pub swarm_id: SwarmId,
    pub job_id: Option<String>,
    pub node_count: u32,
    /// `None` when the listing carried no conclusive status.
    pub status: Option<SwarmStatus>,
}

impl ListedSwarm {
    /// Parse `data.swarms` of a `swarm_list` event: `{swarm_id: {job_id, node_count, status}}`.
    pub fn parse_listing(swarms: &Value) -> Vec<ListedSwarm> {
        let Some(map) = swarms.as_object() else {
            return Vec::new();
        };
        map.iter()
            .map(|(swarm_id, entry)| ListedSwarm {
                swarm_id: SwarmId::new(swarm_id.clone()),
                job_id: entry.get("job_id").and_then(scalar_to_string),
                node_count: entry
                    .get("node_count")
                    .and_then(Value::as_u64)
                    .and_then(|n| u32::try_from(n).ok())
                    .unwrap_or(0),
                status: SwarmStatus::from_report(entry.get("status")),
            })
            .collect()
    }
}

/// Job ids may be reported as strings or numbers.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
