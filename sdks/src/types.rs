// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use codeswarm_core::domain::protocol::NodeTarget;
use codeswarm_swarm::domain::{SwarmRecord, SwarmStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Marker prefix for locally generated, unconfirmed ids.
pub const PROVISIONAL_PREFIX: &str = "temp-";

pub fn is_provisional(id: &str) -> bool {
    id.starts_with(PROVISIONAL_PREFIX)
}

/// A swarm as seen by a dashboard: registry metadata plus conversation history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientSwarm {
    pub swarm_id: String,
    pub alias: String,
    pub job_id: Option<String>,
    pub node_count: u32,
    pub status: SwarmStatus,
    pub slurm_state: Option<String>,
    pub nodes: BTreeMap<u32, NodeState>,
}

impl ClientSwarm {
    pub fn from_record(record: &SwarmRecord) -> Self {
        let mut swarm = Self {
            swarm_id: record.swarm_id.to_string(),
            alias: record.alias.clone(),
            job_id: record.job_id.clone(),
            node_count: record.node_count,
            status: record.status.clone(),
            slurm_state: record.slurm_state.clone(),
            nodes: BTreeMap::new(),
        };
        swarm.ensure_nodes();
        swarm
    }

    /// Take registry metadata from `record`, keeping nodes and turns.
    pub fn update_metadata(&mut self, record: &SwarmRecord) {
        self.alias = record.alias.clone();
        self.job_id = record.job_id.clone();
        self.node_count = record.node_count;
        self.status = record.status.clone();
        self.slurm_state = record.slurm_state.clone();
        self.ensure_nodes();
    }

    pub fn is_provisional(&self) -> bool {
        is_provisional(&self.swarm_id)
    }

    /// `None` if `node_id` lies outside a swarm with a known node count.
    pub fn node_mut(&mut self, node_id: u32) -> Option<&mut NodeState> {
        if self.node_count > 0 && node_id >= self.node_count {
            return None;
        }
        Some(self.nodes.entry(node_id).or_insert_with(|| NodeState::new(node_id)))
    }

    fn ensure_nodes(&mut self) {
        for node_id in 0..self.node_count {
            self.nodes
                .entry(node_id)
                .or_insert_with(|| NodeState::new(node_id));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeState {
    pub node_id: u32,
    /// Oldest first.
    pub turns: Vec<Turn>,
}

impl NodeState {
    pub fn new(node_id: u32) -> Self {
        Self {
            node_id,
            turns: Vec::new(),
        }
    }

    pub fn turn(&self, injection_id: &str) -> Option<&Turn> {
        self.turns.iter().find(|t| t.injection_id == injection_id)
    }

    pub fn turn_mut(&mut self, injection_id: &str) -> Option<&mut Turn> {
        self.turns.iter_mut().find(|t| t.injection_id == injection_id)
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub injection_id: String,
    pub prompt: String,
    pub deltas: Vec<String>,
    pub reasoning: String,
    pub commands: Vec<CommandExecution>,
    pub error: Option<String>,
    pub usage: Option<u64>,
    pub completed: bool,
}

impl Turn {
    pub fn new(injection_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            injection_id: injection_id.into(),
            prompt: prompt.into(),
            deltas: Vec::new(),
            reasoning: String::new(),
            commands: Vec::new(),
            error: None,
            usage: None,
            completed: false,
        }
    }

    /// Assistant output so far.
    pub fn text(&self) -> String {
        self.deltas.concat()
    }

    pub fn is_provisional(&self) -> bool {
        is_provisional(&self.injection_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Started,
    Completed,
}

/// A shell command run by an agent during a turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandExecution {
    pub call_id: String,
    pub command: CommandLine,
    pub cwd: Option<String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub exit_code: Option<i64>,
    pub status: CommandStatus,
}

/// Commands are reported either as a shell string or an argv array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandLine {
    Shell(String),
    Argv(Vec<String>),
}

impl CommandLine {
    pub fn from_value(value: Option<&Value>) -> Self {
        value
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_else(|| CommandLine::Shell(String::new()))
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandLine::Shell(s) => f.write_str(s),
            CommandLine::Argv(argv) => f.write_str(&argv.join(" ")),
        }
    }
}

/// Body of `POST /launch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchRequest {
    pub nodes: u32,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// Body of `POST /inject/{alias}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectRequest {
    pub prompt: String,
    #[serde(default)]
    pub nodes: NodeTarget,
}

/// Response to any endpoint that forwarded a command to the router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandAccepted {
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub uptime_seconds: u64,
    pub router: Value,
    #[serde(default)]
    pub swarms: usize,
    #[serde(default)]
    pub dashboards: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_line_forms() {
        let shell = CommandLine::from_value(Some(&json!("ls -la")));
        assert_eq!(shell.to_string(), "ls -la");

        let argv = CommandLine::from_value(Some(&json!(["git", "status"])));
        assert_eq!(argv, CommandLine::Argv(vec!["git".into(), "status".into()]));
        assert_eq!(argv.to_string(), "git status");

        assert_eq!(CommandLine::from_value(None), CommandLine::Shell(String::new()));
    }

    #[test]
    fn test_inject_request_defaults_to_all_nodes() {
        let request: InjectRequest = serde_json::from_value(json!({"prompt": "hi"})).unwrap();
        assert_eq!(request.nodes, NodeTarget::All);
    }

    #[test]
    fn test_turn_text_concatenates_deltas() {
        let mut turn = Turn::new("t1", "q");
        turn.deltas = vec!["Hel".into(), "lo".into()];
        assert_eq!(turn.text(), "Hello");
        assert!(!turn.is_provisional());
        assert!(Turn::new("temp-1", "").is_provisional());
    }
}
