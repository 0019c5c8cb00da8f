// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Router Wire Protocol
//!
//! Newline-delimited JSON exchanged with the upstream router.
//!
//! Outbound commands:
//!
//! ```json
//! {"protocol":"codeswarm.router.v1","type":"command","command":"swarm_status",
//!  "request_id":"…","payload":{"swarm_id":"…"}}
//! ```
//!
//! Inbound events:
//!
//! ```json
//! {"protocol":"codeswarm.router.v1","type":"event","event":"swarm_status",
//!  "data":{"request_id":"…","swarm_id":"…","status":"running"}}
//! ```
//!
//! An inbound event whose `data.request_id` is set is a *correlated response*
//! to the command that carried that id; everything else is a *broadcast*.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Protocol tag stamped on every command envelope.
pub const PROTOCOL: &str = "codeswarm.router.v1";

/// Event names emitted by the router.
pub mod router_events {
    pub const SWARM_LAUNCHED: &str = "swarm_launched";
    pub const SWARM_LIST: &str = "swarm_list";
    pub const SWARM_STATUS: &str = "swarm_status";
    pub const SWARM_TERMINATED: &str = "swarm_terminated";
    pub const SWARM_REMOVED: &str = "swarm_removed";
    pub const COMMAND_REJECTED: &str = "command_rejected";
    pub const TURN_STARTED: &str = "turn_started";
    pub const ASSISTANT_DELTA: &str = "assistant_delta";
    pub const ASSISTANT: &str = "assistant";
    pub const TURN_COMPLETE: &str = "turn_complete";
    pub const USAGE: &str = "usage";
    pub const INJECT_ACK: &str = "inject_ack";
    pub const INJECT_DELIVERED: &str = "inject_delivered";
    pub const INJECT_FAILED: &str = "inject_failed";
}

/// Correlates a command with the responses it eventually produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generate a fresh random request id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Which nodes of a swarm an injection addresses.
///
/// Serialized as the string `"all"` or a bare node index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodeTarget {
    #[default]
    All,
    Node(u32),
}

impl NodeTarget {
    /// Whether `node_id` is addressed by this target.
    pub fn includes(&self, node_id: u32) -> bool {
        match self {
            NodeTarget::All => true,
            NodeTarget::Node(id) => *id == node_id,
        }
    }
}

impl fmt::Display for NodeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeTarget::All => f.write_str("all"),
            NodeTarget::Node(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for NodeTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(NodeTarget::All);
        }
        trimmed
            .parse::<u32>()
            .map(NodeTarget::Node)
            .map_err(|_| format!("invalid node target '{}': expected 'all' or a node index", s))
    }
}

impl Serialize for NodeTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NodeTarget::All => serializer.serialize_str("all"),
            NodeTarget::Node(id) => serializer.serialize_u32(*id),
        }
    }
}

impl<'de> Deserialize<'de> for NodeTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Index(u32),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Index(id) => Ok(NodeTarget::Node(id)),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Commands understood by the router.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SwarmLaunch { nodes: u32, system_prompt: String },
    SwarmList,
    SwarmStatus { swarm_id: String },
    Inject { swarm_id: String, nodes: NodeTarget, content: String },
    SwarmTerminate { swarm_id: String },
}

impl Command {
    /// Wire name of the command.
    pub fn name(&self) -> &'static str {
        match self {
            Command::SwarmLaunch { .. } => "swarm_launch",
            Command::SwarmList => "swarm_list",
            Command::SwarmStatus { .. } => "swarm_status",
            Command::Inject { .. } => "inject",
            Command::SwarmTerminate { .. } => "swarm_terminate",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            Command::SwarmLaunch { nodes, system_prompt } => {
                json!({ "nodes": nodes, "system_prompt": system_prompt })
            }
            Command::SwarmList => json!({}),
            Command::SwarmStatus { swarm_id } => json!({ "swarm_id": swarm_id }),
            Command::Inject { swarm_id, nodes, content } => {
                json!({ "swarm_id": swarm_id, "nodes": nodes, "content": content })
            }
            Command::SwarmTerminate { swarm_id } => json!({ "swarm_id": swarm_id }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Command,
    Event,
}

/// Outbound command envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub protocol: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub command: String,
    pub request_id: RequestId,
    pub payload: Value,
}

impl CommandEnvelope {
    /// Wrap `command` under a freshly generated request id.
    pub fn new(command: &Command) -> Self {
        Self::with_request_id(command, RequestId::new())
    }

    pub fn with_request_id(command: &Command, request_id: RequestId) -> Self {
        Self {
            protocol: PROTOCOL.to_string(),
            kind: MessageKind::Command,
            command: command.name().to_string(),
            request_id,
            payload: command.payload(),
        }
    }

    pub fn to_value(&self) -> Value {
        // A struct of strings and JSON values always serializes.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// How an inbound event relates to outstanding commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correlation<'a> {
    /// Response to the command with this request id.
    Response(&'a str),
    /// Uncorrelated streaming notification.
    Broadcast,
}

/// Inbound event from the router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl RouterEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            protocol: Some(PROTOCOL.to_string()),
            event: event.into(),
            data,
        }
    }

    /// Classify a raw inbound message. Only `type: "event"` messages are events.
    pub fn from_message(message: &Value) -> Option<Self> {
        if message.get("type").and_then(Value::as_str) != Some("event") {
            return None;
        }
        serde_json::from_value(message.clone()).ok()
    }

    /// Wire form including the `type: "event"` discriminator.
    pub fn to_message(&self) -> Value {
        let mut message = json!({
            "type": "event",
            "event": self.event,
            "data": self.data,
        });
        if let Some(protocol) = &self.protocol {
            message["protocol"] = Value::String(protocol.clone());
        }
        message
    }

    pub fn request_id(&self) -> Option<&str> {
        self.data.get("request_id").and_then(Value::as_str)
    }

    pub fn correlation(&self) -> Correlation<'_> {
        match self.request_id() {
            Some(id) => Correlation::Response(id),
            None => Correlation::Broadcast,
        }
    }

    pub fn is_response_to(&self, request_id: &RequestId) -> bool {
        self.request_id() == Some(request_id.as_str())
    }

    pub fn is_rejection(&self) -> bool {
        self.event == router_events::COMMAND_REJECTED
    }

    /// Human-readable reason carried by a `command_rejected` event.
    pub fn rejection_reason(&self) -> Option<&str> {
        self.data
            .get("reason")
            .or_else(|| self.data.get("error"))
            .and_then(Value::as_str)
    }

    pub fn swarm_id(&self) -> Option<&str> {
        self.data.get("swarm_id").and_then(Value::as_str)
    }
}
