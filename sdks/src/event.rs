// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Typed view of hub messages.
//!
//! [`ClientEvent::from_message`] turns a `{type, payload}` hub message into a
//! variant the store can reduce. Messages missing the fields their kind needs
//! are dropped (`None`).

use codeswarm_core::domain::events::HubMessage;
use codeswarm_swarm::domain::SwarmRecord;
use serde_json::Value;
use tracing::debug;

use crate::types::CommandLine;

/// Addresses one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRef {
    pub swarm_id: String,
    pub node_id: Option<u32>,
    pub injection_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Full registry listing (`reconcile`, or the HTTP snapshot on connect).
    Snapshot(Vec<SwarmRecord>),
    SwarmAdded(SwarmRecord),
    SwarmLaunched {
        request_id: Option<String>,
        swarm_id: Option<String>,
    },
    CommandRejected {
        request_id: Option<String>,
        reason: Option<String>,
    },
    InjectFailed {
        request_id: Option<String>,
        error: Option<String>,
    },
    Status {
        swarm_id: String,
        status: Option<String>,
        slurm_state: Option<String>,
    },
    TurnStarted {
        turn: TurnRef,
        prompt: Option<String>,
    },
    Delta {
        turn: TurnRef,
        content: String,
    },
    Assistant {
        turn: TurnRef,
        content: String,
    },
    TurnComplete(TurnRef),
    ReasoningDelta {
        turn: TurnRef,
        content: String,
    },
    Reasoning {
        turn: TurnRef,
        content: String,
    },
    CommandStarted {
        turn: TurnRef,
        call_id: String,
        command: CommandLine,
        cwd: Option<String>,
    },
    CommandCompleted {
        turn: TurnRef,
        call_id: String,
        stdout: Option<String>,
        stderr: Option<String>,
        exit_code: Option<i64>,
    },
    AgentError {
        turn: TurnRef,
        message: String,
    },
    Usage {
        turn: TurnRef,
        total_tokens: Option<u64>,
    },
    SwarmRemoved {
        swarm_id: String,
    },
}

impl ClientEvent {
    pub fn from_message(message: &HubMessage) -> Option<Self> {
        let p = &message.payload;
        let event = match message.kind.as_str() {
            "reconcile" => ClientEvent::Snapshot(parse_records(p)),
            "swarm_added" => ClientEvent::SwarmAdded(serde_json::from_value(p.clone()).ok()?),
            "swarm_launched" => ClientEvent::SwarmLaunched {
                request_id: text(p, "request_id"),
                swarm_id: text(p, "swarm_id"),
            },
            "command_rejected" => ClientEvent::CommandRejected {
                request_id: text(p, "request_id"),
                reason: text(p, "reason").or_else(|| text(p, "error")),
            },
            "inject_failed" => ClientEvent::InjectFailed {
                request_id: text(p, "request_id"),
                error: text(p, "error").or_else(|| text(p, "reason")),
            },
            "status" => ClientEvent::Status {
                swarm_id: text(p, "swarm_id")?,
                status: text(p, "status"),
                slurm_state: text(p, "slurm_state"),
            },
            "turn_started" => ClientEvent::TurnStarted {
                turn: turn_ref(p)?,
                prompt: text(p, "prompt"),
            },
            "delta" => ClientEvent::Delta {
                turn: turn_ref(p)?,
                content: text(p, "content").unwrap_or_default(),
            },
            "assistant" => ClientEvent::Assistant {
                turn: turn_ref(p)?,
                content: text(p, "content").unwrap_or_default(),
            },
            "turn_complete" => ClientEvent::TurnComplete(turn_ref(p)?),
            "reasoning_delta" => ClientEvent::ReasoningDelta {
                turn: turn_ref(p)?,
                content: text(p, "content").unwrap_or_default(),
            },
            "reasoning" => ClientEvent::Reasoning {
                turn: turn_ref(p)?,
                content: text(p, "content").unwrap_or_default(),
            },
            "command_started" => ClientEvent::CommandStarted {
                turn: turn_ref(p)?,
                call_id: text(p, "call_id")?,
                command: CommandLine::from_value(p.get("command")),
                cwd: text(p, "cwd"),
            },
            "command_completed" => ClientEvent::CommandCompleted {
                turn: turn_ref(p)?,
                call_id: text(p, "call_id")?,
                stdout: text(p, "stdout"),
                stderr: text(p, "stderr"),
                exit_code: p.get("exit_code").and_then(Value::as_i64),
            },
            "agent_error" => ClientEvent::AgentError {
                turn: turn_ref(p)?,
                message: text(p, "message")
                    .or_else(|| text(p, "error"))
                    .unwrap_or_else(|| "agent error".to_string()),
            },
            "usage" => ClientEvent::Usage {
                turn: turn_ref(p)?,
                total_tokens: p.get("total_tokens").and_then(Value::as_u64),
            },
            "swarm_removed" => ClientEvent::SwarmRemoved {
                swarm_id: text(p, "swarm_id")?,
            },
            other => {
                debug!(kind = other, "Hub message not handled by store");
                return None;
            }
        };
        Some(event)
    }
}

fn text(payload: &Value, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Node ids may arrive as numbers or numeric strings.
fn node_id(payload: &Value) -> Option<u32> {
    match payload.get("node_id")? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn turn_ref(payload: &Value) -> Option<TurnRef> {
    Some(TurnRef {
        swarm_id: text(payload, "swarm_id")?,
        node_id: node_id(payload),
        injection_id: text(payload, "injection_id")?,
    })
}

fn parse_records(payload: &Value) -> Vec<SwarmRecord> {
    payload
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}
