// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Browser-facing hub messages.
//!
//! Every message relayed to dashboards is `{"type": <kind>, "payload": <data>}`.
//! Kinds mirror the router's event names except where the dashboard protocol
//! historically used a shorter or derived name (see [`browser_kind`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::protocol::router_events;

/// Message kinds that only exist on the browser side of the hub.
pub mod hub_kinds {
    pub const SWARM_ADDED: &str = "swarm_added";
    pub const SWARM_REMOVED: &str = "swarm_removed";
    pub const RECONCILE: &str = "reconcile";
    pub const STATUS: &str = "status";
    pub const DELTA: &str = "delta";
}

/// A single message fanned out to every connected dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl HubMessage {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Map a router event name to the name dashboards expect.
pub fn browser_kind(router_event: &str) -> &str {
    match router_event {
        router_events::ASSISTANT_DELTA => hub_kinds::DELTA,
        router_events::SWARM_STATUS => hub_kinds::STATUS,
        router_events::SWARM_TERMINATED => hub_kinds::SWARM_REMOVED,
        other => other,
    }
}
