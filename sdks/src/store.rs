// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Client Reconciliation Store
//!
//! Folds the hub feed into a per-swarm, per-node, per-turn conversation view.
//! Every mutation goes through [`ClientStore::reduce`]; the store does no I/O.
//!
//! # Out-of-order turn events
//!
//! A turn's `delta`, `assistant` and `turn_complete` events may arrive before
//! its `turn_started`. Those are buffered per `injection_id` and drained into
//! the turn the moment it is created. Enrichment events (reasoning, commands,
//! errors, usage) for an unknown turn are dropped.
//!
//! Buffering does not wait for the swarm to be known. A buffer whose
//! `turn_started` will never come is dropped when its swarm goes away, when
//! its `turn_started` names an unknown swarm or node, or when a newer turn
//! starts on the same node.
//!
//! # Optimistic entries
//!
//! - [`ClientStore::submit_prompt`] appends a `temp-` placeholder turn to the
//!   target nodes. The next `turn_started` on a node replaces the first
//!   unconfirmed placeholder in place.
//! - [`ClientStore::begin_launch`] inserts a `temp-` placeholder swarm that
//!   `swarm_added` (matched by alias) replaces and `command_rejected` discards.
//!
//! The hub may answer a command before the dashboard registers it. Outcomes
//! for unknown request ids are remembered (the last [`RECENT_OUTCOMES`]) and
//! applied when the launch or injection is registered.

use codeswarm_core::domain::events::HubMessage;
use codeswarm_core::domain::protocol::NodeTarget;
use codeswarm_swarm::domain::{SwarmRecord, SwarmStatus};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::debug;
use uuid::Uuid;

use crate::event::{ClientEvent, TurnRef};
use crate::types::{
    ClientSwarm, CommandExecution, CommandStatus, NodeState, Turn, PROVISIONAL_PREFIX,
};

#[derive(Debug, Clone, PartialEq)]
pub struct PendingLaunch {
    pub alias: String,
    pub placeholder_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingInjection {
    pub swarm_id: String,
    pub placeholder_id: String,
}

/// Answered request ids kept for commands not yet registered locally.
pub const RECENT_OUTCOMES: usize = 64;

#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Confirmed,
    Rejected(Option<String>),
}

/// Turn events received before the turn's `turn_started`.
#[derive(Debug, Clone, Default)]
struct BufferedTurn {
    swarm_id: String,
    node_id: Option<u32>,
    deltas: Vec<String>,
    assistant: Option<String>,
    completed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ClientStore {
    swarms: BTreeMap<String, ClientSwarm>,
    pending_launches: HashMap<String, PendingLaunch>,
    pending_injections: HashMap<String, PendingInjection>,
    buffered: HashMap<String, BufferedTurn>,
    recent_outcomes: VecDeque<(String, Outcome)>,
    launch_error: Option<String>,
    inject_error: Option<String>,
}

impl ClientStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and reduce a hub message. Returns `false` if it was not understood.
    pub fn apply(&mut self, message: &HubMessage) -> bool {
        match ClientEvent::from_message(message) {
            Some(event) => {
                self.reduce(event);
                true
            }
            None => false,
        }
    }

    pub fn reduce(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Snapshot(records) => self.set_swarms(&records),
            ClientEvent::SwarmAdded(record) => self.add_swarm(&record),
            ClientEvent::SwarmLaunched { request_id, .. } => {
                if let Some(request_id) = request_id {
                    match self.pending_launches.remove(&request_id) {
                        Some(pending) => {
                            self.swarms.remove(&pending.placeholder_id);
                        }
                        None => self.remember(request_id, Outcome::Confirmed),
                    }
                }
                self.launch_error = None;
            }
            ClientEvent::CommandRejected { request_id, reason } => {
                let Some(request_id) = request_id else { return };
                if let Some(pending) = self.pending_launches.remove(&request_id) {
                    self.swarms.remove(&pending.placeholder_id);
                    self.launch_error = Some(launch_failure(reason));
                } else if self.pending_injections.contains_key(&request_id) {
                    self.fail_injection(&request_id, reason);
                } else {
                    self.remember(request_id, Outcome::Rejected(reason));
                }
            }
            ClientEvent::InjectFailed { request_id, error } => {
                let Some(request_id) = request_id else { return };
                if self.pending_injections.contains_key(&request_id) {
                    self.fail_injection(&request_id, error);
                } else {
                    self.remember(request_id, Outcome::Rejected(error));
                }
            }
            ClientEvent::Status {
                swarm_id,
                status,
                slurm_state,
            } => {
                // Payloads without a status carry nothing conclusive.
                let (Some(swarm), Some(status)) = (self.swarms.get_mut(&swarm_id), status) else {
                    return;
                };
                swarm.status = SwarmStatus::from(status);
                swarm.slurm_state = slurm_state;
            }
            ClientEvent::TurnStarted { turn, prompt } => self.start_turn(&turn, prompt),
            ClientEvent::Delta { turn, content } => match self.turn_mut(&turn) {
                Some(t) => t.deltas.push(content),
                None => {
                    if let Some(buffered) = self.buffer(&turn) {
                        buffered.deltas.push(content);
                    }
                }
            },
            ClientEvent::Assistant { turn, content } => match self.turn_mut(&turn) {
                Some(t) => {
                    if t.deltas.is_empty() {
                        t.deltas.push(content);
                    }
                }
                None => {
                    if let Some(buffered) = self.buffer(&turn) {
                        buffered.assistant = Some(content);
                    }
                }
            },
            ClientEvent::TurnComplete(turn) => match self.turn_mut(&turn) {
                Some(t) => t.completed = true,
                None => {
                    if let Some(buffered) = self.buffer(&turn) {
                        buffered.completed = true;
                    }
                }
            },
            ClientEvent::ReasoningDelta { turn, content } => {
                if let Some(t) = self.turn_mut(&turn) {
                    t.reasoning.push_str(&content);
                }
            }
            ClientEvent::Reasoning { turn, content } => {
                if let Some(t) = self.turn_mut(&turn) {
                    t.reasoning = content;
                }
            }
            ClientEvent::CommandStarted {
                turn,
                call_id,
                command,
                cwd,
            } => {
                if let Some(t) = self.turn_mut(&turn) {
                    t.commands.push(CommandExecution {
                        call_id,
                        command,
                        cwd,
                        stdout: None,
                        stderr: None,
                        exit_code: None,
                        status: CommandStatus::Started,
                    });
                }
            }
            ClientEvent::CommandCompleted {
                turn,
                call_id,
                stdout,
                stderr,
                exit_code,
            } => {
                if let Some(t) = self.turn_mut(&turn) {
                    if let Some(c) = t.commands.iter_mut().find(|c| c.call_id == call_id) {
                        c.status = CommandStatus::Completed;
                        c.stdout = stdout;
                        c.stderr = stderr;
                        c.exit_code = exit_code;
                    }
                }
            }
            ClientEvent::AgentError { turn, message } => {
                if let Some(t) = self.turn_mut(&turn) {
                    t.error = Some(message);
                }
            }
            ClientEvent::Usage { turn, total_tokens } => {
                if let Some(t) = self.turn_mut(&turn) {
                    t.usage = total_tokens;
                }
            }
            ClientEvent::SwarmRemoved { swarm_id } => {
                self.swarms.remove(&swarm_id);
                self.pending_injections.retain(|_, p| p.swarm_id != swarm_id);
                self.buffered.retain(|_, b| b.swarm_id != swarm_id);
            }
        }
    }

    /// Replace the swarm directory with `records`, keeping the node and turn
    /// history of swarms already known. Placeholders for launches still in
    /// flight survive unless a listed swarm now carries their alias.
    pub fn set_swarms(&mut self, records: &[SwarmRecord]) {
        let mut updated = BTreeMap::new();
        for record in records {
            let id = record.swarm_id.to_string();
            let swarm = match self.swarms.remove(&id) {
                Some(mut existing) => {
                    existing.update_metadata(record);
                    existing
                }
                None => ClientSwarm::from_record(record),
            };
            updated.insert(id, swarm);
        }

        let listed_aliases: HashSet<String> =
            records.iter().map(|r| r.alias.to_lowercase()).collect();
        let in_flight: HashSet<&str> = self
            .pending_launches
            .values()
            .map(|p| p.placeholder_id.as_str())
            .collect();
        for (id, swarm) in std::mem::take(&mut self.swarms) {
            if swarm.is_provisional()
                && in_flight.contains(id.as_str())
                && !listed_aliases.contains(&swarm.alias.to_lowercase())
            {
                updated.insert(id, swarm);
            }
        }

        self.swarms = updated;
        let swarms = &self.swarms;
        self.buffered.retain(|_, b| swarms.contains_key(&b.swarm_id));
    }

    fn add_swarm(&mut self, record: &SwarmRecord) {
        let id = record.swarm_id.to_string();
        if let Some(existing) = self.swarms.get_mut(&id) {
            existing.update_metadata(record);
            return;
        }

        let mut swarm = ClientSwarm::from_record(record);
        let alias = record.alias.to_lowercase();
        let placeholder = self
            .swarms
            .iter()
            .find(|(_, s)| s.is_provisional() && s.alias.to_lowercase() == alias)
            .map(|(id, _)| id.clone());
        if let Some(placeholder_id) = placeholder {
            if let Some(provisional) = self.swarms.remove(&placeholder_id) {
                debug!(swarm_id = %id, "Replacing provisional swarm");
                for (node_id, node) in provisional.nodes {
                    swarm.nodes.entry(node_id).or_insert(node);
                }
            }
        }
        self.swarms.insert(id, swarm);
    }

    /// Buffer slot for a turn not started yet. The swarm may still be
    /// unknown; `None` if it is known and has no such node.
    fn buffer(&mut self, turn: &TurnRef) -> Option<&mut BufferedTurn> {
        if let (Some(swarm), Some(node_id)) = (self.swarms.get(&turn.swarm_id), turn.node_id) {
            if swarm.node_count > 0 && node_id >= swarm.node_count {
                debug!(swarm_id = %turn.swarm_id, node_id, "Turn event for node outside swarm");
                return None;
            }
        }
        Some(
            self.buffered
                .entry(turn.injection_id.clone())
                .or_insert_with(|| BufferedTurn {
                    swarm_id: turn.swarm_id.clone(),
                    node_id: turn.node_id,
                    ..BufferedTurn::default()
                }),
        )
    }

    fn start_turn(&mut self, turn: &TurnRef, prompt: Option<String>) {
        let buffered = self.buffered.remove(&turn.injection_id);
        let Some(swarm) = self.swarms.get_mut(&turn.swarm_id) else {
            debug!(swarm_id = %turn.swarm_id, "turn_started for unknown swarm");
            return;
        };
        let Some(node_id) = turn.node_id else {
            debug!(injection_id = %turn.injection_id, "turn_started without node_id");
            return;
        };
        let Some(node) = swarm.node_mut(node_id) else {
            debug!(swarm_id = %turn.swarm_id, node_id, "turn_started for node outside swarm");
            return;
        };
        if node.turn(&turn.injection_id).is_some() {
            return;
        }

        let provisional = node
            .turns
            .iter()
            .position(|t| t.is_provisional() && !t.completed);
        let prompt = prompt
            .or_else(|| provisional.map(|i| node.turns[i].prompt.clone()))
            .unwrap_or_default();

        let mut new_turn = Turn::new(turn.injection_id.clone(), prompt);
        if let Some(buffered) = buffered {
            new_turn.deltas = buffered.deltas;
            if let Some(content) = buffered.assistant {
                if new_turn.deltas.is_empty() {
                    new_turn.deltas.push(content);
                }
            }
            new_turn.completed = buffered.completed;
        }

        // Only one open turn per node: anything older is finished.
        for older in node
            .turns
            .iter_mut()
            .filter(|t| !t.completed && !t.is_provisional())
        {
            debug!(injection_id = %older.injection_id, "Superseded open turn");
            older.completed = true;
        }

        match provisional {
            Some(index) => node.turns[index] = new_turn,
            None => node.turns.push(new_turn),
        }

        // Buffers left on this node belong to turns whose start was missed.
        self.buffered.retain(|injection_id, b| {
            let stale = b.swarm_id == turn.swarm_id && b.node_id == Some(node_id);
            if stale {
                debug!(injection_id = %injection_id, "Dropping buffered events of superseded turn");
            }
            !stale
        });
        self.prune_injections();
    }

    fn turn_mut(&mut self, turn: &TurnRef) -> Option<&mut Turn> {
        let swarm = self.swarms.get_mut(&turn.swarm_id)?;
        match turn.node_id {
            Some(node_id) => swarm.nodes.get_mut(&node_id)?.turn_mut(&turn.injection_id),
            None => swarm
                .nodes
                .values_mut()
                .find_map(|node| node.turn_mut(&turn.injection_id)),
        }
    }

    /// Optimistically register a launch. Returns the placeholder swarm id, or
    /// `None` if the hub already answered `request_id` or a confirmed swarm
    /// with this alias already exists.
    pub fn begin_launch(
        &mut self,
        request_id: impl Into<String>,
        alias: impl Into<String>,
        node_count: u32,
    ) -> Option<String> {
        let request_id = request_id.into();
        let alias = alias.into();
        match self.take_outcome(&request_id) {
            Some(Outcome::Confirmed) => return None,
            Some(Outcome::Rejected(reason)) => {
                self.launch_error = Some(launch_failure(reason));
                return None;
            }
            None => {}
        }
        if self.swarm_by_alias(&alias).is_some() {
            return None;
        }
        let placeholder_id = format!("{}{}", PROVISIONAL_PREFIX, request_id);
        let mut swarm = ClientSwarm {
            swarm_id: placeholder_id.clone(),
            alias: alias.clone(),
            job_id: None,
            node_count,
            status: SwarmStatus::Pending,
            slurm_state: None,
            nodes: BTreeMap::new(),
        };
        for node_id in 0..node_count {
            swarm.nodes.insert(node_id, NodeState::new(node_id));
        }
        self.swarms.insert(placeholder_id.clone(), swarm);
        self.pending_launches.insert(
            request_id,
            PendingLaunch {
                alias,
                placeholder_id: placeholder_id.clone(),
            },
        );
        Some(placeholder_id)
    }

    /// Drop a launch that never reached the router.
    pub fn abandon_launch(&mut self, request_id: &str) {
        if let Some(pending) = self.pending_launches.remove(request_id) {
            self.swarms.remove(&pending.placeholder_id);
        }
    }

    /// Append a placeholder turn for `prompt` to every targeted node.
    ///
    /// Returns the placeholder id, or `None` if the swarm or node is unknown.
    pub fn submit_prompt(
        &mut self,
        swarm_id: &str,
        target: NodeTarget,
        prompt: &str,
    ) -> Option<String> {
        let swarm = self.swarms.get_mut(swarm_id)?;
        let placeholder_id = format!("{}{}", PROVISIONAL_PREFIX, Uuid::new_v4());
        match target {
            NodeTarget::All => {
                for node in swarm.nodes.values_mut() {
                    node.turns.push(Turn::new(placeholder_id.clone(), prompt));
                }
            }
            NodeTarget::Node(node_id) => {
                swarm
                    .node_mut(node_id)?
                    .turns
                    .push(Turn::new(placeholder_id.clone(), prompt));
            }
        }
        self.inject_error = None;
        Some(placeholder_id)
    }

    /// Associate a placeholder with the request id the backend returned, so a
    /// later rejection can discard it. A rejection that already arrived is
    /// applied right away.
    pub fn track_injection(
        &mut self,
        request_id: impl Into<String>,
        swarm_id: impl Into<String>,
        placeholder_id: impl Into<String>,
    ) {
        let request_id = request_id.into();
        let placeholder_id = placeholder_id.into();
        if let Some(Outcome::Rejected(reason)) = self.take_outcome(&request_id) {
            self.discard_prompt(&placeholder_id);
            self.inject_error = Some(injection_failure(reason));
            return;
        }
        self.pending_injections.insert(
            request_id,
            PendingInjection {
                swarm_id: swarm_id.into(),
                placeholder_id,
            },
        );
        // Already confirmed by a turn_started.
        self.prune_injections();
    }

    /// Remove every placeholder turn carrying `placeholder_id`.
    pub fn discard_prompt(&mut self, placeholder_id: &str) {
        for swarm in self.swarms.values_mut() {
            for node in swarm.nodes.values_mut() {
                node.turns.retain(|t| t.injection_id != placeholder_id);
            }
        }
        self.pending_injections
            .retain(|_, p| p.placeholder_id != placeholder_id);
    }

    fn fail_injection(&mut self, request_id: &str, reason: Option<String>) {
        if let Some(pending) = self.pending_injections.remove(request_id) {
            self.discard_prompt(&pending.placeholder_id);
        }
        self.inject_error = Some(injection_failure(reason));
    }

    fn remember(&mut self, request_id: String, outcome: Outcome) {
        if self.recent_outcomes.len() == RECENT_OUTCOMES {
            self.recent_outcomes.pop_front();
        }
        self.recent_outcomes.push_back((request_id, outcome));
    }

    fn take_outcome(&mut self, request_id: &str) -> Option<Outcome> {
        let index = self
            .recent_outcomes
            .iter()
            .position(|(id, _)| id == request_id)?;
        self.recent_outcomes.remove(index).map(|(_, outcome)| outcome)
    }

    fn prune_injections(&mut self) {
        let swarms = &self.swarms;
        self.pending_injections.retain(|_, pending| {
            swarms.get(&pending.swarm_id).is_some_and(|swarm| {
                swarm
                    .nodes
                    .values()
                    .any(|node| node.turn(&pending.placeholder_id).is_some())
            })
        });
    }

    pub fn swarms(&self) -> impl Iterator<Item = &ClientSwarm> {
        self.swarms.values()
    }

    pub fn swarm(&self, swarm_id: &str) -> Option<&ClientSwarm> {
        self.swarms.get(swarm_id)
    }

    /// Confirmed swarm with this alias (case-insensitive).
    pub fn swarm_by_alias(&self, alias: &str) -> Option<&ClientSwarm> {
        let alias = alias.to_lowercase();
        self.swarms
            .values()
            .find(|s| !s.is_provisional() && s.alias.to_lowercase() == alias)
    }

    pub fn launch_error(&self) -> Option<&str> {
        self.launch_error.as_deref()
    }

    pub fn clear_launch_error(&mut self) {
        self.launch_error = None;
    }

    pub fn inject_error(&self) -> Option<&str> {
        self.inject_error.as_deref()
    }

    pub fn clear_inject_error(&mut self) {
        self.inject_error = None;
    }

    pub fn pending_launches(&self) -> usize {
        self.pending_launches.len()
    }

    pub fn pending_injections(&self) -> usize {
        self.pending_injections.len()
    }

    /// Injection ids with buffered events still waiting for `turn_started`.
    pub fn buffered_turns(&self) -> usize {
        self.buffered.len()
    }
}

fn launch_failure(reason: Option<String>) -> String {
    reason.unwrap_or_else(|| "Launch failed.".to_string())
}

fn injection_failure(reason: Option<String>) -> String {
    reason.unwrap_or_else(|| "Injection rejected.".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use codeswarm_swarm::domain::SwarmId;
    use serde_json::{json, Value};

    fn record(id: &str, alias: &str, nodes: u32) -> SwarmRecord {
        SwarmRecord {
            swarm_id: SwarmId::from(id),
            alias: alias.to_string(),
            job_id: Some("1".into()),
            node_count: nodes,
            status: SwarmStatus::Running,
            slurm_state: None,
            created_at: Utc::now(),
        }
    }

    fn msg(kind: &str, payload: Value) -> HubMessage {
        HubMessage::new(kind, payload)
    }

    fn store_with_swarm() -> ClientStore {
        let mut store = ClientStore::new();
        store.set_swarms(&[record("s1", "alpha", 2)]);
        store
    }

    fn started(id: &str) -> HubMessage {
        msg("turn_started", json!({"swarm_id": "s1", "node_id": 0, "injection_id": id}))
    }

    fn delta(id: &str, content: &str) -> HubMessage {
        msg("delta", json!({"swarm_id": "s1", "node_id": 0, "injection_id": id, "content": content}))
    }

    fn complete(id: &str) -> HubMessage {
        msg("turn_complete", json!({"swarm_id": "s1", "node_id": 0, "injection_id": id}))
    }

    fn node0(store: &ClientStore) -> &NodeState {
        &store.swarm("s1").unwrap().nodes[&0]
    }

    fn permutations(items: &[usize]) -> Vec<Vec<usize>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, head);
                out.push(tail);
            }
        }
        out
    }

    #[test]
    fn test_in_order_turn() {
        let mut store = store_with_swarm();
        for m in [started("t1"), delta("t1", "Hel"), delta("t1", "lo"), complete("t1")] {
            assert!(store.apply(&m));
        }
        let turn = node0(&store).last_turn().unwrap();
        assert_eq!(turn.text(), "Hello");
        assert!(turn.completed);
    }

    #[test]
    fn test_any_arrival_order_converges() {
        let events = [started("t1"), delta("t1", "Hel"), delta("t1", "lo"), complete("t1")];

        let mut reference = store_with_swarm();
        for m in &events {
            reference.apply(m);
        }
        let expected = node0(&reference).turns.clone();

        let mut checked = 0;
        for order in permutations(&[0, 1, 2, 3]) {
            // Deltas keep their stream order.
            let d1 = order.iter().position(|&i| i == 1).unwrap();
            let d2 = order.iter().position(|&i| i == 2).unwrap();
            if d1 > d2 {
                continue;
            }
            let mut store = store_with_swarm();
            for &i in &order {
                store.apply(&events[i]);
            }
            assert_eq!(node0(&store).turns, expected, "order {:?}", order);
            assert_eq!(store.buffered_turns(), 0);
            checked += 1;
        }
        assert_eq!(checked, 12);
    }

    #[test]
    fn test_buffered_assistant_only_when_no_deltas() {
        let mut store = store_with_swarm();
        store.apply(&msg(
            "assistant",
            json!({"swarm_id": "s1", "node_id": 0, "injection_id": "t1", "content": "Full"}),
        ));
        store.apply(&started("t1"));
        assert_eq!(node0(&store).turn("t1").unwrap().text(), "Full");

        // A full message after deltas does not duplicate them.
        store.apply(&started("t2"));
        store.apply(&delta("t2", "a"));
        store.apply(&msg(
            "assistant",
            json!({"swarm_id": "s1", "node_id": 0, "injection_id": "t2", "content": "ab"}),
        ));
        assert_eq!(node0(&store).turn("t2").unwrap().deltas, vec!["a".to_string()]);
    }

    #[test]
    fn test_optimistic_prompt_replaced_in_place() {
        let mut store = store_with_swarm();
        let placeholder = store.submit_prompt("s1", NodeTarget::All, "hello?").unwrap();
        assert!(placeholder.starts_with("temp-"));
        assert_eq!(node0(&store).turns.len(), 1);
        assert_eq!(store.swarm("s1").unwrap().nodes[&1].turns.len(), 1);

        store.apply(&started("t1"));
        let turns = &node0(&store).turns;
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].injection_id, "t1");
        assert_eq!(turns[0].prompt, "hello?");
        // Node 1 still waits for its own turn_started.
        assert!(store.swarm("s1").unwrap().nodes[&1].turns[0].is_provisional());
    }

    #[test]
    fn test_rejected_injection_discards_placeholders() {
        let mut store = store_with_swarm();
        let placeholder = store.submit_prompt("s1", NodeTarget::Node(1), "hi").unwrap();
        store.track_injection("r-1", "s1", placeholder);

        store.apply(&msg("command_rejected", json!({"request_id": "r-1", "reason": "busy"})));
        assert!(store.swarm("s1").unwrap().nodes[&1].turns.is_empty());
        assert_eq!(store.inject_error(), Some("busy"));
        assert_eq!(store.pending_injections(), 0);
    }

    #[test]
    fn test_new_turn_supersedes_open_turn() {
        let mut store = store_with_swarm();
        store.apply(&started("t1"));
        store.apply(&started("t2"));
        let turns = &node0(&store).turns;
        assert!(turns[0].completed);
        assert!(!turns[1].completed);
        assert_eq!(turns.iter().filter(|t| !t.completed).count(), 1);
    }

    #[test]
    fn test_snapshot_preserves_history() {
        let mut store = store_with_swarm();
        store.apply(&started("t1"));
        store.apply(&delta("t1", "kept"));

        let mut updated = record("s1", "alpha", 2);
        updated.status = SwarmStatus::Completed;
        store.set_swarms(&[updated, record("s2", "beta", 1)]);

        let s1 = store.swarm("s1").unwrap();
        assert_eq!(s1.status, SwarmStatus::Completed);
        assert_eq!(s1.nodes[&0].turns[0].text(), "kept");
        assert_eq!(store.swarm("s2").unwrap().nodes.len(), 1);

        // Absent from the next listing: gone.
        store.set_swarms(&[record("s2", "beta", 1)]);
        assert!(store.swarm("s1").is_none());
    }

    #[test]
    fn test_launch_placeholder_lifecycle() {
        let mut store = ClientStore::new();
        let placeholder = store.begin_launch("r-1", "Gamma", 2).unwrap();
        assert!(store.swarm(&placeholder).is_some());

        // A snapshot that doesn't know the swarm yet keeps the placeholder.
        store.set_swarms(&[]);
        assert!(store.swarm(&placeholder).is_some());

        let added = record("real-1", "gamma", 2);
        store.apply(&msg("swarm_added", serde_json::to_value(&added).unwrap()));
        assert!(store.swarm(&placeholder).is_none());
        assert!(store.swarm("real-1").is_some());

        store.apply(&msg("swarm_launched", json!({"request_id": "r-1", "swarm_id": "real-1"})));
        assert_eq!(store.pending_launches(), 0);
        assert_eq!(store.swarms().count(), 1);
    }

    #[test]
    fn test_launch_rejection_surfaces_reason() {
        let mut store = ClientStore::new();
        let placeholder = store.begin_launch("r-1", "Gamma", 1).unwrap();
        store.apply(&msg("command_rejected", json!({"request_id": "r-1", "reason": "no nodes"})));
        assert!(store.swarm(&placeholder).is_none());
        assert_eq!(store.launch_error(), Some("no nodes"));

        // Unrelated rejections are ignored.
        store.clear_launch_error();
        store.apply(&msg("command_rejected", json!({"request_id": "other"})));
        assert_eq!(store.launch_error(), None);
    }

    #[test]
    fn test_status_and_enrichment() {
        let mut store = store_with_swarm();
        store.apply(&msg("status", json!({"swarm_id": "s1", "slurm_state": "NOT_FOUND"})));
        assert_eq!(store.swarm("s1").unwrap().status, SwarmStatus::Running);

        store.apply(&msg("status", json!({"swarm_id": "s1", "status": "completed", "slurm_state": "COMPLETED"})));
        let s1 = store.swarm("s1").unwrap();
        assert_eq!(s1.status, SwarmStatus::Completed);
        assert_eq!(s1.slurm_state.as_deref(), Some("COMPLETED"));

        // Enrichment for an unknown turn is dropped, not buffered.
        let reasoning = msg(
            "reasoning_delta",
            json!({"swarm_id": "s1", "node_id": 0, "injection_id": "t1", "content": "hmm"}),
        );
        store.apply(&reasoning);
        store.apply(&started("t1"));
        assert_eq!(node0(&store).turn("t1").unwrap().reasoning, "");

        store.apply(&reasoning);
        store.apply(&msg(
            "command_started",
            json!({"swarm_id": "s1", "node_id": 0, "injection_id": "t1", "call_id": "c1", "command": ["ls"], "cwd": "/w"}),
        ));
        store.apply(&msg(
            "command_completed",
            json!({"swarm_id": "s1", "node_id": 0, "injection_id": "t1", "call_id": "c1", "stdout": "a\n", "exit_code": 0}),
        ));
        store.apply(&msg(
            "usage",
            json!({"swarm_id": "s1", "node_id": 0, "injection_id": "t1", "total_tokens": 42}),
        ));
        store.apply(&msg(
            "agent_error",
            json!({"swarm_id": "s1", "node_id": 0, "injection_id": "t1", "message": "boom"}),
        ));

        let turn = node0(&store).turn("t1").unwrap();
        assert_eq!(turn.reasoning, "hmm");
        assert_eq!(turn.commands[0].status, CommandStatus::Completed);
        assert_eq!(turn.commands[0].stdout.as_deref(), Some("a\n"));
        assert_eq!(turn.commands[0].exit_code, Some(0));
        assert_eq!(turn.usage, Some(42));
        assert_eq!(turn.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_launch_answered_before_registration() {
        let mut store = ClientStore::new();
        let launched = record("abcdef12345", "swarm-abcdef12", 1);
        store.apply(&msg("swarm_added", serde_json::to_value(&launched).unwrap()));
        store.apply(&msg("swarm_launched", json!({"request_id": "r1", "swarm_id": "abcdef12345"})));

        assert_eq!(store.begin_launch("r1", "launching r1", 1), None);
        store.set_swarms(&[launched]);
        assert_eq!(store.swarms().count(), 1);
        assert_eq!(store.pending_launches(), 0);

        store.apply(&msg("command_rejected", json!({"request_id": "r2", "reason": "quota"})));
        assert_eq!(store.begin_launch("r2", "Delta", 1), None);
        assert_eq!(store.launch_error(), Some("quota"));
        assert_eq!(store.swarms().count(), 1);
    }

    #[test]
    fn test_outcome_memory_is_bounded() {
        let mut store = ClientStore::new();
        for i in 0..=RECENT_OUTCOMES {
            store.apply(&msg("command_rejected", json!({"request_id": format!("r{}", i)})));
        }
        // The oldest answer was evicted, so this launch is shown as pending.
        assert!(store.begin_launch("r0", "Old", 1).is_some());
        assert_eq!(store.begin_launch("r1", "Newer", 1), None);
    }

    #[test]
    fn test_buffers_dropped_with_their_swarm() {
        let mut store = store_with_swarm();
        store.apply(&msg("delta", json!({"swarm_id": "s1", "node_id": 1, "injection_id": "t9", "content": "x"})));
        store.apply(&msg("turn_complete", json!({"swarm_id": "s1", "node_id": 1, "injection_id": "t9"})));
        assert_eq!(store.buffered_turns(), 1);

        store.apply(&msg("swarm_removed", json!({"swarm_id": "s1"})));
        store.set_swarms(&[]);
        assert_eq!(store.buffered_turns(), 0);

        // A snapshot that no longer lists the swarm also drops its buffers.
        store.set_swarms(&[record("s1", "alpha", 2)]);
        store.apply(&delta("t8", "y"));
        assert_eq!(store.buffered_turns(), 1);
        store.set_swarms(&[record("s2", "beta", 1)]);
        assert_eq!(store.buffered_turns(), 0);
    }

    #[test]
    fn test_turn_events_for_unknown_swarm() {
        let mut store = store_with_swarm();
        let ghost = |kind: &str| {
            msg(kind, json!({"swarm_id": "ghost", "node_id": 0, "injection_id": "t1", "content": "x"}))
        };
        // Held in case swarm_added is still on its way.
        store.apply(&ghost("delta"));
        store.apply(&ghost("turn_complete"));
        assert_eq!(store.buffered_turns(), 1);

        // The start names a swarm that never arrived: nothing to drain into.
        store.apply(&ghost("turn_started"));
        assert!(store.swarm("ghost").is_none());
        assert_eq!(store.swarms().count(), 1);
        assert_eq!(store.buffered_turns(), 0);

        // Buffered events whose start names no node are dropped with it.
        store.apply(&delta("t2", "z"));
        store.apply(&msg("turn_started", json!({"swarm_id": "s1", "injection_id": "t2"})));
        assert_eq!(store.buffered_turns(), 0);
        assert!(node0(&store).turns.is_empty());
    }

    #[test]
    fn test_missed_turn_start_across_reconnect() {
        let mut store = store_with_swarm();
        // t1 streamed but its turn_started was lost with the connection.
        store.apply(&delta("t1", "lost"));
        store.apply(&complete("t1"));
        store.set_swarms(&[record("s1", "alpha", 2)]);
        assert_eq!(store.buffered_turns(), 1);

        store.apply(&started("t2"));
        store.apply(&delta("t2", "fresh"));
        assert_eq!(store.buffered_turns(), 0);
        let turns = &node0(&store).turns;
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].injection_id, "t2");
        assert_eq!(turns[0].text(), "fresh");
        assert!(!turns[0].completed);
    }

    #[test]
    fn test_rejection_before_injection_is_tracked() {
        let mut store = store_with_swarm();
        let placeholder = store.submit_prompt("s1", NodeTarget::Node(0), "hi").unwrap();

        store.apply(&msg("inject_failed", json!({"request_id": "r-1", "error": "node busy"})));
        assert_eq!(node0(&store).turns.len(), 1);

        store.track_injection("r-1", "s1", placeholder);
        assert!(node0(&store).turns.is_empty());
        assert_eq!(store.inject_error(), Some("node busy"));
        assert_eq!(store.pending_injections(), 0);
    }

    #[test]
    fn test_turn_start_before_injection_is_tracked() {
        let mut store = store_with_swarm();
        let placeholder = store.submit_prompt("s1", NodeTarget::Node(0), "hi").unwrap();
        store.apply(&started("t1"));

        store.track_injection("r-1", "s1", placeholder);
        assert_eq!(store.pending_injections(), 0);
        assert_eq!(node0(&store).turns[0].prompt, "hi");
    }

    #[test]
    fn test_nodes_outside_swarm_are_ignored() {
        let mut store = store_with_swarm();
        let outside = |kind: &str| {
            msg(kind, json!({"swarm_id": "s1", "node_id": 5, "injection_id": "t1", "content": "x"}))
        };
        store.apply(&outside("delta"));
        assert_eq!(store.buffered_turns(), 0);

        store.apply(&outside("turn_started"));
        let s1 = store.swarm("s1").unwrap();
        assert_eq!(s1.nodes.len(), 2);
        assert!(s1.nodes.values().all(|n| n.turns.is_empty()));

        assert!(store.submit_prompt("s1", NodeTarget::Node(7), "hi").is_none());
    }

    #[test]
    fn test_swarm_removed() {
        let mut store = store_with_swarm();
        store.apply(&msg("swarm_removed", json!({"swarm_id": "s1"})));
        assert!(store.swarm("s1").is_none());
        // Idempotent.
        store.apply(&msg("swarm_removed", json!({"swarm_id": "s1"})));
    }
}
