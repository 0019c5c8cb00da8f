// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Router Event Processor
//!
//! Applies each router event to the registry first, then derives the hub
//! messages dashboards should see and any follow-up commands to send back to
//! the router.
//!
//! | Router event | Registry effect | Hub messages |
//! |--------------|-----------------|--------------|
//! | `swarm_launched` | create (reserved or default alias), status `pending` | `swarm_added`, `swarm_launched` |
//! | `swarm_list` | reconcile | `swarm_list`, `reconcile` |
//! | `swarm_status` | update status (kept on inconclusive status check) | `swarm_status`, `status` |
//! | `swarm_terminated` | remove | `swarm_terminated`, `swarm_removed` |
//! | `swarm_removed` | remove | `swarm_removed` |
//! | `command_rejected` | release alias reservation | `command_rejected` |
//! | `turn_started`, `assistant_delta`, `assistant`, `turn_complete` | — | `turn_started`, `delta`, `assistant`, `turn_complete` |
//! | anything else | — | passed through verbatim |

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use codeswarm_core::domain::events::{browser_kind, hub_kinds, HubMessage};
use codeswarm_core::domain::protocol::{router_events, Command, RequestId, RouterEvent};

use crate::application::registry_service::SwarmRegistryService;
use crate::domain::registry::RegistryError;
use crate::domain::swarm::{scalar_to_string, ListedSwarm, SwarmId, SwarmStatus};

/// What the caller must do after an event has been applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Effects {
    /// Messages for every connected dashboard, in order.
    pub broadcasts: Vec<HubMessage>,
    /// Commands to send to the router.
    pub follow_ups: Vec<Command>,
}

impl Effects {
    fn relay(kind: &str, payload: &Value) -> Self {
        Self {
            broadcasts: vec![HubMessage::new(kind, payload.clone())],
            follow_ups: Vec::new(),
        }
    }

    fn push(&mut self, kind: &str, payload: Value) {
        self.broadcasts.push(HubMessage::new(kind, payload));
    }
}

#[derive(Clone)]
pub struct EventProcessor {
    registry: Arc<SwarmRegistryService>,
}

impl EventProcessor {
    pub fn new(registry: Arc<SwarmRegistryService>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SwarmRegistryService> {
        &self.registry
    }

    pub fn process(&self, event: &RouterEvent) -> Effects {
        debug!(event = %event.event, "Processing router event");
        match event.event.as_str() {
            router_events::TURN_STARTED
            | router_events::ASSISTANT_DELTA
            | router_events::ASSISTANT
            | router_events::TURN_COMPLETE => Effects::relay(browser_kind(&event.event), &event.data),
            router_events::SWARM_LAUNCHED => self.on_launched(event),
            router_events::SWARM_LIST => self.on_list(event),
            router_events::SWARM_STATUS => self.on_status(event),
            router_events::SWARM_TERMINATED | router_events::SWARM_REMOVED => self.on_removed(event),
            router_events::COMMAND_REJECTED => self.on_rejected(event),
            other => Effects::relay(other, &event.data),
        }
    }

    fn on_launched(&self, event: &RouterEvent) -> Effects {
        let mut effects = Effects::default();
        let Some(swarm_id) = event.swarm_id().map(SwarmId::from) else {
            warn!("swarm_launched without swarm_id");
            effects.push(&event.event, event.data.clone());
            return effects;
        };

        let job_id = event.data.get("job_id").and_then(scalar_to_string);
        let node_count = event
            .data
            .get("node_count")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0);
        let reserved = event
            .request_id()
            .and_then(|id| self.registry.take_reservation(&RequestId::from(id)));

        let created = match reserved {
            Some(alias) => match self
                .registry
                .create(swarm_id.clone(), alias.clone(), job_id.clone(), node_count)
            {
                Err(RegistryError::AliasTaken { .. }) => {
                    warn!(swarm_id = %swarm_id, alias = %alias, "Reserved alias taken, using default");
                    self.registry
                        .create_with_default_alias(swarm_id.clone(), job_id, node_count)
                }
                other => other,
            },
            None => self
                .registry
                .create_with_default_alias(swarm_id.clone(), job_id, node_count),
        };

        match created {
            Ok(_) => {
                // Pending until the scheduler confirms.
                if let Some(record) =
                    self.registry
                        .update_status(&swarm_id, Some(SwarmStatus::Pending), None)
                {
                    effects.push(hub_kinds::SWARM_ADDED, record.to_value());
                }
                effects.follow_ups.push(Command::SwarmStatus {
                    swarm_id: swarm_id.to_string(),
                });
            }
            Err(RegistryError::AlreadyExists { .. }) => {
                debug!(swarm_id = %swarm_id, "Launched swarm already known");
            }
            Err(e) => warn!(swarm_id = %swarm_id, "Could not register launched swarm: {}", e),
        }

        effects.push(&event.event, event.data.clone());
        effects
    }

    fn on_list(&self, event: &RouterEvent) -> Effects {
        let listing = ListedSwarm::parse_listing(event.data.get("swarms").unwrap_or(&Value::Null));
        self.registry.reconcile(&listing);

        let mut effects = Effects::relay(&event.event, &event.data);
        effects.push(
            hub_kinds::RECONCILE,
            serde_json::to_value(self.registry.list()).unwrap_or(Value::Null),
        );
        effects
    }

    fn on_status(&self, event: &RouterEvent) -> Effects {
        let mut effects = Effects::relay(&event.event, &event.data);
        let Some(swarm_id) = event.swarm_id().map(SwarmId::from) else {
            return effects;
        };

        let status = SwarmStatus::from_report(event.data.get("status"));
        let slurm_state = event.data.get("slurm_state").and_then(scalar_to_string);
        if status.is_none() {
            debug!(swarm_id = %swarm_id, "Inconclusive status check, keeping current status");
        }
        self.registry
            .update_status(&swarm_id, status.clone(), slurm_state);

        // Dashboards must not see an inconclusive status check as a status either.
        let mut payload = event.data.clone();
        if status.is_none() {
            if let Some(map) = payload.as_object_mut() {
                map.remove("status");
            }
        }
        effects.push(hub_kinds::STATUS, payload);
        effects
    }

    fn on_removed(&self, event: &RouterEvent) -> Effects {
        if let Some(swarm_id) = event.swarm_id().map(SwarmId::from) {
            self.registry.remove(&swarm_id);
        }
        let mut effects = Effects::default();
        if event.event != hub_kinds::SWARM_REMOVED {
            effects.push(&event.event, event.data.clone());
        }
        effects.push(hub_kinds::SWARM_REMOVED, event.data.clone());
        effects
    }

    fn on_rejected(&self, event: &RouterEvent) -> Effects {
        if let Some(request_id) = event.request_id() {
            if let Some(alias) = self.registry.take_reservation(&RequestId::from(request_id)) {
                debug!(request_id = %request_id, alias = %alias, "Released alias reservation");
            }
        }
        warn!(
            reason = event.rejection_reason().unwrap_or("unspecified"),
            "Router rejected command"
        );
        Effects::relay(&event.event, &event.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::InMemorySwarmRepository;
    use serde_json::json;

    fn processor() -> EventProcessor {
        let repository = Arc::new(InMemorySwarmRepository::new());
        EventProcessor::new(Arc::new(SwarmRegistryService::new(repository)))
    }

    fn kinds(effects: &Effects) -> Vec<&str> {
        effects.broadcasts.iter().map(|m| m.kind.as_str()).collect()
    }

    #[test]
    fn test_launch_uses_reserved_alias() {
        let processor = processor();
        processor
            .registry()
            .reserve_alias(RequestId::from("r-1"), "Alpha")
            .unwrap();

        let effects = processor.process(&RouterEvent::new(
            "swarm_launched",
            json!({"request_id": "r-1", "swarm_id": "abcdef123456", "job_id": 991, "node_count": 2}),
        ));

        assert_eq!(kinds(&effects), vec!["swarm_added", "swarm_launched"]);
        assert_eq!(effects.broadcasts[0].payload["alias"], "Alpha");
        assert_eq!(effects.broadcasts[0].payload["status"], "pending");
        assert_eq!(effects.broadcasts[0].payload["job_id"], "991");
        assert_eq!(
            effects.follow_ups,
            vec![Command::SwarmStatus { swarm_id: "abcdef123456".into() }]
        );
        assert_eq!(processor.registry().pending_reservations(), 0);
    }

    #[test]
    fn test_launch_without_reservation_gets_default_alias() {
        let processor = processor();
        processor.process(&RouterEvent::new(
            "swarm_launched",
            json!({"swarm_id": "abcdef123456", "node_count": 1}),
        ));
        assert!(processor.registry().get_by_alias("swarm-abcdef12").is_some());
    }

    #[test]
    fn test_launch_falls_back_when_reserved_alias_collides() {
        let processor = processor();
        let registry = processor.registry();
        registry.reserve_alias(RequestId::from("r-1"), "Alpha").unwrap();
        // Another swarm grabbed the alias through a listing in the meantime.
        registry.create("other".into(), "alpha", None, 1).unwrap();

        processor.process(&RouterEvent::new(
            "swarm_launched",
            json!({"request_id": "r-1", "swarm_id": "abcdef123456", "node_count": 1}),
        ));
        let record = registry.get_by_id(&"abcdef123456".into()).unwrap();
        assert_eq!(record.alias, "swarm-abcdef12");
    }

    #[test]
    fn test_conversation_events_are_renamed_only() {
        let processor = processor();
        let effects = processor.process(&RouterEvent::new(
            "assistant_delta",
            json!({"injection_id": "t1", "content": "Hel"}),
        ));
        assert_eq!(kinds(&effects), vec!["delta"]);
        assert!(processor.registry().list().is_empty());

        let effects = processor.process(&RouterEvent::new("reasoning_delta", json!({"x": 1})));
        assert_eq!(kinds(&effects), vec!["reasoning_delta"]);
        assert_eq!(effects.broadcasts[0].payload, json!({"x": 1}));
    }

    #[test]
    fn test_status_report_rules() {
        let processor = processor();
        let registry = processor.registry();
        registry.create("s1".into(), "a", None, 1).unwrap();

        let effects = processor.process(&RouterEvent::new(
            "swarm_status",
            json!({"swarm_id": "s1", "status": "not_found", "slurm_state": "NOT_FOUND"}),
        ));
        assert_eq!(kinds(&effects), vec!["swarm_status", "status"]);
        assert!(effects.broadcasts[1].payload.get("status").is_none());
        let record = registry.get_by_id(&"s1".into()).unwrap();
        assert_eq!(record.status, SwarmStatus::Running);
        assert_eq!(record.slurm_state.as_deref(), Some("NOT_FOUND"));

        processor.process(&RouterEvent::new(
            "swarm_status",
            json!({"swarm_id": "s1", "status": "completed", "slurm_state": "COMPLETED"}),
        ));
        assert_eq!(
            registry.get_by_id(&"s1".into()).unwrap().status,
            SwarmStatus::Completed
        );
    }

    #[test]
    fn test_list_reconciles_before_broadcast() {
        let processor = processor();
        processor.registry().create("stale".into(), "old", None, 1).unwrap();

        let effects = processor.process(&RouterEvent::new(
            "swarm_list",
            json!({"request_id": "r-9", "swarms": {"s1": {"job_id": "7", "node_count": 4, "status": "running"}}}),
        ));

        assert_eq!(kinds(&effects), vec!["swarm_list", "reconcile"]);
        let listed = effects.broadcasts[1].payload.as_array().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["swarm_id"], "s1");
        assert_eq!(listed[0]["node_count"], 4);
    }

    #[test]
    fn test_termination_removes_record() {
        let processor = processor();
        processor.registry().create("s1".into(), "a", None, 1).unwrap();

        let effects = processor.process(&RouterEvent::new("swarm_terminated", json!({"swarm_id": "s1"})));
        assert_eq!(kinds(&effects), vec!["swarm_terminated", "swarm_removed"]);
        assert!(processor.registry().list().is_empty());

        // A second removal for the same swarm is harmless.
        let effects = processor.process(&RouterEvent::new("swarm_removed", json!({"swarm_id": "s1"})));
        assert_eq!(kinds(&effects), vec!["swarm_removed"]);
    }

    #[test]
    fn test_rejection_releases_reservation() {
        let processor = processor();
        processor
            .registry()
            .reserve_alias(RequestId::from("r-1"), "Alpha")
            .unwrap();

        let effects = processor.process(&RouterEvent::new(
            "command_rejected",
            json!({"request_id": "r-1", "reason": "no capacity"}),
        ));
        assert_eq!(kinds(&effects), vec!["command_rejected"]);
        assert_eq!(processor.registry().pending_reservations(), 0);
    }
}
