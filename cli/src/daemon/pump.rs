// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Router event pump
//!
//! The single task that applies router events to the registry. Effects are
//! published to the hub in the order the processor produced them. Every time
//! the router connection (re)opens, a `swarm_list` is requested so the
//! registry reconciles whatever changed while it was down.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use codeswarm_core::domain::protocol::Command;
use codeswarm_core::infrastructure::{EventBus, ReceiveError, RouterClient};
use codeswarm_swarm::application::{Effects, EventProcessor, SwarmRegistryService};

pub async fn run_event_loop(
    processor: EventProcessor,
    router: RouterClient,
    hub: EventBus,
    cancel: CancellationToken,
) {
    let mut events = router.subscribe();
    let mut connection = router.transport().connection_state();
    let mut was_connected = false;

    loop {
        let connected = connection.borrow_and_update().is_connected();
        if connected && !was_connected {
            info!("Router connected, requesting swarm listing");
            request(&router, &Command::SwarmList);
        }
        was_connected = connected;

        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(event) => {
                    let effects = processor.process(&event);
                    dispatch(&router, &hub, effects);
                }
                Err(ReceiveError::Lagged(skipped)) => {
                    warn!("Event loop lagged by {} router message(s), resyncing", skipped);
                    request(&router, &Command::SwarmList);
                }
                Err(ReceiveError::Closed) => break,
            },
        }
    }
    debug!("Router event loop stopped");
}

fn dispatch(router: &RouterClient, hub: &EventBus, effects: Effects) {
    for message in effects.broadcasts {
        hub.publish(message);
    }
    for command in &effects.follow_ups {
        request(router, command);
    }
}

fn request(router: &RouterClient, command: &Command) {
    if let Err(e) = router.send_command(command) {
        warn!(command = command.name(), "Failed to send router command: {}", e);
    }
}

/// Ask the router for the status of every live swarm each `interval`.
///
/// Responses flow through the event loop like any other `swarm_status`.
pub async fn run_status_poller(
    registry: Arc<SwarmRegistryService>,
    router: RouterClient,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if !router.transport().connection_state().borrow().is_connected() {
                    continue;
                }
                for record in registry.list() {
                    if record.status.is_terminated() {
                        continue;
                    }
                    request(
                        &router,
                        &Command::SwarmStatus {
                            swarm_id: record.swarm_id.to_string(),
                        },
                    );
                }
            }
        }
    }
    debug!("Status poller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeswarm_core::domain::protocol::RouterEvent;
    use codeswarm_core::infrastructure::{ConnectionState, InMemoryTransport};
    use codeswarm_swarm::infrastructure::InMemorySwarmRepository;
    use serde_json::json;

    struct Harness {
        transport: Arc<InMemoryTransport>,
        hub: EventBus,
        registry: Arc<SwarmRegistryService>,
        cancel: CancellationToken,
    }

    fn start() -> Harness {
        let transport = Arc::new(InMemoryTransport::new());
        let router = RouterClient::new(transport.clone());
        let registry = Arc::new(SwarmRegistryService::new(Arc::new(
            InMemorySwarmRepository::new(),
        )));
        let hub = EventBus::new(64);
        let cancel = CancellationToken::new();
        tokio::spawn(run_event_loop(
            EventProcessor::new(registry.clone()),
            router,
            hub.clone(),
            cancel.clone(),
        ));
        Harness {
            transport,
            hub,
            registry,
            cancel,
        }
    }

    async fn next_sent(sent: &mut tokio::sync::broadcast::Receiver<serde_json::Value>) -> serde_json::Value {
        tokio::time::timeout(Duration::from_secs(2), sent.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_requests_listing_on_every_connect() {
        let harness = start();
        let mut sent = harness.transport.watch_sent();

        // Already connected when the loop starts.
        assert_eq!(next_sent(&mut sent).await["command"], "swarm_list");

        harness
            .transport
            .set_state(ConnectionState::Reconnecting { attempt: 1 });
        tokio::time::sleep(Duration::from_millis(50)).await;
        harness.transport.set_state(ConnectionState::Connected);
        assert_eq!(next_sent(&mut sent).await["command"], "swarm_list");

        harness.cancel.cancel();
    }

    #[tokio::test]
    async fn test_events_reach_registry_and_hub_in_order() {
        let harness = start();
        let mut dashboard = harness.hub.subscribe();
        let mut sent = harness.transport.watch_sent();

        // The initial listing request means the loop is subscribed.
        assert_eq!(next_sent(&mut sent).await["command"], "swarm_list");

        harness.transport.deliver(
            RouterEvent::new(
                "swarm_launched",
                json!({"swarm_id": "abcdef0123", "job_id": 9, "node_count": 2}),
            )
            .to_message(),
        );

        let first = tokio::time::timeout(Duration::from_secs(2), dashboard.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.kind, "swarm_added");
        let second = dashboard.recv().await.unwrap();
        assert_eq!(second.kind, "swarm_launched");

        // Follow-up status check for the new swarm.
        let check = next_sent(&mut sent).await;
        assert_eq!(check["command"], "swarm_status");
        assert_eq!(check["payload"]["swarm_id"], "abcdef0123");

        assert_eq!(
            harness.registry.get_by_alias("swarm-abcdef01").unwrap().node_count,
            2
        );
        harness.cancel.cancel();
    }
}
