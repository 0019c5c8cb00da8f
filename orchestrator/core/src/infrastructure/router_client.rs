// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Router Client - command/event protocol on top of a [`Transport`]
//!
//! Commands are fire-and-forget: `send_command` returns the generated
//! [`RequestId`] and any response arrives later on the event stream, carrying
//! the same id in `data.request_id`. [`RouterClient::request`] wraps that in an
//! awaitable call with a timeout for callers that need the answer inline.

use serde_json::Value;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::protocol::{Command, CommandEnvelope, NodeTarget, RequestId, RouterEvent};
use crate::infrastructure::transport::{SharedTransport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("router rejected {command}: {reason}")]
    Rejected { command: String, reason: String },

    #[error("no response to {command} within {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("router event stream closed")]
    ChannelClosed,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReceiveError {
    #[error("router event stream closed")]
    Closed,

    #[error("receiver lagged, {0} messages skipped")]
    Lagged(u64),
}

#[derive(Clone)]
pub struct RouterClient {
    transport: SharedTransport,
}

impl RouterClient {
    pub fn new(transport: SharedTransport) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &SharedTransport {
        &self.transport
    }

    /// Send `command` under a fresh request id.
    pub fn send_command(&self, command: &Command) -> Result<RequestId, TransportError> {
        self.send_with_id(command, RequestId::new())
    }

    /// Send `command` under a caller-chosen request id.
    pub fn send_with_id(
        &self,
        command: &Command,
        request_id: RequestId,
    ) -> Result<RequestId, TransportError> {
        let envelope = CommandEnvelope::with_request_id(command, request_id);
        debug!(command = %envelope.command, request_id = %envelope.request_id, "Sending router command");
        self.transport.send(envelope.to_value())?;
        Ok(envelope.request_id)
    }

    pub fn launch(&self, nodes: u32, system_prompt: impl Into<String>) -> Result<RequestId, TransportError> {
        self.send_command(&Command::SwarmLaunch {
            nodes,
            system_prompt: system_prompt.into(),
        })
    }

    pub fn list_swarms(&self) -> Result<RequestId, TransportError> {
        self.send_command(&Command::SwarmList)
    }

    pub fn status(&self, swarm_id: impl Into<String>) -> Result<RequestId, TransportError> {
        self.send_command(&Command::SwarmStatus {
            swarm_id: swarm_id.into(),
        })
    }

    pub fn inject(
        &self,
        swarm_id: impl Into<String>,
        nodes: NodeTarget,
        content: impl Into<String>,
    ) -> Result<RequestId, TransportError> {
        self.send_command(&Command::Inject {
            swarm_id: swarm_id.into(),
            nodes,
            content: content.into(),
        })
    }

    pub fn terminate(&self, swarm_id: impl Into<String>) -> Result<RequestId, TransportError> {
        self.send_command(&Command::SwarmTerminate {
            swarm_id: swarm_id.into(),
        })
    }

    /// Every router event (responses and broadcasts) received after this call.
    pub fn subscribe(&self) -> RouterEventReceiver {
        RouterEventReceiver {
            receiver: self.transport.subscribe(),
        }
    }

    /// Send `command` and wait for the first event correlated to it.
    ///
    /// A `command_rejected` response becomes [`CommandError::Rejected`].
    pub async fn request(
        &self,
        command: Command,
        timeout: Duration,
    ) -> Result<RouterEvent, CommandError> {
        // Subscribe before sending so a fast response cannot be missed.
        let mut events = self.subscribe();
        let request_id = self.send_command(&command)?;

        let wait = async {
            loop {
                match events.recv().await {
                    Ok(event) if event.is_response_to(&request_id) => return Ok(event),
                    Ok(_) => continue,
                    Err(ReceiveError::Lagged(_)) => continue,
                    Err(ReceiveError::Closed) => return Err(CommandError::ChannelClosed),
                }
            }
        };

        let event = tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| CommandError::Timeout {
                command: command.name().to_string(),
                timeout,
            })??;

        if event.is_rejection() {
            return Err(CommandError::Rejected {
                command: command.name().to_string(),
                reason: event.rejection_reason().unwrap_or("unspecified").to_string(),
            });
        }
        Ok(event)
    }
}

/// Receiver yielding decoded router events; other message types are skipped.
pub struct RouterEventReceiver {
    receiver: broadcast::Receiver<Value>,
}

impl RouterEventReceiver {
    pub async fn recv(&mut self) -> Result<RouterEvent, ReceiveError> {
        loop {
            let message = self.receiver.recv().await.map_err(|e| match e {
                broadcast::error::RecvError::Closed => ReceiveError::Closed,
                broadcast::error::RecvError::Lagged(n) => {
                    warn!("Router event receiver lagged by {} messages", n);
                    ReceiveError::Lagged(n)
                }
            })?;
            match RouterEvent::from_message(&message) {
                Some(event) => return Ok(event),
                None => debug!("Ignoring non-event router message: {}", message),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::protocol::PROTOCOL;
    use crate::infrastructure::transport::InMemoryTransport;
    use serde_json::json;
    use std::sync::Arc;

    fn client() -> (Arc<InMemoryTransport>, RouterClient) {
        let transport = Arc::new(InMemoryTransport::new());
        let client = RouterClient::new(transport.clone());
        (transport, client)
    }

    #[test]
    fn test_commands_are_enveloped() {
        let (transport, client) = client();
        let id = client.terminate("s-1").unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["protocol"], PROTOCOL);
        assert_eq!(sent[0]["type"], "command");
        assert_eq!(sent[0]["command"], "swarm_terminate");
        assert_eq!(sent[0]["request_id"], id.as_str());
        assert_eq!(sent[0]["payload"], json!({"swarm_id": "s-1"}));
    }

    #[tokio::test]
    async fn test_receiver_skips_non_events() {
        let (transport, client) = client();
        let mut events = client.subscribe();

        transport.deliver(json!({"type": "command", "command": "noise"}));
        transport.deliver(json!({"type": "event", "event": "usage", "data": {}}));

        let event = events.recv().await.unwrap();
        assert_eq!(event.event, "usage");
    }

    #[tokio::test]
    async fn test_request_resolves_on_correlated_response() {
        let (transport, client) = client();
        let mut outbound = transport.watch_sent();

        let responder = {
            let transport = transport.clone();
            tokio::spawn(async move {
                let command = outbound.recv().await.unwrap();
                let request_id = command["request_id"].as_str().unwrap().to_string();
                // Unrelated broadcast first, then the response.
                transport.deliver(json!({
                    "type": "event", "event": "assistant_delta",
                    "data": {"content": "x"}
                }));
                transport.deliver(json!({
                    "type": "event", "event": "swarm_list",
                    "data": {"request_id": request_id, "swarms": {}}
                }));
            })
        };

        let event = client
            .request(Command::SwarmList, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(event.event, "swarm_list");
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_request_surfaces_rejection() {
        let (transport, client) = client();
        let mut outbound = transport.watch_sent();

        let responder = {
            let transport = transport.clone();
            tokio::spawn(async move {
                let command = outbound.recv().await.unwrap();
                transport.deliver(json!({
                    "type": "event", "event": "command_rejected",
                    "data": {"request_id": command["request_id"], "reason": "unknown swarm"}
                }));
            })
        };

        let err = client
            .request(
                Command::SwarmStatus { swarm_id: "nope".into() },
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Rejected { ref reason, .. } if reason == "unknown swarm"));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_request_times_out() {
        let (_transport, client) = client();
        let err = client
            .request(Command::SwarmList, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }));
    }
}
