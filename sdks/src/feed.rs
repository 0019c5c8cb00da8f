// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Live Event Feed
//!
//! Keeps a websocket to the backend's `/ws` hub open and forwards what it
//! receives as [`FeedEvent`]s.
//!
//! | Step | Behaviour |
//! |------|-----------|
//! | open | status `Connected`, backoff reset, `GET /swarms` emitted as `Snapshot` |
//! | text frame | parsed as a hub message; unparseable frames are logged and skipped |
//! | close / error | status `Reconnecting`, sleep `min(1s * 2^n, 10s)`, retry |
//! | [`EventFeed::close`] | task stops, status `Stopped` |
//!
//! Every reconnect starts with a fresh snapshot, so nothing missed while the
//! socket was down stays missing.

use codeswarm_core::domain::events::HubMessage;
use codeswarm_core::infrastructure::BackoffPolicy;
use codeswarm_swarm::domain::SwarmRecord;
use futures::StreamExt;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::CodeswarmClient;

const EVENT_BUFFER: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FeedStatus {
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Stopped,
}

impl FeedStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, FeedStatus::Connected)
    }
}

impl fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedStatus::Connecting => write!(f, "connecting"),
            FeedStatus::Connected => write!(f, "connected"),
            FeedStatus::Reconnecting { attempt } => write!(f, "reconnecting (attempt {})", attempt),
            FeedStatus::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Registry listing fetched right after the socket opened.
    Snapshot(Vec<SwarmRecord>),
    Message(HubMessage),
}

/// Browser-side reconnect schedule.
pub fn default_backoff() -> BackoffPolicy {
    BackoffPolicy::exponential(Duration::from_secs(1), Duration::from_secs(10))
}

pub struct EventFeed {
    events: mpsc::Receiver<FeedEvent>,
    status: watch::Receiver<FeedStatus>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl EventFeed {
    pub fn spawn(client: CodeswarmClient) -> Self {
        Self::spawn_with_backoff(client, default_backoff())
    }

    pub fn spawn_with_backoff(client: CodeswarmClient, backoff: BackoffPolicy) -> Self {
        let (tx, events) = mpsc::channel(EVENT_BUFFER);
        let (status_tx, status) = watch::channel(FeedStatus::Connecting);
        let cancel = CancellationToken::new();
        let task = FeedTask {
            client,
            backoff,
            tx,
            status: status_tx,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(task.run());
        Self {
            events,
            status,
            cancel,
            handle: Some(handle),
        }
    }

    /// Next event, or `None` once the feed has stopped.
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        self.events.recv().await
    }

    pub fn status(&self) -> watch::Receiver<FeedStatus> {
        self.status.clone()
    }

    pub fn current_status(&self) -> FeedStatus {
        *self.status.borrow()
    }

    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for EventFeed {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct FeedTask {
    client: CodeswarmClient,
    backoff: BackoffPolicy,
    tx: mpsc::Sender<FeedEvent>,
    status: watch::Sender<FeedStatus>,
    cancel: CancellationToken,
}

enum SessionEnd {
    /// Socket dropped; try again.
    Disconnected,
    /// Cancelled or nobody is listening.
    Stop,
}

impl FeedTask {
    async fn run(self) {
        let url = match self.client.ws_url() {
            Ok(url) => url,
            Err(e) => {
                warn!("Event feed cannot start: {}", e);
                let _ = self.status.send(FeedStatus::Stopped);
                return;
            }
        };

        let mut attempt: u32 = 0;
        loop {
            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = connect_async(url.as_str()) => result,
            };

            match connected {
                Ok((ws, _)) => {
                    info!(url = %url, "Event feed connected");
                    attempt = 0;
                    let _ = self.status.send(FeedStatus::Connected);
                    if let SessionEnd::Stop = self.session(ws).await {
                        break;
                    }
                    info!("Event feed disconnected");
                }
                Err(e) => debug!(url = %url, "Event feed connect failed: {}", e),
            }

            let delay = self.backoff.delay(attempt);
            attempt = attempt.saturating_add(1);
            let _ = self.status.send(FeedStatus::Reconnecting { attempt });
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        let _ = self.status.send(FeedStatus::Stopped);
    }

    async fn session<S>(&self, mut ws: S) -> SessionEnd
    where
        S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        match self.client.list_swarms().await {
            Ok(records) => {
                if self.tx.send(FeedEvent::Snapshot(records)).await.is_err() {
                    return SessionEnd::Stop;
                }
            }
            Err(e) => warn!("Snapshot fetch failed: {}", e),
        }

        loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => return SessionEnd::Stop,
                frame = ws.next() => frame,
            };
            match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<HubMessage>(&text) {
                        Ok(message) => {
                            if self.tx.send(FeedEvent::Message(message)).await.is_err() {
                                return SessionEnd::Stop;
                            }
                        }
                        Err(e) => warn!("Skipping unparseable hub frame: {}", e),
                    }
                }
                Some(Ok(Message::Close(_))) | None => return SessionEnd::Disconnected,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Event feed read error: {}", e);
                    return SessionEnd::Disconnected;
                }
            }
        }
    }
}
