// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Dashboard session: an [`EventFeed`] pumping into a [`SharedStore`], plus
//! the optimistic command helpers a UI needs.

use codeswarm_core::domain::events::HubMessage;
use codeswarm_core::domain::protocol::NodeTarget;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::{ClientError, CodeswarmClient};
use crate::event::ClientEvent;
use crate::feed::{EventFeed, FeedEvent, FeedStatus};
use crate::store::ClientStore;
use crate::types::{CommandAccepted, LaunchRequest};

/// A [`ClientStore`] shared between the feed task and readers.
///
/// Every mutation bumps a version counter readers can wait on.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<ClientStore>>,
    version: Arc<watch::Sender<u64>>,
}

impl Default for SharedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(ClientStore::new())),
            version: Arc::new(version),
        }
    }

    pub fn apply(&self, message: &HubMessage) -> bool {
        self.update(|store| store.apply(message))
    }

    pub fn reduce(&self, event: ClientEvent) {
        self.update(|store| store.reduce(event))
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut ClientStore) -> R) -> R {
        let result = f(&mut self.inner.lock());
        self.version.send_modify(|v| *v = v.wrapping_add(1));
        result
    }

    pub fn read<R>(&self, f: impl FnOnce(&ClientStore) -> R) -> R {
        f(&self.inner.lock())
    }

    pub fn snapshot(&self) -> ClientStore {
        self.inner.lock().clone()
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// Receiver that changes whenever the store does.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }
}

pub struct Dashboard {
    client: CodeswarmClient,
    store: SharedStore,
    status: watch::Receiver<FeedStatus>,
    cancel: CancellationToken,
    pump: Option<JoinHandle<()>>,
}

impl Dashboard {
    /// Open the live feed and start folding it into a fresh store.
    pub fn connect(client: CodeswarmClient) -> Self {
        let feed = EventFeed::spawn(client.clone());
        Self::with_feed(client, feed)
    }

    pub fn with_feed(client: CodeswarmClient, mut feed: EventFeed) -> Self {
        let store = SharedStore::new();
        let status = feed.status();
        let cancel = CancellationToken::new();

        let pump_store = store.clone();
        let pump_cancel = cancel.clone();
        let pump = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = pump_cancel.cancelled() => break,
                    event = feed.recv() => event,
                };
                match event {
                    Some(FeedEvent::Snapshot(records)) => {
                        pump_store.update(|s| s.set_swarms(&records));
                    }
                    Some(FeedEvent::Message(message)) => {
                        if !pump_store.apply(&message) {
                            debug!(kind = %message.kind, "Ignored hub message");
                        }
                    }
                    None => break,
                }
            }
            feed.close().await;
        });

        Self {
            client,
            store,
            status,
            cancel,
            pump: Some(pump),
        }
    }

    pub fn client(&self) -> &CodeswarmClient {
        &self.client
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn status(&self) -> watch::Receiver<FeedStatus> {
        self.status.clone()
    }

    /// Launch a swarm and show a provisional entry until the outcome arrives.
    pub async fn launch(&self, request: &LaunchRequest) -> Result<CommandAccepted, ClientError> {
        self.store.update(|s| s.clear_launch_error());
        let accepted = self.client.launch(request).await?;
        let alias = accepted
            .alias
            .clone()
            .or_else(|| request.alias.clone())
            .unwrap_or_else(|| format!("launching {}", accepted.request_id));
        let request_id = accepted.request_id.clone();
        self.store
            .update(|s| s.begin_launch(request_id, alias, request.nodes));
        Ok(accepted)
    }

    /// Inject a prompt into the swarm with this alias, showing it as a
    /// provisional turn right away.
    pub async fn inject(
        &self,
        alias: &str,
        prompt: &str,
        nodes: NodeTarget,
    ) -> Result<CommandAccepted, ClientError> {
        let placeholder = self.store.update(|s| {
            let swarm_id = s.swarm_by_alias(alias)?.swarm_id.clone();
            let placeholder = s.submit_prompt(&swarm_id, nodes, prompt)?;
            Some((swarm_id, placeholder))
        });

        match self.client.inject(alias, prompt, nodes).await {
            Ok(accepted) => {
                if let Some((swarm_id, placeholder)) = placeholder {
                    let request_id = accepted.request_id.clone();
                    self.store
                        .update(|s| s.track_injection(request_id, swarm_id, placeholder));
                }
                Ok(accepted)
            }
            Err(e) => {
                if let Some((_, placeholder)) = placeholder {
                    self.store.update(|s| s.discard_prompt(&placeholder));
                }
                Err(e)
            }
        }
    }

    pub async fn terminate(&self, alias: &str) -> Result<CommandAccepted, ClientError> {
        self.client.terminate(alias).await
    }

    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(pump) = self.pump.take() {
            let _ = pump.await;
        }
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
