// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Framed Router Channel
//!
//! Persistent, reconnecting newline-delimited JSON channel to the router.
//!
//! ```text
//!  send() ──► mpsc queue ──► [connection task] ──► TcpStream
//!                                 │
//!  subscribe() ◄── broadcast ◄────┘ (one Value per decoded line)
//! ```
//!
//! - Messages sent before the first connection, or while reconnecting, stay
//!   queued and are written in order once a connection is up.
//! - A message whose write fails is retried first on the next connection.
//! - Until the first connection succeeds, attempts are bounded by the
//!   configured deadline; after that the task reconnects indefinitely.
//! - Malformed lines are logged and skipped.
//!
//! [`InMemoryTransport`] implements the same trait without a socket.

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::config::RouterConfig;
use crate::infrastructure::backoff::BackoffPolicy;
use crate::infrastructure::codec::{Frame, JsonLineCodec};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// The initial connection deadline elapsed without a connection.
    Failed,
    Closed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Reconnecting { attempt } => write!(f, "reconnecting (attempt {})", attempt),
            ConnectionState::Failed => f.write_str("failed"),
            ConnectionState::Closed => f.write_str("closed"),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,

    #[error("could not connect to router at {address} before the deadline")]
    ConnectFailed { address: String },

    #[error("timed out after {0:?} waiting for the router connection")]
    ConnectTimeout(Duration),
}

/// Bidirectional message channel to the router.
pub trait Transport: Send + Sync {
    /// Queue a message for delivery. Never blocks on the network.
    fn send(&self, message: Value) -> Result<(), TransportError>;

    /// Every inbound message received after this call.
    fn subscribe(&self) -> broadcast::Receiver<Value>;

    fn connection_state(&self) -> watch::Receiver<ConnectionState>;

    fn close(&self);
}

/// Wait until `state` reports a connection, or fail on `Failed`/`Closed`/timeout.
pub async fn wait_for_connection(
    mut state: watch::Receiver<ConnectionState>,
    timeout: Duration,
    address: &str,
) -> Result<(), TransportError> {
    let wait = async {
        loop {
            let current = state.borrow_and_update().clone();
            match current {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Failed => {
                    return Err(TransportError::ConnectFailed {
                        address: address.to_string(),
                    })
                }
                ConnectionState::Closed => return Err(TransportError::Closed),
                _ => {}
            }
            if state.changed().await.is_err() {
                return Err(TransportError::Closed);
            }
        }
    };
    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| TransportError::ConnectTimeout(timeout))?
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub address: String,
    pub backoff: BackoffPolicy,
    pub connect_deadline: Duration,
    pub subscriber_capacity: usize,
}

impl From<&RouterConfig> for TransportConfig {
    fn from(config: &RouterConfig) -> Self {
        Self {
            address: config.address(),
            backoff: BackoffPolicy::from(&config.backoff),
            connect_deadline: config.connect_deadline(),
            subscriber_capacity: config.subscriber_capacity,
        }
    }
}

/// Reconnecting TCP transport.
pub struct TcpTransport {
    address: String,
    outbound: mpsc::UnboundedSender<Value>,
    inbound: broadcast::Sender<Value>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
}

impl TcpTransport {
    /// Start the connection task without waiting for it to connect.
    pub fn spawn(config: TransportConfig) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound, _) = broadcast::channel(config.subscriber_capacity.max(1));
        let (state_tx, state) = watch::channel(ConnectionState::Connecting);
        let cancel = CancellationToken::new();

        let task = ConnectionTask {
            config: config.clone(),
            outbound_rx,
            inbound: inbound.clone(),
            state: state_tx,
            cancel: cancel.clone(),
            carry: None,
        };
        tokio::spawn(task.run());

        Self {
            address: config.address,
            outbound,
            inbound,
            state,
            cancel,
        }
    }

    /// Start the connection task and wait for the first connection.
    pub async fn connect(config: TransportConfig) -> Result<Self, TransportError> {
        let deadline = config.connect_deadline;
        let transport = Self::spawn(config);
        if let Err(e) = transport.wait_connected(deadline).await {
            transport.close();
            return Err(e);
        }
        Ok(transport)
    }

    pub async fn wait_connected(&self, timeout: Duration) -> Result<(), TransportError> {
        wait_for_connection(self.state.clone(), timeout, &self.address).await
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Transport for TcpTransport {
    fn send(&self, message: Value) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(message)
            .map_err(|_| TransportError::Closed)
    }

    fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.inbound.subscribe()
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum SessionEnd {
    Cancelled,
    Disconnected(String),
}

struct ConnectionTask {
    config: TransportConfig,
    outbound_rx: mpsc::UnboundedReceiver<Value>,
    inbound: broadcast::Sender<Value>,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    // Message whose write failed; retried before anything else.
    carry: Option<Value>,
}

impl ConnectionTask {
    async fn run(mut self) {
        let started = Instant::now();
        let mut ever_connected = false;
        let mut attempt: u32 = 0;

        loop {
            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = TcpStream::connect(&self.config.address) => result,
            };

            match connected {
                Ok(stream) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("Failed to set TCP_NODELAY: {}", e);
                    }
                    ever_connected = true;
                    attempt = 0;
                    info!("Connected to router at {}", self.config.address);
                    self.state.send_replace(ConnectionState::Connected);

                    match self.session(stream).await {
                        SessionEnd::Cancelled => break,
                        SessionEnd::Disconnected(reason) => {
                            warn!("Router connection lost: {}", reason);
                        }
                    }
                }
                Err(e) => {
                    if !ever_connected && started.elapsed() >= self.config.connect_deadline {
                        error!(
                            "Giving up on router at {} after {:?}: {}",
                            self.config.address, self.config.connect_deadline, e
                        );
                        self.state.send_replace(ConnectionState::Failed);
                        return;
                    }
                    debug!("Router connect attempt failed: {}", e);
                }
            }

            let delay = self.config.backoff.delay(attempt);
            attempt = attempt.saturating_add(1);
            self.state
                .send_replace(ConnectionState::Reconnecting { attempt });

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Router transport closed");
        self.state.send_replace(ConnectionState::Closed);
    }

    async fn session(&mut self, stream: TcpStream) -> SessionEnd {
        let (read_half, write_half) = stream.into_split();
        let mut reader = FramedRead::new(read_half, JsonLineCodec::new());
        let mut writer = FramedWrite::new(write_half, JsonLineCodec::new());

        if let Some(message) = self.carry.take() {
            if let Err(e) = writer.send(message.clone()).await {
                self.carry = Some(message);
                return SessionEnd::Disconnected(e.to_string());
            }
        }

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return SessionEnd::Cancelled,

                frame = reader.next() => match frame {
                    Some(Ok(Frame::Message(value))) => {
                        // No subscribers is not an error.
                        let _ = self.inbound.send(value);
                    }
                    Some(Ok(Frame::Malformed { line, error })) => {
                        warn!("Dropping malformed line from router ({}): {}", error, truncate(&line, 200));
                    }
                    Some(Err(e)) => return SessionEnd::Disconnected(e.to_string()),
                    None => return SessionEnd::Disconnected("closed by peer".to_string()),
                },

                outbound = self.outbound_rx.recv() => match outbound {
                    Some(message) => {
                        if let Err(e) = writer.send(message.clone()).await {
                            self.carry = Some(message);
                            return SessionEnd::Disconnected(e.to_string());
                        }
                    }
                    // Every sender dropped; nothing left to deliver.
                    None => return SessionEnd::Cancelled,
                },
            }
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push('…');
    cut
}

/// In-process transport. Outbound messages are recorded; inbound messages are
/// injected with [`InMemoryTransport::deliver`].
pub struct InMemoryTransport {
    sent: Mutex<Vec<Value>>,
    sent_tx: broadcast::Sender<Value>,
    inbound: broadcast::Sender<Value>,
    state: watch::Sender<ConnectionState>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        let (inbound, _) = broadcast::channel(1024);
        let (sent_tx, _) = broadcast::channel(1024);
        let (state, _) = watch::channel(ConnectionState::Connected);
        Self {
            sent: Mutex::new(Vec::new()),
            sent_tx,
            inbound,
            state,
        }
    }

    /// Simulate a message arriving from the router.
    pub fn deliver(&self, message: Value) {
        let _ = self.inbound.send(message);
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<Value> {
        self.sent.lock().clone()
    }

    /// Stream of outbound messages sent after this call.
    pub fn watch_sent(&self) -> broadcast::Receiver<Value> {
        self.sent_tx.subscribe()
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for InMemoryTransport {
    fn send(&self, message: Value) -> Result<(), TransportError> {
        if *self.state.borrow() == ConnectionState::Closed {
            return Err(TransportError::Closed);
        }
        self.sent.lock().push(message.clone());
        let _ = self.sent_tx.send(message);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.inbound.subscribe()
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn close(&self) {
        self.state.send_replace(ConnectionState::Closed);
    }
}

/// Shared handle used across the backend.
pub type SharedTransport = Arc<dyn Transport>;
