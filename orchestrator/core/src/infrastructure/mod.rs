// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod backoff;
pub mod codec;
pub mod event_bus;
pub mod json_store;
pub mod router_client;
pub mod transport;

pub use backoff::BackoffPolicy;
pub use event_bus::{EventBus, EventBusError, EventReceiver};
pub use json_store::{JsonFileStore, StoreError};
pub use router_client::{CommandError, ReceiveError, RouterClient, RouterEventReceiver};
pub use transport::{
    ConnectionState, InMemoryTransport, SharedTransport, TcpTransport, Transport, TransportConfig,
    TransportError,
};
