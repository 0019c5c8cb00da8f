// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # codeswarm Rust SDK
//!
//! Client side of the codeswarm backend.
//!
//! - [`CodeswarmClient`]: HTTP commands (`/launch`, `/inject`, `/terminate`, `/swarms`, `/health`)
//! - [`EventFeed`]: reconnecting websocket to the `/ws` hub
//! - [`ClientStore`]: reconciles the hub feed into per-turn conversation state
//! - [`Dashboard`]: all of the above wired together, with optimistic placeholders
//!
//! ```no_run
//! # async fn demo() -> Result<(), codeswarm_sdk::ClientError> {
//! use codeswarm_sdk::{CodeswarmClient, Dashboard};
//!
//! let client = CodeswarmClient::new("http://127.0.0.1:4000")?;
//! let dashboard = Dashboard::connect(client);
//! let mut changes = dashboard.store().subscribe();
//! while changes.changed().await.is_ok() {
//!     let count = dashboard.store().read(|s| s.swarms().count());
//!     println!("{} swarms", count);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod dashboard;
pub mod event;
pub mod feed;
pub mod store;
pub mod types;

pub use client::{ClientError, CodeswarmClient};
pub use dashboard::{Dashboard, SharedStore};
pub use event::{ClientEvent, TurnRef};
pub use feed::{EventFeed, FeedEvent, FeedStatus};
pub use store::ClientStore;
pub use types::*;
