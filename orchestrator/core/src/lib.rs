// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `codeswarm-core` — Router Synchronization Primitives
//!
//! Everything the backend needs to talk to the upstream router and to relay
//! what it hears to connected dashboards.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | Command/event envelopes, hub messages, backend configuration |
//! | [`infrastructure`] | Infrastructure | Framed TCP channel, router client, fan-out hub, JSON file store |
//!
//! The router itself (job scheduling, agent processes) is an external
//! collaborator reached through [`infrastructure::transport::Transport`].

pub mod domain;
pub mod infrastructure;

pub use domain::*;
