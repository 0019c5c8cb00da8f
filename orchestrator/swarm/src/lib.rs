// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `codeswarm-swarm` — Authoritative Swarm Registry
//!
//! The backend's single source of truth for which swarms exist, under what
//! alias, with what lifecycle status.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `SwarmRecord`, `SwarmRegistry` aggregate, `SwarmRepository` port |
//! | [`application`] | Application | `SwarmRegistryService`, `EventProcessor` |
//! | [`infrastructure`] | Infrastructure | JSON file and in-memory repositories |
//!
//! ## Key Concepts
//!
//! - **Reconciliation**: a router `swarm_list` is the full truth; the registry
//!   converges on it, dropping records the router no longer reports.
//! - **Inconclusive status checks**: a `swarm_status` without a usable status
//!   (`not_found`, `unknown`, missing) never changes a record's status.
//! - **Persistence**: every mutation rewrites the whole store atomically.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;
