// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Domain Layer
//!
//! Pure registry types. No I/O dependencies.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`swarm`] | `SwarmId`, `SwarmStatus`, `SwarmRecord`, `ListedSwarm` |
//! | [`registry`] | `SwarmRegistry`, `RegistryError`, `ReconcileOutcome` |
//! | [`repository`] | `SwarmRepository` port, `RepositoryError` |

pub mod registry;
pub mod repository;
pub mod swarm;

pub use registry::*;
pub use repository::*;
pub use swarm::*;
