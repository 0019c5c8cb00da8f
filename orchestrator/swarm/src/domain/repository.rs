// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Registry Persistence Port
//!
//! The registry is persisted as a whole: every mutation rewrites the full set
//! of records. Implementations live in [`crate::infrastructure::repositories`].
//!
//! | Implementation | Backing |
//! |----------------|---------|
//! | `JsonSwarmRepository` | JSON array file, atomic replace |
//! | `InMemorySwarmRepository` | process memory (tests, ephemeral runs) |

use super::swarm::SwarmRecord;

pub trait SwarmRepository: Send + Sync {
    /// Load the last committed records. A missing or corrupt store yields `[]`.
    fn load(&self) -> Result<Vec<SwarmRecord>, RepositoryError>;

    /// Replace the stored records.
    fn save_all(&self, records: &[SwarmRecord]) -> Result<(), RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Storage I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
