// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! - **JsonSwarmRepository** - single JSON file, rewritten atomically
//! - **InMemorySwarmRepository** - lock-guarded `Vec`, for tests and ephemeral runs

use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use codeswarm_core::infrastructure::json_store::{JsonFileStore, StoreError};

use crate::domain::repository::{RepositoryError, SwarmRepository};
use crate::domain::swarm::SwarmRecord;

pub struct JsonSwarmRepository {
    store: JsonFileStore<SwarmRecord>,
}

impl JsonSwarmRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonFileStore::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }
}

impl SwarmRepository for JsonSwarmRepository {
    fn load(&self) -> Result<Vec<SwarmRecord>, RepositoryError> {
        Ok(self.store.load())
    }

    fn save_all(&self, records: &[SwarmRecord]) -> Result<(), RepositoryError> {
        self.store.save(records).map_err(RepositoryError::from)
    }
}

impl From<StoreError> for RepositoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Io { .. } => RepositoryError::Io(err.to_string()),
            StoreError::Serialize(e) => RepositoryError::Serialization(e.to_string()),
        }
    }
}

#[derive(Default)]
pub struct InMemorySwarmRepository {
    records: RwLock<Vec<SwarmRecord>>,
    saves: AtomicUsize,
}

impl InMemorySwarmRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<SwarmRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of `save_all` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Vec<SwarmRecord> {
        self.records.read().clone()
    }
}

impl SwarmRepository for InMemorySwarmRepository {
    fn load(&self) -> Result<Vec<SwarmRecord>, RepositoryError> {
        Ok(self.records.read().clone())
    }

    fn save_all(&self, records: &[SwarmRecord]) -> Result<(), RepositoryError> {
        *self.records.write() = records.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
