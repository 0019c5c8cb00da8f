// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Swarm Registry Service
//!
//! Shared, persisted access to the [`SwarmRegistry`]. Every successful
//! mutation writes the full record set through the [`SwarmRepository`] before
//! returning. A failed write is logged; the in-memory registry stays
//! authoritative and the next mutation retries the write.
//!
//! Writes happen after the registry lock is released, so readers never wait on
//! disk I/O. A separate writer lock, taken while the registry lock is still
//! held, keeps writes in mutation order.
//!
//! Also tracks aliases reserved by pending launches, keyed by the request id
//! of the `swarm_launch` command, until the router confirms or rejects. A
//! reservation the router never answers expires after the reservation TTL.

use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use codeswarm_core::domain::protocol::RequestId;

use crate::domain::registry::{ReconcileOutcome, RegistryError, SwarmRegistry};
use crate::domain::repository::SwarmRepository;
use crate::domain::swarm::{ListedSwarm, SwarmId, SwarmRecord, SwarmStatus};

/// Default lifetime of an unanswered launch's alias reservation.
pub const DEFAULT_RESERVATION_TTL: Duration = Duration::from_secs(120);

struct Reservation {
    alias: String,
    reserved_at: Instant,
}

pub struct SwarmRegistryService {
    registry: Mutex<SwarmRegistry>,
    writer: Mutex<()>,
    reservations: Mutex<HashMap<RequestId, Reservation>>,
    reservation_ttl: Duration,
    repository: Arc<dyn SwarmRepository>,
}

impl SwarmRegistryService {
    /// Load persisted state. Load failures start an empty registry.
    pub fn new(repository: Arc<dyn SwarmRepository>) -> Self {
        let records = match repository.load() {
            Ok(records) => records,
            Err(e) => {
                warn!("Failed to load swarm registry: {}. Starting empty.", e);
                Vec::new()
            }
        };
        let registry = SwarmRegistry::from_records(records);
        info!("Loaded {} swarm(s) from registry store", registry.len());

        Self {
            registry: Mutex::new(registry),
            writer: Mutex::new(()),
            reservations: Mutex::new(HashMap::new()),
            reservation_ttl: DEFAULT_RESERVATION_TTL,
            repository,
        }
    }

    pub fn with_reservation_ttl(mut self, ttl: Duration) -> Self {
        self.reservation_ttl = ttl;
        self
    }

    pub fn create(
        &self,
        swarm_id: SwarmId,
        alias: impl Into<String>,
        job_id: Option<String>,
        node_count: u32,
    ) -> Result<SwarmRecord, RegistryError> {
        let mut registry = self.registry.lock();
        let record = registry.create(swarm_id, alias, job_id, node_count)?;
        info!(swarm_id = %record.swarm_id, alias = %record.alias, "Swarm registered");
        self.commit(registry);
        Ok(record)
    }

    /// Create under a default alias, suffixed if the plain default is taken.
    pub fn create_with_default_alias(
        &self,
        swarm_id: SwarmId,
        job_id: Option<String>,
        node_count: u32,
    ) -> Result<SwarmRecord, RegistryError> {
        let mut registry = self.registry.lock();
        let alias = registry.unique_default_alias(&swarm_id);
        let record = registry.create(swarm_id, alias, job_id, node_count)?;
        info!(swarm_id = %record.swarm_id, alias = %record.alias, "Swarm registered");
        self.commit(registry);
        Ok(record)
    }

    /// Returns the updated record, or `None` if the swarm is unknown.
    pub fn update_status(
        &self,
        swarm_id: &SwarmId,
        status: Option<SwarmStatus>,
        slurm_state: Option<String>,
    ) -> Option<SwarmRecord> {
        let mut registry = self.registry.lock();
        if !registry.update_status(swarm_id, status, slurm_state) {
            debug!(swarm_id = %swarm_id, "Status for unknown swarm ignored");
            return None;
        }
        let updated = registry.get_by_id(swarm_id).cloned();
        self.commit(registry);
        updated
    }

    pub fn remove(&self, swarm_id: &SwarmId) -> Option<SwarmRecord> {
        let mut registry = self.registry.lock();
        let removed = registry.remove(swarm_id)?;
        info!(swarm_id = %swarm_id, alias = %removed.alias, "Swarm removed");
        self.commit(registry);
        Some(removed)
    }

    pub fn reconcile(&self, listing: &[ListedSwarm]) -> ReconcileOutcome {
        let mut registry = self.registry.lock();
        let outcome = registry.reconcile(listing);
        if !outcome.is_empty() {
            info!(
                added = outcome.added.len(),
                removed = outcome.removed.len(),
                updated = outcome.updated.len(),
                "Registry reconciled with router listing"
            );
            self.commit(registry);
        }
        outcome
    }

    pub fn get_by_id(&self, swarm_id: &SwarmId) -> Option<SwarmRecord> {
        self.registry.lock().get_by_id(swarm_id).cloned()
    }

    pub fn get_by_alias(&self, alias: &str) -> Option<SwarmRecord> {
        self.registry.lock().get_by_alias(alias).cloned()
    }

    pub fn list(&self) -> Vec<SwarmRecord> {
        self.registry.lock().list()
    }

    /// Hold `alias` for the launch identified by `request_id`.
    ///
    /// Fails if a registered swarm or another pending launch already uses it.
    pub fn reserve_alias(&self, request_id: RequestId, alias: &str) -> Result<(), RegistryError> {
        let registry = self.registry.lock();
        let mut reservations = self.reservations.lock();
        self.expire_reservations(&mut reservations);
        let lowered = alias.to_lowercase();
        let reserved = reservations
            .values()
            .any(|r| r.alias.to_lowercase() == lowered);
        if registry.alias_in_use(alias) || reserved {
            return Err(RegistryError::AliasTaken {
                alias: alias.to_string(),
            });
        }
        reservations.insert(
            request_id,
            Reservation {
                alias: alias.to_string(),
                reserved_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Claim the alias reserved for `request_id`, if any and not expired.
    pub fn take_reservation(&self, request_id: &RequestId) -> Option<String> {
        let reservation = self.reservations.lock().remove(request_id)?;
        if reservation.reserved_at.elapsed() >= self.reservation_ttl {
            debug!(request_id = %request_id, alias = %reservation.alias, "Reservation already expired");
            return None;
        }
        Some(reservation.alias)
    }

    pub fn pending_reservations(&self) -> usize {
        let mut reservations = self.reservations.lock();
        self.expire_reservations(&mut reservations);
        reservations.len()
    }

    fn expire_reservations(&self, reservations: &mut HashMap<RequestId, Reservation>) {
        let ttl = self.reservation_ttl;
        reservations.retain(|request_id, r| {
            let live = r.reserved_at.elapsed() < ttl;
            if !live {
                warn!(request_id = %request_id, alias = %r.alias, "Launch never answered, releasing alias");
            }
            live
        });
    }

    /// Persist the state behind `registry`, releasing it before the write.
    fn commit(&self, registry: MutexGuard<'_, SwarmRegistry>) {
        let records = registry.list();
        let _writer = self.writer.lock();
        drop(registry);
        if let Err(e) = self.repository.save_all(&records) {
            error!("Failed to persist swarm registry: {}", e);
        }
    }
}
