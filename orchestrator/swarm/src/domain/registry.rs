// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Registry Aggregate
//!
//! Canonical `swarm_id → record` map plus a case-insensitive alias index.
//!
//! ## Invariants
//!
//! - Every record's lowercased alias is in the index, pointing back at it.
//! - No two records share an alias ignoring case; a colliding `create` is
//!   rejected with [`RegistryError::AliasTaken`].
//! - `update_status` with a withheld status never changes `status`.
//! - `reconcile` leaves exactly the listed set of swarms.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tracing::warn;

use super::swarm::{default_alias, ListedSwarm, SwarmId, SwarmRecord, SwarmStatus};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("alias '{alias}' is already in use")]
    AliasTaken { alias: String },

    #[error("swarm {swarm_id} already exists")]
    AlreadyExists { swarm_id: SwarmId },
}

/// Changes made by a [`SwarmRegistry::reconcile`] pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    pub added: Vec<SwarmId>,
    pub removed: Vec<SwarmId>,
    pub updated: Vec<SwarmId>,
}

impl ReconcileOutcome {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SwarmRegistry {
    records: HashMap<SwarmId, SwarmRecord>,
    aliases: HashMap<String, SwarmId>,
}

impl SwarmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted records. Duplicates are dropped with a warning.
    pub fn from_records(records: Vec<SwarmRecord>) -> Self {
        let mut registry = Self::new();
        for record in records {
            let key = normalize(&record.alias);
            if registry.records.contains_key(&record.swarm_id) || registry.aliases.contains_key(&key) {
                warn!(
                    swarm_id = %record.swarm_id,
                    alias = %record.alias,
                    "Skipping duplicate persisted swarm record"
                );
                continue;
            }
            registry.aliases.insert(key, record.swarm_id.clone());
            registry.records.insert(record.swarm_id.clone(), record);
        }
        registry
    }

    /// Insert a new swarm with status `running`.
    pub fn create(
        &mut self,
        swarm_id: SwarmId,
        alias: impl Into<String>,
        job_id: Option<String>,
        node_count: u32,
    ) -> Result<SwarmRecord, RegistryError> {
        let alias = alias.into();
        if self.records.contains_key(&swarm_id) {
            return Err(RegistryError::AlreadyExists { swarm_id });
        }
        let key = normalize(&alias);
        if self.aliases.contains_key(&key) {
            return Err(RegistryError::AliasTaken { alias });
        }

        let record = SwarmRecord {
            swarm_id: swarm_id.clone(),
            alias,
            job_id,
            node_count,
            status: SwarmStatus::Running,
            slurm_state: None,
            created_at: Utc::now(),
        };
        self.aliases.insert(key, swarm_id.clone());
        self.records.insert(swarm_id, record.clone());
        Ok(record)
    }

    /// Record a status report. Unknown swarms are ignored (returns `false`).
    ///
    /// A `None` status is an inconclusive status check: the current status is kept
    /// and only `slurm_state` is recorded.
    pub fn update_status(
        &mut self,
        swarm_id: &SwarmId,
        status: Option<SwarmStatus>,
        slurm_state: Option<String>,
    ) -> bool {
        let Some(record) = self.records.get_mut(swarm_id) else {
            return false;
        };
        if let Some(status) = status {
            record.status = status;
        }
        record.slurm_state = slurm_state;
        true
    }

    /// Remove a swarm. Removing an unknown id is a no-op.
    pub fn remove(&mut self, swarm_id: &SwarmId) -> Option<SwarmRecord> {
        let record = self.records.remove(swarm_id)?;
        self.aliases.remove(&normalize(&record.alias));
        Some(record)
    }

    /// Converge on the router's full listing.
    ///
    /// Records absent from `listing` are removed; listed swarms we don't know
    /// are created under a default alias; known ones take the listed status
    /// when it is conclusive.
    pub fn reconcile(&mut self, listing: &[ListedSwarm]) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();
        let listed: HashSet<&SwarmId> = listing.iter().map(|l| &l.swarm_id).collect();

        let mut stale: Vec<SwarmId> = self
            .records
            .keys()
            .filter(|id| !listed.contains(id))
            .cloned()
            .collect();
        stale.sort();
        for swarm_id in stale {
            self.remove(&swarm_id);
            outcome.removed.push(swarm_id);
        }

        for entry in listing {
            match self.records.get_mut(&entry.swarm_id) {
                Some(record) => {
                    if let Some(status) = &entry.status {
                        if record.status != *status {
                            record.status = status.clone();
                            outcome.updated.push(entry.swarm_id.clone());
                        }
                    }
                }
                None => {
                    let alias = self.unique_default_alias(&entry.swarm_id);
                    let created = self.create(
                        entry.swarm_id.clone(),
                        alias,
                        entry.job_id.clone(),
                        entry.node_count,
                    );
                    if created.is_ok() {
                        if let Some(status) = &entry.status {
                            self.update_status(&entry.swarm_id, Some(status.clone()), None);
                        }
                        outcome.added.push(entry.swarm_id.clone());
                    }
                }
            }
        }

        outcome
    }

    /// `swarm-<prefix>`, suffixed `-2`, `-3`, … until it is free.
    pub fn unique_default_alias(&self, swarm_id: &SwarmId) -> String {
        let base = default_alias(swarm_id);
        if !self.alias_in_use(&base) {
            return base;
        }
        (2..)
            .map(|n| format!("{}-{}", base, n))
            .find(|candidate| !self.alias_in_use(candidate))
            .unwrap_or(base)
    }

    pub fn alias_in_use(&self, alias: &str) -> bool {
        self.aliases.contains_key(&normalize(alias))
    }

    pub fn get_by_id(&self, swarm_id: &SwarmId) -> Option<&SwarmRecord> {
        self.records.get(swarm_id)
    }

    pub fn get_by_alias(&self, alias: &str) -> Option<&SwarmRecord> {
        self.aliases
            .get(&normalize(alias))
            .and_then(|id| self.records.get(id))
    }

    /// All records, oldest first.
    pub fn list(&self) -> Vec<SwarmRecord> {
        let mut records: Vec<SwarmRecord> = self.records.values().cloned().collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.swarm_id.cmp(&b.swarm_id))
        });
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn normalize(alias: &str) -> String {
    alias.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listed(id: &str, status: Option<SwarmStatus>) -> ListedSwarm {
        ListedSwarm {
            swarm_id: SwarmId::from(id),
            job_id: Some("100".into()),
            node_count: 2,
            status,
        }
    }

    #[test]
    fn test_alias_uniqueness_is_case_insensitive() {
        let mut registry = SwarmRegistry::new();
        registry.create("s1".into(), "Alpha", None, 1).unwrap();

        let err = registry.create("s2".into(), "alpha", None, 1).unwrap_err();
        assert_eq!(err, RegistryError::AliasTaken { alias: "alpha".into() });

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get_by_alias("ALPHA").unwrap().swarm_id.as_str(), "s1");
        assert!(registry.get_by_id(&"s2".into()).is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut registry = SwarmRegistry::new();
        registry.create("s1".into(), "a", None, 1).unwrap();
        assert!(matches!(
            registry.create("s1".into(), "b", None, 1),
            Err(RegistryError::AlreadyExists { .. })
        ));
        assert!(!registry.alias_in_use("b"));
    }

    #[test]
    fn test_inconclusive_status_keeps_status() {
        let mut registry = SwarmRegistry::new();
        let id = SwarmId::from("s1");
        registry.create(id.clone(), "a", None, 1).unwrap();

        assert!(registry.update_status(&id, None, Some("NOT_FOUND".into())));
        let record = registry.get_by_id(&id).unwrap();
        assert_eq!(record.status, SwarmStatus::Running);
        assert_eq!(record.slurm_state.as_deref(), Some("NOT_FOUND"));

        registry.update_status(&id, Some(SwarmStatus::Completed), Some("COMPLETED".into()));
        assert_eq!(registry.get_by_id(&id).unwrap().status, SwarmStatus::Completed);
    }

    #[test]
    fn test_update_unknown_swarm_is_noop() {
        let mut registry = SwarmRegistry::new();
        assert!(!registry.update_status(&"ghost".into(), Some(SwarmStatus::Failed), None));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = SwarmRegistry::new();
        let id = SwarmId::from("s1");
        registry.create(id.clone(), "Alpha", None, 1).unwrap();

        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
        assert!(!registry.alias_in_use("alpha"));
        // Alias is free again.
        registry.create("s2".into(), "alpha", None, 1).unwrap();
    }

    #[test]
    fn test_reconcile_converges_to_listing() {
        let mut registry = SwarmRegistry::new();
        registry.create("keep".into(), "Keeper", Some("1".into()), 3).unwrap();
        registry.create("gone".into(), "Goner", None, 1).unwrap();
        registry.remove(&"gone".into());
        registry.create("stale".into(), "Stale", None, 1).unwrap();

        let outcome = registry.reconcile(&[
            listed("keep", Some(SwarmStatus::Completed)),
            listed("newcomer-1234", None),
        ]);

        assert_eq!(outcome.removed, vec![SwarmId::from("stale")]);
        assert_eq!(outcome.added, vec![SwarmId::from("newcomer-1234")]);
        assert_eq!(outcome.updated, vec![SwarmId::from("keep")]);

        let ids: HashSet<String> = registry.list().into_iter().map(|r| r.swarm_id.0).collect();
        assert_eq!(ids, HashSet::from(["keep".to_string(), "newcomer-1234".to_string()]));

        // Existing record keeps its alias and metadata.
        let keep = registry.get_by_id(&"keep".into()).unwrap();
        assert_eq!(keep.alias, "Keeper");
        assert_eq!(keep.node_count, 3);
        assert_eq!(keep.status, SwarmStatus::Completed);

        let newcomer = registry.get_by_alias("swarm-newcomer").unwrap();
        assert_eq!(newcomer.status, SwarmStatus::Running);

        // Empty listing empties the registry.
        registry.reconcile(&[]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reconcile_disambiguates_default_alias() {
        let mut registry = SwarmRegistry::new();
        registry.create("other".into(), "swarm-abcdefgh", None, 1).unwrap();

        registry.reconcile(&[listed("other", None), listed("abcdefgh-0001", None)]);
        let record = registry.get_by_id(&"abcdefgh-0001".into()).unwrap();
        assert_eq!(record.alias, "swarm-abcdefgh-2");
    }

    #[test]
    fn test_from_records_skips_duplicates() {
        let mut source = SwarmRegistry::new();
        let first = source.create("s1".into(), "Same", None, 1).unwrap();
        let mut clash = first.clone();
        clash.swarm_id = "s2".into();

        let registry = SwarmRegistry::from_records(vec![first, clash]);
        assert_eq!(registry.len(), 1);
    }
}
