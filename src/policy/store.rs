//! Concurrency-safe in-memory policy snapshot keyed by UID.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::Policy;

/// Live view of known policies.
///
/// Written by the policy watcher, read concurrently by the event watcher and
/// the HTTP API. The lock never escapes this type.
#[derive(Debug, Default)]
pub struct PolicyStore {
    policies: RwLock<HashMap<String, Policy>>,
}

impl PolicyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a policy by UID.
    pub fn get(&self, uid: &str) -> Option<Policy> {
        let map = self.policies.read().unwrap_or_else(PoisonError::into_inner);
        map.get(uid).cloned()
    }

    /// Point-in-time snapshot of all policies, sorted by kind, namespace and name.
    pub fn list(&self) -> Vec<Policy> {
        let map = self.policies.read().unwrap_or_else(PoisonError::into_inner);
        let mut policies: Vec<Policy> = map.values().cloned().collect();
        policies.sort_by(|a, b| {
            (&a.kind, &a.namespace, &a.name).cmp(&(&b.kind, &b.namespace, &b.name))
        });
        policies
    }

    /// Insert or replace a policy under its UID.
    pub fn set(&self, policy: Policy) {
        let mut map = self
            .policies
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        map.insert(policy.uid.clone(), policy);
    }

    /// Remove a policy. Returns the removed entry, if any.
    pub fn delete(&self, uid: &str) -> Option<Policy> {
        let mut map = self
            .policies
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        map.remove(uid)
    }

    /// Number of stored policies.
    pub fn len(&self) -> usize {
        self.policies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the store holds no policies.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
