//! Resolver registry - live continuations for pending promises
//!
//! A strict cache of handles requested in this process. It never decides a
//! promise's state; the record store does. Each method holds the lock for
//! exactly one map operation.

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::continuation::ContinuationHandle;
use crate::types::PromiseId;

/// Mapping from promise id to its pending continuation
#[derive(Default)]
pub struct ResolverRegistry {
    entries: Mutex<HashMap<PromiseId, ContinuationHandle>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered handle for `id`, if any
    pub fn get(&self, id: &PromiseId) -> Option<ContinuationHandle> {
        self.entries.lock().get(id).cloned()
    }

    /// Register a fresh pending handle unless one already exists.
    /// Returns the handle that ends up registered.
    pub fn get_or_register(&self, id: PromiseId) -> ContinuationHandle {
        let handle = self
            .entries
            .lock()
            .entry(id)
            .or_insert_with(|| ContinuationHandle::pending(id))
            .clone();
        tracing::debug!(promise = %id, "continuation registered");
        handle
    }

    /// Remove and return the handle for `id`
    pub fn take(&self, id: &PromiseId) -> Option<ContinuationHandle> {
        let handle = self.entries.lock().remove(id);
        if handle.is_some() {
            tracing::debug!(promise = %id, "continuation unregistered");
        }
        handle
    }

    pub fn contains(&self, id: &PromiseId) -> bool {
        self.entries.lock().contains_key(id)
    }

    /// Snapshot of registered ids
    pub fn ids(&self) -> Vec<PromiseId> {
        self.entries.lock().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("pending", &self.len())
            .finish()
    }
}
