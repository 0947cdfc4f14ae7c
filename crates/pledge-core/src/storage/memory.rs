//! In-memory record store
//!
//! Clones share one map, so a test can drop a manager and build a new one over
//! the same store to model a process restart.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::RecordStore;
use crate::error::StoreError;
use crate::types::PromiseId;

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<PromiseId, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl RecordStore for MemoryStore {
    fn put(&self, id: &PromiseId, bytes: &[u8]) -> Result<(), StoreError> {
        self.records.lock().insert(*id, bytes.to_vec());
        Ok(())
    }

    fn get(&self, id: &PromiseId) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.records.lock().get(id).cloned())
    }

    fn delete(&self, id: &PromiseId) -> Result<(), StoreError> {
        self.records.lock().remove(id);
        Ok(())
    }

    fn list(&self) -> Result<Vec<PromiseId>, StoreError> {
        Ok(self.records.lock().keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_basic_ops() {
        let store = MemoryStore::new();
        let id = PromiseId::generate();

        assert!(store.get(&id).unwrap().is_none());
        store.put(&id, b"one").unwrap();
        store.put(&id, b"two").unwrap();
        assert_eq!(store.get(&id).unwrap().as_deref(), Some(&b"two"[..]));
        assert_eq!(store.list().unwrap(), vec![id]);

        store.delete(&id).unwrap();
        store.delete(&id).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_clones_share_records() {
        let store = MemoryStore::new();
        let clone = store.clone();
        clone.put(&PromiseId::generate(), b"x").unwrap();
        assert_eq!(store.len(), 1);
    }
}
