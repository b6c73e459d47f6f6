//! In-process record storage.

use super::RecordStorage;
use crate::error::StorageError;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use drop_types::{RecordKey, Timestamp, TransferRecord};
use std::sync::Arc;

/// Record storage backed by a sharded concurrent map.
///
/// Each operation on a key holds only that key's shard lock, so unrelated
/// codes never contend on a global lock while operations on the same key
/// are linearizable. Clones share the same map.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    records: Arc<DashMap<RecordKey, TransferRecord>>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records physically present, live or not.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the store holds no records at all.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecordStorage for MemoryStorage {
    async fn insert(&self, record: TransferRecord, now: Timestamp) -> Result<(), StorageError> {
        let key = record.key();
        match self.records.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    return Err(StorageError::AlreadyExists {
                        key: occupied.key().clone(),
                    });
                }
                occupied.insert(record);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(record);
            }
        }
        Ok(())
    }

    async fn find_if_live(
        &self,
        key: &RecordKey,
        now: Timestamp,
    ) -> Result<Option<TransferRecord>, StorageError> {
        Ok(self
            .records
            .get(key)
            .filter(|r| r.is_live(now))
            .map(|r| r.value().clone()))
    }

    async fn delete_if_present(&self, key: &RecordKey) -> Result<bool, StorageError> {
        Ok(self.records.remove(key).is_some())
    }

    async fn take_if_live(
        &self,
        key: &RecordKey,
        now: Timestamp,
    ) -> Result<Option<TransferRecord>, StorageError> {
        // Removal is the claim: whoever removes the entry owns it.
        Ok(self
            .records
            .remove(key)
            .map(|(_, record)| record)
            .filter(|record| record.is_live(now)))
    }

    async fn cleanup_expired(&self, now: Timestamp) -> Result<Vec<TransferRecord>, StorageError> {
        let mut removed = Vec::new();
        self.records.retain(|_, record| {
            if record.is_live(now) {
                true
            } else {
                removed.push(record.clone());
                false
            }
        });
        Ok(removed)
    }

    async fn live_count(&self, now: Timestamp) -> Result<u64, StorageError> {
        Ok(self.records.iter().filter(|r| r.is_live(now)).count() as u64)
    }
}
