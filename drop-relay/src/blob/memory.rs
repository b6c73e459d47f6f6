//! In-memory blob store for testing and single-process deployments.

use super::{BlobStore, HandleStage};
use crate::error::BlobError;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use drop_types::{BlobLocator, FetchHandle, Timestamp};
use std::sync::{Arc, Mutex};

/// In-memory blob store.
///
/// Not persistent - all data is lost when the store is dropped. Supports
/// injecting one-off failures so the photo commit and cleanup paths can be
/// exercised. Clones share the same blobs and failure queue.
#[derive(Debug, Clone)]
pub struct MemoryBlobStore {
    blobs: Arc<DashMap<String, StoredBlob>>,
    failures: Arc<Mutex<InjectedFailures>>,
    handles: HandleStage,
}

#[derive(Debug, Clone)]
struct StoredBlob {
    bytes: Bytes,
    content_type: String,
    stored_at: Timestamp,
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Put,
    Handle,
    Delete,
}

#[derive(Debug, Default)]
struct InjectedFailures {
    put: Option<String>,
    handle: Option<String>,
    delete: Option<String>,
}

impl MemoryBlobStore {
    /// Create an empty store issuing handles from `handles`.
    pub fn new(handles: HandleStage) -> Self {
        Self {
            blobs: Arc::new(DashMap::new()),
            failures: Arc::new(Mutex::new(InjectedFailures::default())),
            handles,
        }
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Cause the next put_blob() to fail with the given error.
    pub fn fail_next_put(&self, error: &str) {
        self.failures.lock().unwrap_or_else(|e| e.into_inner()).put = Some(error.to_string());
    }

    /// Cause the next get_blob_handle() to fail with the given error.
    pub fn fail_next_handle(&self, error: &str) {
        self.failures.lock().unwrap_or_else(|e| e.into_inner()).handle = Some(error.to_string());
    }

    /// Cause the next delete_blob() to fail with the given error.
    pub fn fail_next_delete(&self, error: &str) {
        self.failures.lock().unwrap_or_else(|e| e.into_inner()).delete = Some(error.to_string());
    }

    fn take_failure(&self, op: Op) -> Option<BlobError> {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        let slot = match op {
            Op::Put => &mut failures.put,
            Op::Handle => &mut failures.handle,
            Op::Delete => &mut failures.delete,
        };
        slot.take().map(BlobError::Backend)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_blob(
        &self,
        locator: &BlobLocator,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), BlobError> {
        if let Some(err) = self.take_failure(Op::Put) {
            return Err(err);
        }
        self.blobs.insert(
            locator.as_str().to_string(),
            StoredBlob {
                bytes,
                content_type: content_type.to_string(),
                stored_at: self.handles.now(),
            },
        );
        Ok(())
    }

    async fn get_blob_handle(&self, locator: &BlobLocator) -> Result<FetchHandle, BlobError> {
        if let Some(err) = self.take_failure(Op::Handle) {
            return Err(err);
        }
        let stored = self
            .blobs
            .get(locator.as_str())
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BlobError::NotFound {
                locator: locator.to_string(),
            })?;
        Ok(self.handles.stage(stored.bytes, &stored.content_type))
    }

    async fn delete_blob(&self, locator: &BlobLocator) -> Result<(), BlobError> {
        if let Some(err) = self.take_failure(Op::Delete) {
            return Err(err);
        }
        self.blobs.remove(locator.as_str());
        Ok(())
    }

    async fn contains(&self, locator: &BlobLocator) -> Result<bool, BlobError> {
        Ok(self.blobs.contains_key(locator.as_str()))
    }

    async fn list_older_than(&self, cutoff: Timestamp) -> Result<Vec<BlobLocator>, BlobError> {
        Ok(self
            .blobs
            .iter()
            .filter(|entry| entry.value().stored_at < cutoff)
            .filter_map(|entry| BlobLocator::new(entry.key().clone()).ok())
            .collect())
    }

    fn handles(&self) -> &HandleStage {
        &self.handles
    }
}
