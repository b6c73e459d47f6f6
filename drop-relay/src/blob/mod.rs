//! Blob storage for photo payloads.
//!
//! Photos live outside the record store, addressed by a [`BlobLocator`].
//! Resolving a blob stages its bytes behind a short-lived [`FetchHandle`],
//! so the coordinator can delete the blob itself before handing the
//! handle to the receiver.

mod fs;
mod memory;

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;

use crate::error::BlobError;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use drop_core::Clock;
use drop_types::{BlobLocator, FetchHandle, Timestamp};
use std::sync::Arc;
use std::time::Duration;

/// Trait for blob storage backends.
#[async_trait]
pub trait BlobStore: Send + Sync + std::fmt::Debug {
    /// Store bytes at `locator`, replacing anything already there.
    async fn put_blob(
        &self,
        locator: &BlobLocator,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), BlobError>;

    /// Resolve a time-boxed handle for the blob at `locator`.
    ///
    /// The handle keeps working until its own expiry even after
    /// [`BlobStore::delete_blob`] removes the locator.
    async fn get_blob_handle(&self, locator: &BlobLocator) -> Result<FetchHandle, BlobError>;

    /// Delete the blob at `locator`. Deleting an absent blob is not an error.
    async fn delete_blob(&self, locator: &BlobLocator) -> Result<(), BlobError>;

    /// Whether a blob is stored at `locator`.
    async fn contains(&self, locator: &BlobLocator) -> Result<bool, BlobError>;

    /// Locators of every blob stored before `cutoff`.
    async fn list_older_than(&self, cutoff: Timestamp) -> Result<Vec<BlobLocator>, BlobError>;

    /// Handles resolved by this store.
    fn handles(&self) -> &HandleStage;

    /// Consume a handle, returning its bytes if it is still valid.
    fn open_handle(&self, token: &str) -> Option<StagedBlob> {
        self.handles().open(token)
    }

    /// Invalidate a handle that will not be returned to anyone.
    fn revoke_handle(&self, token: &str) -> bool {
        self.handles().revoke(token)
    }

    /// Drop expired handles. Returns how many were dropped.
    fn prune_handles(&self) -> usize {
        self.handles().prune()
    }
}

/// Bytes held behind a fetch handle.
#[derive(Debug, Clone)]
pub struct StagedBlob {
    /// Photo bytes
    pub bytes: Bytes,
    /// Content type to serve them with
    pub content_type: String,
    /// When the handle stops working
    pub expires_at: Timestamp,
}

/// One-shot, time-boxed fetch handles.
///
/// Clones share the same set of handles.
#[derive(Debug, Clone)]
pub struct HandleStage {
    staged: Arc<DashMap<String, StagedBlob>>,
    base_url: String,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl HandleStage {
    /// Create a stage issuing URLs under `base_url` that live for `ttl`.
    pub fn new(base_url: impl Into<String>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            staged: Arc::new(DashMap::new()),
            base_url,
            ttl,
            clock,
        }
    }

    /// Current time on the stage's clock.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Stage bytes and issue a handle for them.
    pub fn stage(&self, bytes: Bytes, content_type: &str) -> FetchHandle {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let expires_at = self.clock.now().saturating_add(self.ttl);
        self.staged.insert(
            token.clone(),
            StagedBlob {
                bytes,
                content_type: content_type.to_string(),
                expires_at,
            },
        );
        FetchHandle {
            url: format!("{}/blobs/{}", self.base_url, token),
            token,
            content_type: content_type.to_string(),
            expires_at,
        }
    }

    /// Consume a handle. Expired handles are dropped and yield nothing.
    pub fn open(&self, token: &str) -> Option<StagedBlob> {
        let now = self.clock.now();
        self.staged
            .remove(token)
            .map(|(_, staged)| staged)
            .filter(|staged| now < staged.expires_at)
    }

    /// Invalidate a handle without reading it.
    pub fn revoke(&self, token: &str) -> bool {
        self.staged.remove(token).is_some()
    }

    /// Drop expired handles.
    pub fn prune(&self) -> usize {
        let now = self.clock.now();
        let before = self.staged.len();
        self.staged.retain(|_, staged| now < staged.expires_at);
        before.saturating_sub(self.staged.len())
    }

    /// Handles currently staged.
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    /// Check if no handles are staged.
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drop_core::ManualClock;

    fn stage(clock: &ManualClock) -> HandleStage {
        HandleStage::new(
            "http://relay.test/",
            Duration::from_secs(60),
            Arc::new(clock.clone()),
        )
    }

    #[test]
    fn handle_url_points_at_blob_route() {
        let clock = ManualClock::new(Timestamp::from_millis(0));
        let handle = stage(&clock).stage(Bytes::from_static(b"png"), "image/png");

        assert_eq!(handle.url, format!("http://relay.test/blobs/{}", handle.token));
        assert_eq!(handle.expires_at.as_millis(), 60_000);
        assert_eq!(handle.content_type, "image/png");
    }

    #[test]
    fn handle_opens_once() {
        let clock = ManualClock::new(Timestamp::from_millis(0));
        let stage = stage(&clock);
        let handle = stage.stage(Bytes::from_static(b"abc"), "image/webp");

        let staged = stage.open(&handle.token).unwrap();
        assert_eq!(&staged.bytes[..], b"abc");
        assert!(stage.open(&handle.token).is_none());
    }

    #[test]
    fn expired_handle_does_not_open() {
        let clock = ManualClock::new(Timestamp::from_millis(0));
        let stage = stage(&clock);
        let handle = stage.stage(Bytes::from_static(b"abc"), "image/png");

        clock.advance(Duration::from_secs(60));
        assert!(stage.open(&handle.token).is_none());
        assert!(stage.is_empty());
    }

    #[test]
    fn prune_drops_only_expired() {
        let clock = ManualClock::new(Timestamp::from_millis(0));
        let stage = stage(&clock);
        stage.stage(Bytes::from_static(b"old"), "image/png");
        clock.advance(Duration::from_secs(30));
        let fresh = stage.stage(Bytes::from_static(b"new"), "image/png");
        clock.advance(Duration::from_secs(31));

        assert_eq!(stage.prune(), 1);
        assert_eq!(stage.len(), 1);
        assert!(stage.open(&fresh.token).is_some());
    }

    #[test]
    fn revoke_invalidates() {
        let clock = ManualClock::new(Timestamp::from_millis(0));
        let stage = stage(&clock);
        let handle = stage.stage(Bytes::from_static(b"abc"), "image/png");

        assert!(stage.revoke(&handle.token));
        assert!(!stage.revoke(&handle.token));
        assert!(stage.open(&handle.token).is_none());
    }
}
