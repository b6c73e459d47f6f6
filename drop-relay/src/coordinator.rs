//! Two-phase photo commit across the blob store and the record store.
//!
//! Upload path: reserve a code, store the blob, then register the record.
//! A [`RollbackGuard`] is armed before the blob write and deletes the blob
//! unless registration succeeds, including when the caller's future is
//! dropped mid-flight.
//!
//! Download path: find the record, resolve a fetch handle, atomically claim
//! the record, then delete the blob. The handle is backed by staged bytes,
//! so deleting the blob does not break it.
//!
//! Every blob delete is best-effort and time-boxed. Whatever a failed delete
//! leaves behind is reclaimed later by [`BlobCoordinator::reclaim_orphans`].

use crate::blob::BlobStore;
use crate::error::{BlobError, StorageError, TransferError, TransferResult};
use crate::records::{IssuedCode, TransferRecords};
use crate::service::TransferMetrics;
use bytes::Bytes;
use drop_types::{
    BlobLocator, FetchHandle, Payload, PhotoMime, Timestamp, TransferCode, TransferKind,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Default time budget for storing a photo.
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time budget for resolving a fetch handle.
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Time budgets for blob store calls.
#[derive(Debug, Clone, Copy)]
pub struct BlobTimeouts {
    /// Budget for `put_blob`
    pub upload: Duration,
    /// Budget for `get_blob_handle` and `delete_blob`
    pub resolve: Duration,
}

impl Default for BlobTimeouts {
    fn default() -> Self {
        Self {
            upload: DEFAULT_UPLOAD_TIMEOUT,
            resolve: DEFAULT_RESOLVE_TIMEOUT,
        }
    }
}

/// Keeps photo blobs and their records consistent.
#[derive(Debug, Clone)]
pub struct BlobCoordinator {
    records: Arc<TransferRecords>,
    blobs: Arc<dyn BlobStore>,
    timeouts: BlobTimeouts,
    metrics: Arc<TransferMetrics>,
}

impl BlobCoordinator {
    /// Create a coordinator over a record store and a blob store.
    pub fn new(
        records: Arc<TransferRecords>,
        blobs: Arc<dyn BlobStore>,
        timeouts: BlobTimeouts,
        metrics: Arc<TransferMetrics>,
    ) -> Self {
        Self {
            records,
            blobs,
            timeouts,
            metrics,
        }
    }

    /// Time budgets for blob store calls.
    pub fn timeouts(&self) -> BlobTimeouts {
        self.timeouts
    }

    /// The blob store behind this coordinator.
    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    /// Store a validated photo and register it under a fresh code.
    ///
    /// # Errors
    ///
    /// - [`TransferError::GenerationFailed`] before anything is written.
    /// - [`TransferError::UploadFailed`] if the blob write fails or times
    ///   out. No record is written.
    /// - [`TransferError::RegistrationFailed`] if the record write fails.
    ///   The blob is deleted before this returns.
    pub async fn upload(&self, bytes: Bytes, mime: PhotoMime) -> TransferResult<IssuedCode> {
        let code = self.records.reserve(TransferKind::Photo).await?;
        let locator = BlobLocator::for_photo(&code, mime);

        let guard = RollbackGuard::arm(
            Arc::clone(&self.blobs),
            locator.clone(),
            self.timeouts.resolve,
            Arc::clone(&self.metrics),
        );

        let size = bytes.len();
        let stored = tokio::time::timeout(
            self.timeouts.upload,
            self.blobs.put_blob(&locator, bytes, mime.as_mime_type()),
        )
        .await
        .unwrap_or_else(|_| {
            Err(BlobError::Timeout {
                operation: "upload",
                secs: self.timeouts.upload.as_secs(),
            })
        });

        if let Err(e) = stored {
            tracing::warn!("Photo upload to {} failed: {}", locator, e);
            guard.rollback().await;
            return Err(TransferError::UploadFailed(e));
        }

        let ttl = self.records.policy().ttl;
        match self
            .records
            .put_reserved(code, TransferKind::Photo, Payload::Blob(locator), ttl)
            .await
        {
            Ok(issued) => {
                guard.disarm();
                tracing::info!("Photo stored under {} ({} bytes)", issued.code, size);
                Ok(issued)
            }
            Err(e) => {
                tracing::warn!("Photo registration failed, rolling back: {}", e);
                guard.rollback().await;
                Err(TransferError::RegistrationFailed(e))
            }
        }
    }

    /// Claim a photo by code and return a handle to its bytes.
    ///
    /// Of any number of concurrent callers with the same code, exactly one
    /// gets the handle; the rest get `NotFound`.
    ///
    /// # Errors
    ///
    /// - [`TransferError::NotFound`] if the code is absent, expired, or
    ///   claimed by someone else.
    /// - [`TransferError::PhotoUnavailable`] if the record exists but its
    ///   blob cannot be resolved. The record and blob are removed.
    pub async fn receive(&self, code: &TransferCode) -> TransferResult<FetchHandle> {
        let record = self
            .records
            .find_by_code(TransferKind::Photo, code)
            .await?
            .ok_or(TransferError::NotFound)?;

        let Some(locator) = record.blob_locator().cloned() else {
            tracing::error!("Photo record {} has no blob locator", code);
            self.claim(code, None).await;
            return Err(TransferError::PhotoUnavailable(BlobError::InvalidLocator {
                locator: String::new(),
            }));
        };

        let resolved = tokio::time::timeout(
            self.timeouts.resolve,
            self.blobs.get_blob_handle(&locator),
        )
        .await
        .unwrap_or_else(|_| {
            Err(BlobError::Timeout {
                operation: "resolve",
                secs: self.timeouts.resolve.as_secs(),
            })
        });

        let handle = match resolved {
            Ok(handle) => handle,
            // A concurrent winner may have deleted the blob already, so only
            // the caller that claims the record reports it unavailable.
            Err(e) => {
                return match self.claim(code, Some(&locator)).await {
                    Claim::Won => {
                        tracing::warn!("Photo {} unavailable: {}", code, e);
                        self.delete_blob(&locator).await;
                        Err(TransferError::PhotoUnavailable(e))
                    }
                    Claim::Lost => {
                        self.delete_blob(&locator).await;
                        Err(TransferError::NotFound)
                    }
                    Claim::Failed(storage) => Err(storage.into()),
                };
            }
        };

        match self.claim(code, Some(&locator)).await {
            Claim::Won => {}
            Claim::Lost => {
                self.blobs.revoke_handle(&handle.token);
                self.delete_blob(&locator).await;
                return Err(TransferError::NotFound);
            }
            Claim::Failed(e) => {
                self.blobs.revoke_handle(&handle.token);
                return Err(e.into());
            }
        }

        // The receiver has what they need; a failed delete leaves an
        // orphan for the sweeper rather than failing the request.
        self.delete_blob(&locator).await;
        tracing::info!("Photo {} claimed", code);
        Ok(handle)
    }

    /// Remove the record for `code` if it still points at `locator`.
    ///
    /// If the code was recycled for a newer photo since it was looked up,
    /// the newer record is put back and the claim is lost.
    ///
    /// A lost claim means the record behind `locator` is gone: expired,
    /// swept, or taken by a receiver that already resolved its own handle.
    /// Locators are unique per upload, so the caller may delete the blob.
    async fn claim(&self, code: &TransferCode, locator: Option<&BlobLocator>) -> Claim {
        let taken = match self.records.take_live(TransferKind::Photo, code).await {
            Ok(Some(taken)) => taken,
            Ok(None) => return Claim::Lost,
            Err(e) => return Claim::Failed(e),
        };

        if taken.blob_locator() == locator {
            return Claim::Won;
        }

        tracing::warn!("Code {} was reissued during receive; restoring", code);
        if let Err(e) = self.records.restore(taken).await {
            tracing::error!("Failed to restore record {}: {}", code, e);
        }
        Claim::Lost
    }

    /// Best-effort blob delete. Failures are logged and counted.
    async fn delete_blob(&self, locator: &BlobLocator) -> bool {
        match delete_within(self.blobs.as_ref(), locator, self.timeouts.resolve).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to delete blob {}: {}", locator, e);
                self.metrics.cleanup_failures.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Delete the blob behind an expired photo record.
    pub async fn delete_expired_blob(&self, locator: &BlobLocator) -> bool {
        self.delete_blob(locator).await
    }

    /// Delete photo blobs stored before `cutoff` that no live record owns.
    ///
    /// Picks up what failed deletes and rollbacks left behind. A blob is
    /// written before its record, so `cutoff` should trail the present by
    /// at least the record lifetime plus the upload budget. Returns how
    /// many blobs were deleted.
    pub async fn reclaim_orphans(&self, cutoff: Timestamp) -> Result<usize, BlobError> {
        let candidates = self.blobs.list_older_than(cutoff).await?;
        let mut reclaimed = 0;
        for locator in candidates {
            if self.is_owned(&locator).await {
                continue;
            }
            if self.delete_blob(&locator).await {
                tracing::info!("Reclaimed orphaned blob {}", locator);
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    /// Whether a live record points at `locator`, or ownership is unknown.
    async fn is_owned(&self, locator: &BlobLocator) -> bool {
        // Not laid out like a photo blob, so not ours to judge
        let Some(code) = locator.photo_code() else {
            return true;
        };
        match self.records.find_by_code(TransferKind::Photo, &code).await {
            Ok(Some(record)) => record.blob_locator() == Some(locator),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("Keeping blob {}, owner lookup failed: {}", locator, e);
                true
            }
        }
    }
}

async fn delete_within(
    blobs: &dyn BlobStore,
    locator: &BlobLocator,
    budget: Duration,
) -> Result<(), BlobError> {
    tokio::time::timeout(budget, blobs.delete_blob(locator))
        .await
        .unwrap_or_else(|_| {
            Err(BlobError::Timeout {
                operation: "delete",
                secs: budget.as_secs(),
            })
        })
}

enum Claim {
    Won,
    Lost,
    Failed(StorageError),
}

/// Deletes an uploaded blob unless disarmed.
///
/// If dropped while still armed (the upload future was cancelled), the
/// delete is spawned onto the current runtime.
struct RollbackGuard {
    blobs: Arc<dyn BlobStore>,
    locator: Option<BlobLocator>,
    budget: Duration,
    metrics: Arc<TransferMetrics>,
}

impl RollbackGuard {
    fn arm(
        blobs: Arc<dyn BlobStore>,
        locator: BlobLocator,
        budget: Duration,
        metrics: Arc<TransferMetrics>,
    ) -> Self {
        Self {
            blobs,
            locator: Some(locator),
            budget,
            metrics,
        }
    }

    /// The record now owns the blob.
    fn disarm(mut self) {
        self.locator = None;
    }

    /// Delete the blob now.
    async fn rollback(mut self) {
        let Some(locator) = self.locator.clone() else {
            return;
        };
        // Stays armed until the delete returns, so cancellation here still
        // falls through to Drop.
        let result = delete_within(self.blobs.as_ref(), &locator, self.budget).await;
        self.locator = None;
        match result {
            Ok(()) => tracing::debug!("Rolled back blob {}", locator),
            Err(e) => {
                tracing::error!("Rollback of blob {} failed, orphaned: {}", locator, e);
                self.metrics.cleanup_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl Drop for RollbackGuard {
    fn drop(&mut self) {
        let Some(locator) = self.locator.take() else {
            return;
        };
        let blobs = Arc::clone(&self.blobs);
        let metrics = Arc::clone(&self.metrics);
        let budget = self.budget;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::warn!("Photo upload abandoned, deleting blob {}", locator);
                runtime.spawn(async move {
                    if let Err(e) = delete_within(blobs.as_ref(), &locator, budget).await {
                        tracing::error!("Rollback of blob {} failed, orphaned: {}", locator, e);
                        metrics.cleanup_failures.fetch_add(1, Ordering::Relaxed);
                    }
                });
            }
            Err(_) => {
                tracing::error!("No runtime to roll back blob {}, orphaned", locator);
                metrics.cleanup_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
