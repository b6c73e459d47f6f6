//! The transfer service: the four operations clients call.
//!
//! Validation happens here, before any store is touched, so a rejected
//! request leaves no trace in either store.

use crate::blob::{BlobStore, StagedBlob};
use crate::coordinator::{BlobCoordinator, BlobTimeouts};
use crate::error::{StorageError, TransferError, TransferResult};
use crate::records::{IssuedCode, TransferRecords};
use crate::storage::RecordStorage;
use bytes::Bytes;
use drop_core::{validate_code, validate_photo, validate_text, Clock, TransferPolicy};
use drop_types::{FetchHandle, Payload, TransferKind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Operational counters for transfer activity.
///
/// All counters are monotonically increasing (reset only on restart).
#[derive(Debug, Default)]
pub struct TransferMetrics {
    /// Text transfers created.
    pub texts_sent: AtomicU64,
    /// Text transfers consumed.
    pub texts_received: AtomicU64,
    /// Photo transfers created.
    pub photos_sent: AtomicU64,
    /// Photo transfers claimed.
    pub photos_received: AtomicU64,
    /// Photo bytes accepted.
    pub photo_bytes_received: AtomicU64,
    /// Requests rejected by validation.
    pub validation_failures: AtomicU64,
    /// Receives for unknown, expired, or consumed codes.
    pub not_found_total: AtomicU64,
    /// Sends that could not allocate a code.
    pub generation_failures: AtomicU64,
    /// Blob deletes that failed and left an orphan.
    pub cleanup_failures: AtomicU64,
    /// Records removed by the sweeper.
    pub records_expired: AtomicU64,
    /// Blobs with no owning record deleted by the sweeper.
    pub orphans_reclaimed: AtomicU64,
    /// Requests rejected by rate limiting.
    pub rate_limit_hits: AtomicU64,
}

/// Outcome of one sweeper pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired records removed
    pub records: usize,
    /// Photo blobs deleted along with them
    pub blobs_deleted: usize,
    /// Fetch handles past their expiry
    pub handles_pruned: usize,
    /// Blobs left behind by failed deletes
    pub orphans_deleted: usize,
}

/// Facade over the record store and the photo coordinator.
#[derive(Debug)]
pub struct TransferService {
    records: Arc<TransferRecords>,
    coordinator: BlobCoordinator,
    metrics: Arc<TransferMetrics>,
}

impl TransferService {
    /// Assemble a service from its backends.
    pub fn new(
        storage: Arc<dyn RecordStorage>,
        blobs: Arc<dyn BlobStore>,
        clock: Arc<dyn Clock>,
        policy: TransferPolicy,
        timeouts: BlobTimeouts,
    ) -> Self {
        let metrics = Arc::new(TransferMetrics::default());
        let records = Arc::new(TransferRecords::new(storage, clock, policy));
        let coordinator =
            BlobCoordinator::new(Arc::clone(&records), blobs, timeouts, Arc::clone(&metrics));
        Self {
            records,
            coordinator,
            metrics,
        }
    }

    /// Limits in force.
    pub fn policy(&self) -> &TransferPolicy {
        self.records.policy()
    }

    /// Operational counters.
    pub fn metrics(&self) -> &TransferMetrics {
        &self.metrics
    }

    /// Share a text under a fresh 4-letter code.
    pub async fn send_text(&self, text: &str) -> TransferResult<IssuedCode> {
        let result = self.try_send_text(text).await;
        self.observe(&result, &self.metrics.texts_sent);
        result
    }

    async fn try_send_text(&self, text: &str) -> TransferResult<IssuedCode> {
        validate_text(text, self.policy())?;
        let ttl = self.policy().ttl;
        let issued = self
            .records
            .put(TransferKind::Text, Payload::Text(text.to_string()), ttl)
            .await?;
        tracing::info!("Text stored under {} ({} chars)", issued.code, text.chars().count());
        Ok(issued)
    }

    /// Consume a text by code. Lowercase input is accepted.
    pub async fn receive_text(&self, code: &str) -> TransferResult<String> {
        let result = self.try_receive_text(code).await;
        self.observe(&result, &self.metrics.texts_received);
        result
    }

    async fn try_receive_text(&self, code: &str) -> TransferResult<String> {
        let code = validate_code(code, TransferKind::Text, self.policy())?;
        let record = self.records.take_by_code(TransferKind::Text, &code).await?;
        match record.payload {
            Payload::Text(text) => Ok(text),
            Payload::Blob(locator) => Err(StorageError::Corrupt(format!(
                "text record {code} holds blob {locator}"
            ))
            .into()),
        }
    }

    /// Share a photo under a fresh 5-letter code.
    ///
    /// `declared_size` is what the client claimed; it must agree with the
    /// bytes actually received.
    pub async fn send_photo(
        &self,
        bytes: Bytes,
        mime_type: &str,
        declared_size: u64,
    ) -> TransferResult<IssuedCode> {
        let size = bytes.len() as u64;
        let result = self.try_send_photo(bytes, mime_type, declared_size).await;
        if result.is_ok() {
            self.metrics
                .photo_bytes_received
                .fetch_add(size, Ordering::Relaxed);
        }
        self.observe(&result, &self.metrics.photos_sent);
        result
    }

    async fn try_send_photo(
        &self,
        bytes: Bytes,
        mime_type: &str,
        declared_size: u64,
    ) -> TransferResult<IssuedCode> {
        let mime = validate_photo(bytes.len(), declared_size, mime_type, self.policy())?;
        self.coordinator.upload(bytes, mime).await
    }

    /// Claim a photo by code, returning a one-shot handle to its bytes.
    pub async fn receive_photo(&self, code: &str) -> TransferResult<FetchHandle> {
        let result = self.try_receive_photo(code).await;
        self.observe(&result, &self.metrics.photos_received);
        result
    }

    async fn try_receive_photo(&self, code: &str) -> TransferResult<FetchHandle> {
        let code = validate_code(code, TransferKind::Photo, self.policy())?;
        self.coordinator.receive(&code).await
    }

    /// Redeem a fetch handle token.
    pub fn open_handle(&self, token: &str) -> Option<StagedBlob> {
        self.coordinator.blobs().open_handle(token)
    }

    /// Remove expired records with their blobs, reclaim orphaned blobs,
    /// and drop stale handles.
    pub async fn sweep_expired(&self) -> Result<SweepReport, StorageError> {
        let expired = self.records.sweep_expired().await?;
        let mut report = SweepReport {
            records: expired.len(),
            ..SweepReport::default()
        };

        for record in &expired {
            if let Some(locator) = record.blob_locator() {
                if self.coordinator.delete_expired_blob(locator).await {
                    report.blobs_deleted += 1;
                }
            }
        }
        // Only blobs that outlived any record they could belong to
        let grace = self.policy().ttl + self.coordinator.timeouts().upload;
        let cutoff = self.records.now().saturating_sub(grace);
        match self.coordinator.reclaim_orphans(cutoff).await {
            Ok(reclaimed) => report.orphans_deleted = reclaimed,
            Err(e) => tracing::warn!("Orphan scan failed: {}", e),
        }

        report.handles_pruned = self.coordinator.blobs().prune_handles();

        self.metrics
            .records_expired
            .fetch_add(report.records as u64, Ordering::Relaxed);
        self.metrics
            .orphans_reclaimed
            .fetch_add(report.orphans_deleted as u64, Ordering::Relaxed);
        Ok(report)
    }

    /// Records currently live across both namespaces.
    pub async fn live_count(&self) -> Result<u64, StorageError> {
        self.records.live_count().await
    }

    fn observe<T>(&self, result: &TransferResult<T>, success: &AtomicU64) {
        let counter = match result {
            Ok(_) => success,
            Err(TransferError::Validation(_)) => &self.metrics.validation_failures,
            Err(TransferError::NotFound) => &self.metrics.not_found_total,
            Err(TransferError::GenerationFailed(_)) => &self.metrics.generation_failures,
            Err(e) => {
                tracing::error!("Transfer failed: {}", e);
                return;
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{HandleStage, MemoryBlobStore};
    use crate::storage::{MemoryStorage, SqliteStorage};
    use drop_core::{ManualClock, ValidationError, MAX_PHOTO_BYTES};
    use drop_types::{BlobLocator, PhotoMime, Timestamp, TransferCode};
    use std::time::Duration;

    struct Harness {
        service: TransferService,
        storage: MemoryStorage,
        blobs: MemoryBlobStore,
        clock: ManualClock,
    }

    fn harness() -> Harness {
        let clock = ManualClock::new(Timestamp::from_millis(1_700_000_000_000));
        let storage = MemoryStorage::new();
        let blobs = MemoryBlobStore::new(HandleStage::new(
            "http://relay.test",
            Duration::from_secs(60),
            Arc::new(clock.clone()),
        ));
        let service = TransferService::new(
            Arc::new(storage.clone()),
            Arc::new(blobs.clone()),
            Arc::new(clock.clone()),
            TransferPolicy::default(),
            BlobTimeouts::default(),
        );
        Harness {
            service,
            storage,
            blobs,
            clock,
        }
    }

    #[tokio::test]
    async fn text_round_trip_is_single_use() {
        let h = harness();
        let issued = h.service.send_text("hello").await.unwrap();
        let code = issued.code.to_string();
        assert_eq!(code.len(), 4);
        assert!(code.chars().all(|c| c.is_ascii_uppercase()));

        // Lowercase input resolves to the same record
        let text = h.service.receive_text(&code.to_lowercase()).await.unwrap();
        assert_eq!(text, "hello");

        let again = h.service.receive_text(&code).await;
        assert!(matches!(again, Err(TransferError::NotFound)));
        assert_eq!(h.service.metrics().texts_received.load(Ordering::Relaxed), 1);
        assert_eq!(h.service.metrics().not_found_total.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn text_expires_after_five_minutes() {
        let h = harness();
        let a = h.service.send_text("early").await.unwrap();
        let b = h.service.send_text("late").await.unwrap();

        h.clock.advance(Duration::from_secs(4 * 60 + 59));
        assert_eq!(h.service.receive_text(a.code.as_str()).await.unwrap(), "early");

        h.clock.advance(Duration::from_secs(2));
        assert!(matches!(
            h.service.receive_text(b.code.as_str()).await,
            Err(TransferError::NotFound)
        ));
    }

    #[tokio::test]
    async fn invalid_text_is_rejected_without_writes() {
        let h = harness();
        assert!(matches!(
            h.service.send_text("").await,
            Err(TransferError::Validation(ValidationError::EmptyText))
        ));
        let long = "x".repeat(10_001);
        assert!(matches!(
            h.service.send_text(&long).await,
            Err(TransferError::Validation(ValidationError::TextTooLong { .. }))
        ));
        assert!(h.storage.is_empty());
        assert_eq!(h.service.metrics().validation_failures.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn malformed_codes_are_validation_errors() {
        let h = harness();
        for bad in ["", "AB", "ABCDE", "AB1D", "ÄBCD"] {
            assert!(
                matches!(h.service.receive_text(bad).await, Err(TransferError::Validation(_))),
                "{bad:?} should be rejected"
            );
        }
        assert!(matches!(
            h.service.receive_photo("ABCD").await,
            Err(TransferError::Validation(ValidationError::CodeLength { expected: 5 }))
        ));
    }

    #[tokio::test]
    async fn text_and_photo_namespaces_do_not_mix() {
        let h = harness();
        let issued = h.service.send_text("hi").await.unwrap();
        // A text code has the wrong length for the photo namespace
        assert!(matches!(
            h.service.receive_photo(issued.code.as_str()).await,
            Err(TransferError::Validation(_))
        ));
        assert_eq!(h.service.receive_text(issued.code.as_str()).await.unwrap(), "hi");
    }

    #[tokio::test]
    async fn photo_scenario() {
        let h = harness();
        let bytes = Bytes::from(vec![7u8; 2 * 1024 * 1024]);

        let issued = h
            .service
            .send_photo(bytes.clone(), "image/png", bytes.len() as u64)
            .await
            .unwrap();
        assert_eq!(issued.code.len(), 5);
        assert_eq!(h.blobs.len(), 1);

        let handle = h.service.receive_photo(issued.code.as_str()).await.unwrap();
        assert_eq!(handle.content_type, "image/png");
        assert!(handle.url.ends_with(&handle.token));
        assert!(h.blobs.is_empty());
        assert!(h.storage.is_empty());

        let staged = h.service.open_handle(&handle.token).unwrap();
        assert_eq!(staged.bytes, bytes);
        assert!(h.service.open_handle(&handle.token).is_none());

        assert!(matches!(
            h.service.receive_photo(issued.code.as_str()).await,
            Err(TransferError::NotFound)
        ));
    }

    #[tokio::test]
    async fn oversized_or_wrong_type_photo_writes_nothing() {
        let h = harness();
        let big = Bytes::from(vec![0u8; 15 * 1024 * 1024]);
        assert!(matches!(
            h.service.send_photo(big, "image/png", 15 * 1024 * 1024).await,
            Err(TransferError::Validation(ValidationError::PhotoTooLarge { .. }))
        ));

        let small = Bytes::from_static(b"not an image");
        assert!(matches!(
            h.service.send_photo(small.clone(), "text/plain", small.len() as u64).await,
            Err(TransferError::Validation(ValidationError::UnsupportedType(_)))
        ));

        assert!(matches!(
            h.service.send_photo(small, "image/png", MAX_PHOTO_BYTES).await,
            Err(TransferError::Validation(ValidationError::SizeMismatch { .. }))
        ));

        assert!(h.storage.is_empty());
        assert!(h.blobs.is_empty());
    }

    #[tokio::test]
    async fn photo_upload_failure_surfaces() {
        let h = harness();
        h.blobs.fail_next_put("bucket unavailable");
        let bytes = Bytes::from_static(b"webp");
        let result = h.service.send_photo(bytes, "image/webp", 4).await;
        assert!(matches!(result, Err(TransferError::UploadFailed(_))));
        assert!(h.storage.is_empty());
    }

    #[tokio::test]
    async fn sweep_removes_expired_records_and_blobs() {
        let h = harness();
        h.service.send_text("gone soon").await.unwrap();
        h.service
            .send_photo(Bytes::from_static(b"jpeg"), "image/jpeg", 4)
            .await
            .unwrap();
        assert_eq!(h.service.live_count().await.unwrap(), 2);

        h.clock.advance(Duration::from_secs(5 * 60));
        let report = h.service.sweep_expired().await.unwrap();
        assert_eq!(report.records, 2);
        assert_eq!(report.blobs_deleted, 1);
        assert!(h.blobs.is_empty());
        assert!(h.storage.is_empty());
        assert_eq!(h.service.metrics().records_expired.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn sweep_reclaims_blob_left_by_failed_delete() {
        let h = harness();
        let issued = h
            .service
            .send_photo(Bytes::from_static(b"png!"), "image/png", 4)
            .await
            .unwrap();
        h.blobs.fail_next_delete("offline");
        h.service.receive_photo(issued.code.as_str()).await.unwrap();
        assert_eq!(h.blobs.len(), 1);

        h.clock.advance(Duration::from_secs(5 * 60));
        let report = h.service.sweep_expired().await.unwrap();
        assert_eq!(report.orphans_deleted, 0);
        assert_eq!(h.blobs.len(), 1);

        h.clock.advance(Duration::from_secs(31));
        let report = h.service.sweep_expired().await.unwrap();
        assert_eq!(report.orphans_deleted, 1);
        assert!(h.blobs.is_empty());
        assert_eq!(h.service.metrics().orphans_reclaimed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn sweep_reclaims_stray_blob_without_record() {
        let h = harness();
        // What a failed rollback leaves: a photo blob no record points at
        let code = TransferCode::parse("ABCDE").unwrap();
        let stray = BlobLocator::for_photo(&code, PhotoMime::Png);
        h.blobs
            .put_blob(&stray, Bytes::from_static(b"png!"), "image/png")
            .await
            .unwrap();

        h.clock.advance(Duration::from_secs(6 * 60));
        let report = h.service.sweep_expired().await.unwrap();
        assert_eq!(report.orphans_deleted, 1);
        assert!(h.blobs.is_empty());
    }

    #[tokio::test]
    async fn sweep_prunes_stale_handles() {
        let h = harness();
        let issued = h
            .service
            .send_photo(Bytes::from_static(b"png!"), "image/png", 4)
            .await
            .unwrap();
        h.service.receive_photo(issued.code.as_str()).await.unwrap();

        h.clock.advance(Duration::from_secs(61));
        let report = h.service.sweep_expired().await.unwrap();
        assert_eq!(report.handles_pruned, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_text_receive_one_winner() {
        let clock = ManualClock::new(Timestamp::from_millis(1_700_000_000_000));
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::new(&dir.path().join("svc.db")).await.unwrap();
        let blobs = MemoryBlobStore::new(HandleStage::new(
            "http://relay.test",
            Duration::from_secs(60),
            Arc::new(clock.clone()),
        ));
        let service = Arc::new(TransferService::new(
            Arc::new(storage),
            Arc::new(blobs),
            Arc::new(clock),
            TransferPolicy::default(),
            BlobTimeouts::default(),
        ));
        let issued = service.send_text("only once").await.unwrap();

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let service = Arc::clone(&service);
            let code = issued.code.to_string();
            tasks.spawn(async move { service.receive_text(&code).await });
        }

        let mut texts = Vec::new();
        while let Some(result) = tasks.join_next().await {
            if let Ok(text) = result.unwrap() {
                texts.push(text);
            }
        }
        assert_eq!(texts, vec!["only once".to_string()]);
    }
}
