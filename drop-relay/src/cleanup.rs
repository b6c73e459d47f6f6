//! Background cleanup task for expired transfers.
//!
//! Expiry is enforced on read, so this task only reclaims space: expired
//! records, the photo blobs they point at, stale fetch handles, and idle
//! rate limiter entries.

use crate::config::CleanupConfig;
use crate::server::DropRelay;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

/// Spawn a background cleanup task.
///
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_task(
    relay: Arc<DropRelay>,
    config: CleanupConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if !config.enabled {
            tracing::info!("Cleanup task disabled");
            return;
        }

        let interval_secs = config.interval_secs.max(1);
        tracing::info!("Cleanup task started (interval: {}s)", interval_secs);

        let mut timer = interval(Duration::from_secs(interval_secs));

        loop {
            timer.tick().await;
            run_cleanup(&relay).await;
        }
    })
}

/// One cleanup pass.
pub async fn run_cleanup(relay: &DropRelay) {
    match relay.service().sweep_expired().await {
        Ok(report) => {
            if report.records > 0 || report.handles_pruned > 0 || report.orphans_deleted > 0 {
                tracing::info!(
                    "Cleanup: removed {} expired transfers ({} blobs), {} orphaned blobs, \
                     pruned {} handles",
                    report.records,
                    report.blobs_deleted,
                    report.orphans_deleted,
                    report.handles_pruned
                );
            } else {
                tracing::debug!("Cleanup: nothing expired");
            }
        }
        Err(e) => {
            tracing::error!("Cleanup error: {}", e);
        }
    }

    relay.rate_limits().shrink();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{HandleStage, MemoryBlobStore};
    use crate::config::Config;
    use crate::coordinator::BlobTimeouts;
    use crate::service::TransferService;
    use crate::storage::MemoryStorage;
    use bytes::Bytes;
    use drop_core::{ManualClock, TransferPolicy};
    use drop_types::Timestamp;

    fn relay(
        clock: &ManualClock,
        storage: &MemoryStorage,
        blobs: &MemoryBlobStore,
    ) -> Arc<DropRelay> {
        let service = TransferService::new(
            Arc::new(storage.clone()),
            Arc::new(blobs.clone()),
            Arc::new(clock.clone()),
            TransferPolicy::default(),
            BlobTimeouts::default(),
        );
        Arc::new(DropRelay::new(Config::default(), service))
    }

    #[tokio::test]
    async fn cleanup_removes_expired_transfers_and_blobs() {
        let clock = ManualClock::new(Timestamp::from_millis(0));
        let storage = MemoryStorage::new();
        let blobs = MemoryBlobStore::new(HandleStage::new(
            "http://relay.test",
            Duration::from_secs(60),
            Arc::new(clock.clone()),
        ));
        let relay = relay(&clock, &storage, &blobs);

        relay.service().send_text("stale").await.unwrap();
        relay
            .service()
            .send_photo(Bytes::from_static(b"webp"), "image/webp", 4)
            .await
            .unwrap();

        clock.advance(Duration::from_secs(301));
        run_cleanup(&relay).await;

        assert!(storage.is_empty());
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn cleanup_keeps_live_transfers() {
        let clock = ManualClock::new(Timestamp::from_millis(0));
        let storage = MemoryStorage::new();
        let blobs = MemoryBlobStore::new(HandleStage::new(
            "http://relay.test",
            Duration::from_secs(60),
            Arc::new(clock.clone()),
        ));
        let relay = relay(&clock, &storage, &blobs);

        let issued = relay.service().send_text("fresh").await.unwrap();
        clock.advance(Duration::from_secs(60));
        run_cleanup(&relay).await;

        assert_eq!(
            relay.service().receive_text(issued.code.as_str()).await.unwrap(),
            "fresh"
        );
    }

    #[tokio::test]
    async fn cleanup_task_disabled() {
        let clock = ManualClock::new(Timestamp::from_millis(0));
        let storage = MemoryStorage::new();
        let blobs = MemoryBlobStore::new(HandleStage::new(
            "http://relay.test",
            Duration::from_secs(60),
            Arc::new(clock.clone()),
        ));
        let config = CleanupConfig {
            interval_secs: 1,
            enabled: false,
        };

        let handle = spawn_cleanup_task(relay(&clock, &storage, &blobs), config);

        // Task should complete immediately when disabled
        tokio::time::timeout(Duration::from_millis(100), handle)
            .await
            .expect("Task should complete when disabled")
            .expect("Task should not panic");
    }
}
