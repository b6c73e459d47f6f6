//! Main DropRelay server coordination.
//!
//! DropRelay owns the transfer service, the rate limiters, and the
//! configuration they were built from.

use crate::blob::{BlobStore, FsBlobStore, HandleStage, MemoryBlobStore};
use crate::config::{BlobBackend, Config, StorageBackend};
use crate::coordinator::BlobTimeouts;
use crate::error::Result;
use crate::limits::RateLimits;
use crate::service::{TransferMetrics, TransferService};
use crate::storage::{MemoryStorage, RecordStorage, SqliteStorage};
use drop_core::{Clock, SystemClock, TransferPolicy};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main relay server.
#[derive(Debug)]
pub struct DropRelay {
    config: Config,
    service: TransferService,
    /// Rate limiters for sends, receives, and overall load.
    rate_limits: RateLimits,
    started_at: Instant,
}

impl DropRelay {
    /// Create a relay around an already-built service.
    pub fn new(config: Config, service: TransferService) -> Self {
        let rate_limits = RateLimits::new(&config.limits);
        Self {
            config,
            service,
            rate_limits,
            started_at: Instant::now(),
        }
    }

    /// Build the storage and blob backends named in `config` and wrap them
    /// in a relay.
    ///
    /// # Errors
    ///
    /// Returns an error if the database or blob root cannot be opened.
    pub async fn from_config(config: Config) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let storage: Arc<dyn RecordStorage> = match config.storage.backend {
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory record storage; transfers are lost on restart");
                Arc::new(MemoryStorage::new())
            }
            StorageBackend::Sqlite => Arc::new(SqliteStorage::new(&config.storage.database).await?),
        };

        let handles = HandleStage::new(
            config.server.public_url.clone(),
            config.blobs.handle_ttl(),
            Arc::clone(&clock),
        );
        let blobs: Arc<dyn BlobStore> = match config.blobs.backend {
            BlobBackend::Memory => Arc::new(MemoryBlobStore::new(handles)),
            BlobBackend::Fs => Arc::new(FsBlobStore::new(&config.blobs.root, handles).await?),
        };

        let timeouts = BlobTimeouts {
            upload: Duration::from_secs(config.blobs.upload_timeout_secs),
            resolve: Duration::from_secs(config.blobs.resolve_timeout_secs),
        };
        let service =
            TransferService::new(storage, blobs, clock, TransferPolicy::default(), timeouts);

        Ok(Self::new(config, service))
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the transfer service.
    pub fn service(&self) -> &TransferService {
        &self.service
    }

    /// Get access to the rate limiters.
    pub fn rate_limits(&self) -> &RateLimits {
        &self.rate_limits
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &TransferMetrics {
        self.service.metrics()
    }

    /// Time since the relay was created.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
