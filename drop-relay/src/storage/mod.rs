//! Storage layer for drop-relay.
//!
//! Provides the keyed, TTL-expiring record map behind every transfer. Two
//! backends implement [`RecordStorage`]: a sharded in-process map and
//! SQLite. Code generation, atomic take, and the photo commit protocol sit
//! above this trait and behave identically on either backend.

mod memory;
mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use crate::error::StorageError;
use async_trait::async_trait;
use drop_types::{RecordKey, Timestamp, TransferRecord};

/// Trait for transfer record storage backends.
///
/// Every method that decides liveness takes `now` explicitly; a record with
/// `expires_at <= now` is treated as absent even if it is still physically
/// present.
#[async_trait]
pub trait RecordStorage: Send + Sync + std::fmt::Debug {
    /// Insert a record under its key.
    ///
    /// Fails with [`StorageError::AlreadyExists`] if a *live* record holds
    /// the key at `now`. An expired occupant is replaced.
    async fn insert(&self, record: TransferRecord, now: Timestamp) -> Result<(), StorageError>;

    /// Look up a record without removing it.
    async fn find_if_live(
        &self,
        key: &RecordKey,
        now: Timestamp,
    ) -> Result<Option<TransferRecord>, StorageError>;

    /// Remove a record whether or not it is live.
    ///
    /// Returns `true` if something was removed.
    async fn delete_if_present(&self, key: &RecordKey) -> Result<bool, StorageError>;

    /// Atomically remove a record and return it if it was live.
    ///
    /// An expired record is removed too but reported as absent. For any
    /// key, at most one concurrent caller receives the record.
    async fn take_if_live(
        &self,
        key: &RecordKey,
        now: Timestamp,
    ) -> Result<Option<TransferRecord>, StorageError>;

    /// Remove every record expired at `now`.
    ///
    /// Returns the removed records so callers can reclaim their blobs.
    async fn cleanup_expired(&self, now: Timestamp) -> Result<Vec<TransferRecord>, StorageError>;

    /// Count records live at `now`.
    async fn live_count(&self, now: Timestamp) -> Result<u64, StorageError>;
}
