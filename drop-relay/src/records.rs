//! The transfer record store.
//!
//! Allocates codes, writes records with their expiry, and hands each record
//! to exactly one reader. Sits on top of any [`RecordStorage`] backend.

use crate::error::{StorageError, TransferError, TransferResult};
use crate::storage::RecordStorage;
use drop_core::{Clock, CodeGenerator, TransferPolicy};
use drop_types::{Payload, RecordKey, Timestamp, TransferCode, TransferKind, TransferRecord};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// What a sender gets back: the code and when it stops working.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedCode {
    /// Code to share with the receiver
    pub code: TransferCode,
    /// Namespace the code belongs to
    pub kind: TransferKind,
    /// When the transfer expires
    pub expires_at: Timestamp,
}

impl From<&TransferRecord> for IssuedCode {
    fn from(record: &TransferRecord) -> Self {
        Self {
            code: record.code.clone(),
            kind: record.kind,
            expires_at: record.expires_at,
        }
    }
}

/// Keyed, TTL-expiring record store with exactly-once consumption.
#[derive(Debug)]
pub struct TransferRecords {
    storage: Arc<dyn RecordStorage>,
    clock: Arc<dyn Clock>,
    policy: TransferPolicy,
}

impl TransferRecords {
    /// Create a record store over a storage backend.
    pub fn new(
        storage: Arc<dyn RecordStorage>,
        clock: Arc<dyn Clock>,
        policy: TransferPolicy,
    ) -> Self {
        Self {
            storage,
            clock,
            policy,
        }
    }

    /// Limits in force.
    pub fn policy(&self) -> &TransferPolicy {
        &self.policy
    }

    /// Current time according to the store's clock.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Allocate a fresh code and insert a record under it.
    ///
    /// Each draw is inserted directly; a live collision surfaces as
    /// `AlreadyExists` and the next draw is tried, so the uniqueness check
    /// and the write are one atomic step.
    ///
    /// # Errors
    ///
    /// [`TransferError::GenerationFailed`] if every draw collides, with no
    /// record created.
    pub async fn put(
        &self,
        kind: TransferKind,
        payload: Payload,
        ttl: Duration,
    ) -> TransferResult<IssuedCode> {
        let length = self.policy.code_length(kind);
        let mut generator = CodeGenerator::new();
        let mut draws = generator.draws(length);

        for code in draws.by_ref() {
            let record = self.build(code, kind, payload.clone(), ttl);
            match self.storage.insert(record.clone(), record.created_at).await {
                Ok(()) => {
                    tracing::debug!("Stored {} record {}", kind, record.code);
                    return Ok(IssuedCode::from(&record));
                }
                Err(StorageError::AlreadyExists { key }) => {
                    tracing::trace!("Code collision on {}", key);
                }
                Err(e) => return Err(e.into()),
            }
        }

        let exhausted = draws.exhausted();
        tracing::warn!("Code space exhausted for {}: {}", kind, exhausted);
        Err(exhausted.into())
    }

    /// Pick a code that is not currently live, without writing anything.
    ///
    /// The reservation is advisory: nothing stops another writer from
    /// taking the code before [`TransferRecords::put_reserved`] runs, in
    /// which case that call fails with `AlreadyExists`. An abandoned
    /// reservation leaves no trace.
    pub async fn reserve(&self, kind: TransferKind) -> TransferResult<TransferCode> {
        let length = self.policy.code_length(kind);
        let now = self.now();
        let mut generator = CodeGenerator::new();
        let mut draws = generator.draws(length);

        for code in draws.by_ref() {
            let key = RecordKey::new(kind, code);
            if self.storage.find_if_live(&key, now).await?.is_none() {
                return Ok(key.code);
            }
        }

        let exhausted = draws.exhausted();
        tracing::warn!("Code space exhausted for {}: {}", kind, exhausted);
        Err(exhausted.into())
    }

    /// Write a record under a code obtained from [`TransferRecords::reserve`].
    pub async fn put_reserved(
        &self,
        code: TransferCode,
        kind: TransferKind,
        payload: Payload,
        ttl: Duration,
    ) -> Result<IssuedCode, StorageError> {
        let record = self.build(code, kind, payload, ttl);
        self.storage.insert(record.clone(), record.created_at).await?;
        tracing::debug!("Stored reserved {} record {}", kind, record.code);
        Ok(IssuedCode::from(&record))
    }

    /// Look up a live record without consuming it.
    pub async fn find_by_code(
        &self,
        kind: TransferKind,
        code: &TransferCode,
    ) -> Result<Option<TransferRecord>, StorageError> {
        let key = RecordKey::new(kind, code.clone());
        self.storage.find_if_live(&key, self.now()).await
    }

    /// Atomically consume a live record.
    ///
    /// # Errors
    ///
    /// [`TransferError::NotFound`] when the code was never issued, has
    /// expired, or was already consumed; the three are indistinguishable.
    pub async fn take_by_code(
        &self,
        kind: TransferKind,
        code: &TransferCode,
    ) -> TransferResult<TransferRecord> {
        self.take_live(kind, code).await?.ok_or(TransferError::NotFound)
    }

    /// Atomically remove whatever record holds the code, returning it if live.
    pub async fn take_live(
        &self,
        kind: TransferKind,
        code: &TransferCode,
    ) -> Result<Option<TransferRecord>, StorageError> {
        let key = RecordKey::new(kind, code.clone());
        let taken = self.storage.take_if_live(&key, self.now()).await?;
        if taken.is_some() {
            tracing::debug!("Consumed {} record {}", kind, code);
        }
        Ok(taken)
    }

    /// Put back a record that was taken by mistake.
    ///
    /// Fails with `AlreadyExists` if the code was reissued in the meantime.
    pub async fn restore(&self, record: TransferRecord) -> Result<(), StorageError> {
        self.storage.insert(record, self.now()).await
    }

    /// Remove a record regardless of liveness.
    pub async fn discard(
        &self,
        kind: TransferKind,
        code: &TransferCode,
    ) -> Result<bool, StorageError> {
        let key = RecordKey::new(kind, code.clone());
        self.storage.delete_if_present(&key).await
    }

    /// Remove every expired record and return them.
    pub async fn sweep_expired(&self) -> Result<Vec<TransferRecord>, StorageError> {
        self.storage.cleanup_expired(self.now()).await
    }

    /// Records live right now.
    pub async fn live_count(&self) -> Result<u64, StorageError> {
        self.storage.live_count(self.now()).await
    }

    fn build(
        &self,
        code: TransferCode,
        kind: TransferKind,
        payload: Payload,
        ttl: Duration,
    ) -> TransferRecord {
        let created_at = self.now();
        TransferRecord {
            code,
            kind,
            payload,
            created_at,
            expires_at: created_at.saturating_add(ttl),
        }
    }
}
