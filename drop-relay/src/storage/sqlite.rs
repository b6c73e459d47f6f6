//! SQLite storage backend for drop-relay.

use super::RecordStorage;
use crate::error::StorageError;
use async_trait::async_trait;
use drop_types::{
    BlobLocator, Payload, RecordKey, Timestamp, TransferCode, TransferKind, TransferRecord,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// SQLite-based record storage.
///
/// Uses WAL mode for concurrent reads/writes. Every mutation is a single
/// statement, so the insert-unless-live and take-if-live guarantees hold
/// across all processes sharing the database file, not just within one.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage from a database path.
    ///
    /// Creates the database file if it doesn't exist.
    pub async fn new(path: &Path) -> Result<Self, StorageError> {
        let path_str = path.to_str().ok_or_else(|| StorageError::InvalidPath {
            path: path.to_path_buf(),
        })?;
        let options = SqliteConnectOptions::from_str(path_str)
            .map_err(StorageError::Database)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        tracing::info!("SQLite record storage opened at {}", path.display());
        Ok(storage)
    }

    /// Create an in-memory SQLite storage (for testing).
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(StorageError::Database)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // Each connection to :memory: is its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transfers (
                kind TEXT NOT NULL,
                code TEXT NOT NULL,
                payload_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                PRIMARY KEY (kind, code)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Migration(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_transfers_expires ON transfers(expires_at)")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Migration(e.to_string()))?;

        Ok(())
    }
}

fn payload_columns(payload: &Payload) -> (&'static str, &str) {
    match payload {
        Payload::Text(text) => ("text", text.as_str()),
        Payload::Blob(locator) => ("blob", locator.as_str()),
    }
}

#[async_trait]
impl RecordStorage for SqliteStorage {
    async fn insert(&self, record: TransferRecord, now: Timestamp) -> Result<(), StorageError> {
        let (payload_type, payload) = payload_columns(&record.payload);

        // The conflict branch only fires when the occupant has expired, so a
        // live occupant leaves the row untouched and zero rows affected.
        let result = sqlx::query(
            r#"
            INSERT INTO transfers (kind, code, payload_type, payload, created_at, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(kind, code) DO UPDATE SET
                payload_type = excluded.payload_type,
                payload = excluded.payload,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at
            WHERE transfers.expires_at <= ?7
            "#,
        )
        .bind(record.kind.as_str())
        .bind(record.code.as_str())
        .bind(payload_type)
        .bind(payload)
        .bind(record.created_at.as_millis())
        .bind(record.expires_at.as_millis())
        .bind(now.as_millis())
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::AlreadyExists { key: record.key() });
        }
        Ok(())
    }

    async fn find_if_live(
        &self,
        key: &RecordKey,
        now: Timestamp,
    ) -> Result<Option<TransferRecord>, StorageError> {
        let row = sqlx::query_as::<_, TransferRow>(
            r#"
            SELECT kind, code, payload_type, payload, created_at, expires_at
            FROM transfers
            WHERE kind = ?1 AND code = ?2 AND expires_at > ?3
            "#,
        )
        .bind(key.kind.as_str())
        .bind(key.code.as_str())
        .bind(now.as_millis())
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        row.map(TransferRecord::try_from).transpose()
    }

    async fn delete_if_present(&self, key: &RecordKey) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM transfers WHERE kind = ?1 AND code = ?2")
            .bind(key.kind.as_str())
            .bind(key.code.as_str())
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn take_if_live(
        &self,
        key: &RecordKey,
        now: Timestamp,
    ) -> Result<Option<TransferRecord>, StorageError> {
        // One statement: the row is gone for everyone once a caller sees it.
        let row = sqlx::query_as::<_, TransferRow>(
            r#"
            DELETE FROM transfers
            WHERE kind = ?1 AND code = ?2
            RETURNING kind, code, payload_type, payload, created_at, expires_at
            "#,
        )
        .bind(key.kind.as_str())
        .bind(key.code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        match row {
            Some(row) => {
                let record = TransferRecord::try_from(row)?;
                Ok(record.is_live(now).then_some(record))
            }
            None => Ok(None),
        }
    }

    async fn cleanup_expired(&self, now: Timestamp) -> Result<Vec<TransferRecord>, StorageError> {
        let rows = sqlx::query_as::<_, TransferRow>(
            r#"
            DELETE FROM transfers
            WHERE expires_at <= ?1
            RETURNING kind, code, payload_type, payload, created_at, expires_at
            "#,
        )
        .bind(now.as_millis())
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        rows.into_iter().map(TransferRecord::try_from).collect()
    }

    async fn live_count(&self, now: Timestamp) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transfers WHERE expires_at > ?1")
            .bind(now.as_millis())
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(count as u64)
    }
}

/// Internal row type for SQLite queries.
#[derive(sqlx::FromRow)]
struct TransferRow {
    kind: String,
    code: String,
    payload_type: String,
    payload: String,
    created_at: i64,
    expires_at: i64,
}

impl TryFrom<TransferRow> for TransferRecord {
    type Error = StorageError;

    fn try_from(row: TransferRow) -> Result<Self, Self::Error> {
        let kind = row
            .kind
            .parse::<TransferKind>()
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        let code = TransferCode::parse(&row.code)
            .map_err(|e| StorageError::Corrupt(format!("{}: {e}", row.code)))?;
        let payload = match row.payload_type.as_str() {
            "text" => Payload::Text(row.payload),
            "blob" => Payload::Blob(
                BlobLocator::new(row.payload).map_err(|e| StorageError::Corrupt(e.to_string()))?,
            ),
            other => {
                return Err(StorageError::Corrupt(format!(
                    "unknown payload type {other} for {code}"
                )))
            }
        };

        Ok(TransferRecord {
            code,
            kind,
            payload,
            created_at: Timestamp::from_millis(row.created_at),
            expires_at: Timestamp::from_millis(row.expires_at),
        })
    }
}
