//! Error types for drop-relay.

use drop_core::{ExhaustedError, ValidationError};
use drop_types::RecordKey;
use std::path::PathBuf;

/// Main error type for relay startup and background operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Blob store error.
    #[error("blob store error: {0}")]
    Blob(#[from] BlobError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Record storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A live record already holds this key.
    #[error("a live record already exists for {key}")]
    AlreadyExists {
        /// The contested key.
        key: RecordKey,
    },

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Database path error.
    #[error("invalid database path: {path}")]
    InvalidPath {
        /// The invalid path.
        path: PathBuf,
    },
}

/// Blob store errors.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// No blob at this locator.
    #[error("blob not found: {locator}")]
    NotFound {
        /// The missing locator.
        locator: String,
    },

    /// Locator is malformed or escapes the store root.
    #[error("invalid blob locator: {locator}")]
    InvalidLocator {
        /// The rejected locator.
        locator: String,
    },

    /// Filesystem error.
    #[error("blob I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-specific failure.
    #[error("blob backend error: {0}")]
    Backend(String),

    /// Operation exceeded its time budget.
    #[error("blob {operation} timed out after {secs}s")]
    Timeout {
        /// Which operation timed out.
        operation: &'static str,
        /// The budget that was exceeded.
        secs: u64,
    },
}

/// Errors surfaced by the transfer service to its callers.
///
/// `NotFound` deliberately does not say whether the code never existed,
/// expired, or was already used.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Input rejected before any store interaction.
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// Every code draw collided with a live code. Safe to retry.
    #[error("could not allocate a transfer code: {0}")]
    GenerationFailed(#[from] ExhaustedError),

    /// Code absent, expired, or already consumed.
    #[error("code not found or expired")]
    NotFound,

    /// Metadata found but the photo could not be resolved.
    #[error("photo is no longer available: {0}")]
    PhotoUnavailable(#[source] BlobError),

    /// Blob upload failed; nothing was registered.
    #[error("photo upload failed: {0}")]
    UploadFailed(#[source] BlobError),

    /// Metadata write failed after upload; the blob was rolled back.
    #[error("photo registration failed: {0}")]
    RegistrationFailed(#[source] StorageError),

    /// Backing store failure outside the photo commit path.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Result type alias for blob operations.
pub type BlobResult<T> = std::result::Result<T, BlobError>;

/// Result type alias for transfer operations.
pub type TransferResult<T> = std::result::Result<T, TransferError>;
