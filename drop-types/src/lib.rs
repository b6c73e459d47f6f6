//! # drop-types
//!
//! Shared value types for codedrop ephemeral transfers.
//!
//! This crate provides the foundational types used across all codedrop crates:
//! - [`TransferCode`], [`TransferKind`], [`RecordKey`] - Short codes and their namespaces
//! - [`TransferRecord`], [`Payload`], [`BlobLocator`] - The write-once, read-once record
//! - [`Timestamp`] - Millisecond wall-clock instants used for expiry
//! - [`PhotoMime`], [`FetchHandle`] - Photo content types and time-boxed fetch handles
//! - [`TypeError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod code;
mod error;
mod record;
mod time;

pub use code::{RecordKey, TransferCode, TransferKind, MAX_CODE_LEN};
pub use error::TypeError;
pub use record::{BlobLocator, FetchHandle, Payload, PhotoMime, TransferRecord};
pub use time::Timestamp;
