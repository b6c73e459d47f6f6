//! # codedrop-relay
//!
//! Ephemeral code-keyed transfer relay.
//!
//! A sender posts a text or a photo and gets back a short uppercase code.
//! A receiver redeems the code once within five minutes; after that, or
//! after expiry, the code resolves to nothing.
//!
//! ## Architecture
//!
//! ```text
//!  sender ──POST /api/text──┐          ┌──POST /api/text/receive── receiver
//!                           ▼          ▼
//!                    ┌───────────────────────┐
//!                    │    TransferService    │
//!                    │  ┌─────────────────┐  │
//!                    │  │ TransferRecords │──┼──► RecordStorage (memory|SQLite)
//!                    │  └─────────────────┘  │
//!                    │  ┌─────────────────┐  │
//!                    │  │ BlobCoordinator │──┼──► BlobStore (memory|fs)
//!                    │  └─────────────────┘  │
//!                    └───────────────────────┘
//! ```
//!
//! Text payloads live in the record itself. Photo payloads live in the blob
//! store; the record holds a locator, and the coordinator keeps the two
//! consistent through upload, claim, and failure.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod blob;
pub mod cleanup;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod http;
pub mod limits;
pub mod records;
pub mod server;
pub mod service;
pub mod storage;

pub use config::Config;
pub use error::{RelayError, TransferError};
pub use server::DropRelay;
pub use service::TransferService;
