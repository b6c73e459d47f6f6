//! Fixed limits governing every transfer.

use codedrop_types::TransferKind;
use std::time::Duration;

/// How long a record stays retrievable (5 minutes).
pub const TRANSFER_TTL: Duration = Duration::from_secs(5 * 60);

/// Letters in a text transfer code.
pub const TEXT_CODE_LENGTH: usize = 4;

/// Letters in a photo transfer code.
pub const PHOTO_CODE_LENGTH: usize = 5;

/// Longest text accepted, in Unicode scalar values.
pub const MAX_TEXT_CHARS: usize = 10_000;

/// Largest photo accepted (10 MiB).
pub const MAX_PHOTO_BYTES: u64 = 10 * 1024 * 1024;

/// Limits applied by the transfer service.
///
/// `Default` gives the production values. These are observable behavior
/// and are deliberately not part of the relay's configuration file; tests
/// build narrower policies (e.g. one-letter codes) to reach edge cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPolicy {
    /// Record lifetime
    pub ttl: Duration,
    /// Code length in the text namespace
    pub text_code_length: usize,
    /// Code length in the photo namespace
    pub photo_code_length: usize,
    /// Text limit in characters
    pub max_text_chars: usize,
    /// Photo limit in bytes
    pub max_photo_bytes: u64,
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self {
            ttl: TRANSFER_TTL,
            text_code_length: TEXT_CODE_LENGTH,
            photo_code_length: PHOTO_CODE_LENGTH,
            max_text_chars: MAX_TEXT_CHARS,
            max_photo_bytes: MAX_PHOTO_BYTES,
        }
    }
}

impl TransferPolicy {
    /// Code length for a namespace.
    pub fn code_length(&self, kind: TransferKind) -> usize {
        match kind {
            TransferKind::Text => self.text_code_length,
            TransferKind::Photo => self.photo_code_length,
        }
    }
}
