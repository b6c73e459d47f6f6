//! Transfer records and the payloads they describe.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{RecordKey, Timestamp, TransferCode, TransferKind, TypeError};

/// Opaque locator for a blob, sufficient to fetch and later delete it.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobLocator(String);

impl BlobLocator {
    /// Wrap an existing locator string.
    pub fn new(locator: impl Into<String>) -> Result<Self, TypeError> {
        let locator = locator.into();
        if locator.is_empty() {
            return Err(TypeError::InvalidLocator("locator is empty".into()));
        }
        Ok(Self(locator))
    }

    /// Fresh locator for a photo registered under `code`.
    ///
    /// The random component keeps an abandoned upload for a recycled code
    /// from aliasing a later upload under the same code.
    pub fn for_photo(code: &TransferCode, mime: PhotoMime) -> Self {
        Self(format!(
            "photos/{}/{}.{}",
            code,
            uuid::Uuid::new_v4().simple(),
            mime.extension()
        ))
    }

    /// The locator as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The code a photo locator was issued for, if it has the photo layout.
    pub fn photo_code(&self) -> Option<TransferCode> {
        let mut parts = self.0.split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("photos"), Some(code), Some(file), None) if !file.is_empty() => {
                TransferCode::from_letters(code.as_bytes()).ok()
            }
            _ => None,
        }
    }
}

impl fmt::Display for BlobLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for BlobLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobLocator({})", self.0)
    }
}

/// What a record carries.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Payload {
    /// Literal text content
    Text(String),
    /// Reference to a blob in the blob store
    Blob(BlobLocator),
}

// Payload text is user content; keep it out of logs.
impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text(text) => write!(f, "Text({} chars)", text.chars().count()),
            Payload::Blob(locator) => write!(f, "Blob({})", locator),
        }
    }
}

/// A write-once, read-once transfer record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Code the receiver types in
    pub code: TransferCode,
    /// Namespace the code lives in
    pub kind: TransferKind,
    /// Text content or blob reference
    pub payload: Payload,
    /// When the sender created the record
    pub created_at: Timestamp,
    /// First instant at which the record is no longer visible
    pub expires_at: Timestamp,
}

impl TransferRecord {
    /// Whether a reader at `now` may observe this record.
    pub fn is_live(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }

    /// Persistence key for this record.
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.kind, self.code.clone())
    }

    /// Blob locator, for photo records.
    pub fn blob_locator(&self) -> Option<&BlobLocator> {
        match &self.payload {
            Payload::Blob(locator) => Some(locator),
            Payload::Text(_) => None,
        }
    }
}

/// Accepted photo content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoMime {
    /// image/png
    Png,
    /// image/jpeg
    Jpeg,
    /// image/webp
    Webp,
}

impl PhotoMime {
    /// Parse a MIME type, ignoring case and any `;` parameters.
    pub fn from_mime_type(mime: &str) -> Result<Self, TypeError> {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "image/png" => Ok(PhotoMime::Png),
            "image/jpeg" | "image/jpg" => Ok(PhotoMime::Jpeg),
            "image/webp" => Ok(PhotoMime::Webp),
            _ => Err(TypeError::UnsupportedMime(mime.to_string())),
        }
    }

    /// Canonical MIME type string.
    pub fn as_mime_type(&self) -> &'static str {
        match self {
            PhotoMime::Png => "image/png",
            PhotoMime::Jpeg => "image/jpeg",
            PhotoMime::Webp => "image/webp",
        }
    }

    /// File extension used in blob locators.
    pub fn extension(&self) -> &'static str {
        match self {
            PhotoMime::Png => "png",
            PhotoMime::Jpeg => "jpg",
            PhotoMime::Webp => "webp",
        }
    }
}

impl fmt::Display for PhotoMime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_mime_type())
    }
}

/// Time-boxed handle for fetching a received photo.
///
/// Stays valid until `expires_at` even though the underlying blob has
/// already been deleted from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchHandle {
    /// Opaque one-shot token
    pub token: String,
    /// URL the consumer fetches the bytes from
    pub url: String,
    /// Content type of the photo
    pub content_type: String,
    /// When the handle stops working
    pub expires_at: Timestamp,
}
