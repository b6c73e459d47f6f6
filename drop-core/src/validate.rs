//! Input validation.
//!
//! Everything here runs before a store or blob backend is touched, so a
//! rejected request never leaves a trace.

use crate::TransferPolicy;
use codedrop_types::{PhotoMime, TransferCode, TransferKind};

/// Caller-supplied input violates a size, type, or length constraint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Text is empty.
    #[error("text cannot be empty")]
    EmptyText,

    /// Text exceeds the character limit.
    #[error("text cannot exceed {max} characters (got {actual})")]
    TextTooLong {
        /// Characters submitted
        actual: usize,
        /// Limit
        max: usize,
    },

    /// Photo has no bytes.
    #[error("photo is empty")]
    EmptyPhoto,

    /// Photo exceeds the byte limit.
    #[error("photo exceeds the {max} byte limit (got {actual} bytes)")]
    PhotoTooLarge {
        /// Size declared or received
        actual: u64,
        /// Limit
        max: u64,
    },

    /// Declared size disagrees with the bytes received.
    #[error("declared size {declared} does not match {actual} bytes received")]
    SizeMismatch {
        /// Size the caller declared
        declared: u64,
        /// Bytes actually received
        actual: u64,
    },

    /// MIME type outside PNG, JPEG, WebP.
    #[error("unsupported photo type {0:?}; use PNG, JPEG, or WebP")]
    UnsupportedType(String),

    /// Code is malformed.
    #[error("{0}")]
    InvalidCode(String),

    /// Code has the wrong number of letters for its namespace.
    #[error("code must be {expected} letters")]
    CodeLength {
        /// Letters a code in this namespace has
        expected: usize,
    },
}

/// Check text against the character limit.
///
/// Length is counted in Unicode scalar values, not bytes.
pub fn validate_text(text: &str, policy: &TransferPolicy) -> Result<(), ValidationError> {
    if text.is_empty() {
        return Err(ValidationError::EmptyText);
    }
    let actual = text.chars().count();
    if actual > policy.max_text_chars {
        return Err(ValidationError::TextTooLong {
            actual,
            max: policy.max_text_chars,
        });
    }
    Ok(())
}

/// Check a photo upload and return its parsed content type.
///
/// Checks run cheapest first: declared size, then type, then agreement
/// between the declared and received sizes.
pub fn validate_photo(
    received: usize,
    declared_size: u64,
    mime_type: &str,
    policy: &TransferPolicy,
) -> Result<PhotoMime, ValidationError> {
    let received = received as u64;
    let largest = declared_size.max(received);
    if largest > policy.max_photo_bytes {
        return Err(ValidationError::PhotoTooLarge {
            actual: largest,
            max: policy.max_photo_bytes,
        });
    }
    let mime = PhotoMime::from_mime_type(mime_type)
        .map_err(|_| ValidationError::UnsupportedType(mime_type.to_string()))?;
    if received == 0 {
        return Err(ValidationError::EmptyPhoto);
    }
    if declared_size != received {
        return Err(ValidationError::SizeMismatch {
            declared: declared_size,
            actual: received,
        });
    }
    Ok(mime)
}

/// Normalize a typed-in code and check its length for the namespace.
pub fn validate_code(
    input: &str,
    kind: TransferKind,
    policy: &TransferPolicy,
) -> Result<TransferCode, ValidationError> {
    let code =
        TransferCode::parse(input).map_err(|e| ValidationError::InvalidCode(e.to_string()))?;
    let expected = policy.code_length(kind);
    if code.len() != expected {
        return Err(ValidationError::CodeLength { expected });
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> TransferPolicy {
        TransferPolicy::default()
    }

    #[test]
    fn text_bounds() {
        assert_eq!(validate_text("", &policy()), Err(ValidationError::EmptyText));
        assert!(validate_text("x", &policy()).is_ok());
        assert!(validate_text(&"a".repeat(10_000), &policy()).is_ok());
        assert_eq!(
            validate_text(&"a".repeat(10_001), &policy()),
            Err(ValidationError::TextTooLong {
                actual: 10_001,
                max: 10_000
            })
        );
    }

    #[test]
    fn text_counts_characters_not_bytes() {
        // 10,000 four-byte characters are still 10,000 characters
        let emoji = "\u{1F600}".repeat(10_000);
        assert!(emoji.len() > 10_000);
        assert!(validate_text(&emoji, &policy()).is_ok());
    }

    #[test]
    fn photo_accepts_allowed_types() {
        assert_eq!(validate_photo(10, 10, "image/png", &policy()), Ok(PhotoMime::Png));
        assert_eq!(validate_photo(10, 10, "image/jpeg", &policy()), Ok(PhotoMime::Jpeg));
        assert_eq!(validate_photo(10, 10, "image/webp", &policy()), Ok(PhotoMime::Webp));
    }

    #[test]
    fn photo_rejects_oversize() {
        let fifteen_mb = 15 * 1024 * 1024;
        assert!(matches!(
            validate_photo(fifteen_mb, fifteen_mb as u64, "image/png", &policy()),
            Err(ValidationError::PhotoTooLarge { .. })
        ));
        // A small body cannot hide behind an honest-looking declared size
        assert!(matches!(
            validate_photo(fifteen_mb, 10, "image/png", &policy()),
            Err(ValidationError::PhotoTooLarge { .. })
        ));
    }

    #[test]
    fn photo_limit_is_inclusive() {
        let max = crate::MAX_PHOTO_BYTES;
        assert!(validate_photo(max as usize, max, "image/jpeg", &policy()).is_ok());
    }

    #[test]
    fn photo_rejects_other_types() {
        assert_eq!(
            validate_photo(10, 10, "text/plain", &policy()),
            Err(ValidationError::UnsupportedType("text/plain".into()))
        );
        assert!(validate_photo(10, 10, "image/gif", &policy()).is_err());
    }

    #[test]
    fn photo_rejects_empty_and_mismatched() {
        assert_eq!(
            validate_photo(0, 0, "image/png", &policy()),
            Err(ValidationError::EmptyPhoto)
        );
        assert_eq!(
            validate_photo(10, 12, "image/png", &policy()),
            Err(ValidationError::SizeMismatch {
                declared: 12,
                actual: 10
            })
        );
    }

    #[test]
    fn code_is_normalized() {
        let code = validate_code(" abcd ", TransferKind::Text, &policy()).unwrap();
        assert_eq!(code.as_str(), "ABCD");
    }

    #[test]
    fn code_length_is_per_namespace() {
        assert!(validate_code("ABCDE", TransferKind::Photo, &policy()).is_ok());
        assert_eq!(
            validate_code("ABCDE", TransferKind::Text, &policy()),
            Err(ValidationError::CodeLength { expected: 4 })
        );
        assert_eq!(
            validate_code("ABCD", TransferKind::Photo, &policy()),
            Err(ValidationError::CodeLength { expected: 5 })
        );
    }

    #[test]
    fn malformed_code_rejected() {
        assert!(matches!(
            validate_code("AB1D", TransferKind::Text, &policy()),
            Err(ValidationError::InvalidCode(_))
        ));
    }
}
