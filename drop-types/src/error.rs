//! Error types for codedrop value types.

use thiserror::Error;

/// Errors raised while constructing codedrop value types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    /// Code is empty, too long, or contains something other than ASCII letters
    #[error("invalid transfer code: {0}")]
    InvalidCode(String),

    /// Unknown transfer kind discriminator
    #[error("unknown transfer kind: {0}")]
    UnknownKind(String),

    /// MIME type outside the photo allow-list
    #[error("unsupported photo type: {0}")]
    UnsupportedMime(String),

    /// Blob locator is empty or escapes its namespace
    #[error("invalid blob locator: {0}")]
    InvalidLocator(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = TypeError::UnsupportedMime("text/plain".into());
        assert_eq!(err.to_string(), "unsupported photo type: text/plain");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TypeError>();
    }
}
