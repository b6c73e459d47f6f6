//! Transfer codes and the namespaces they live in.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypeError;

/// Longest code accepted by [`TransferCode::parse`].
///
/// Issued codes are far shorter; this only bounds what a caller may type.
pub const MAX_CODE_LEN: usize = 16;

/// A short, human-typeable code identifying one live transfer.
///
/// Always stored uppercase. Unique among *live* records of its
/// [`TransferKind`] only; codes are recycled after expiry or consumption.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransferCode(String);

impl TransferCode {
    /// Normalize user input into a code.
    ///
    /// Surrounding whitespace is trimmed and letters are uppercased, so
    /// `" abcd "` and `"ABCD"` name the same transfer.
    pub fn parse(input: &str) -> Result<Self, TypeError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(TypeError::InvalidCode("code is empty".into()));
        }
        if trimmed.chars().count() > MAX_CODE_LEN {
            return Err(TypeError::InvalidCode(format!(
                "code longer than {MAX_CODE_LEN} characters"
            )));
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(TypeError::InvalidCode(
                "code may only contain letters A-Z".into(),
            ));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Build a code from letters already known to be uppercase A-Z.
    ///
    /// Used by the generator, which draws from the uppercase alphabet.
    pub fn from_letters(letters: &[u8]) -> Result<Self, TypeError> {
        let s = std::str::from_utf8(letters)
            .map_err(|_| TypeError::InvalidCode("code is not ASCII".into()))?;
        if s.is_empty() || s.len() > MAX_CODE_LEN || !s.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(TypeError::InvalidCode(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// The code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of letters in the code.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; a parsed code has at least one letter.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for TransferCode {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TransferCode {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TransferCode> for String {
    fn from(code: TransferCode) -> Self {
        code.0
    }
}

impl fmt::Display for TransferCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TransferCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransferCode({})", self.0)
    }
}

/// What a transfer carries. Each kind is its own code namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    /// Literal text held in the record itself
    Text,
    /// A photo held in the blob store, referenced by locator
    Photo,
}

impl TransferKind {
    /// Lowercase name, as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferKind::Text => "text",
            TransferKind::Photo => "photo",
        }
    }
}

impl FromStr for TransferKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(TransferKind::Text),
            "photo" => Ok(TransferKind::Photo),
            other => Err(TypeError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persistence key: a code within its kind's namespace.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    /// Namespace
    pub kind: TransferKind,
    /// Code within the namespace
    pub code: TransferCode,
}

impl RecordKey {
    /// Create a key.
    pub fn new(kind: TransferKind, code: TransferCode) -> Self {
        Self { kind, code }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.code)
    }
}

impl fmt::Debug for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordKey({}/{})", self.kind, self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_case_and_whitespace() {
        let code = TransferCode::parse("  abCd\n").unwrap();
        assert_eq!(code.as_str(), "ABCD");
        assert_eq!(code.len(), 4);
    }

    #[test]
    fn parse_rejects_empty() {
        assert!(TransferCode::parse("").is_err());
        assert!(TransferCode::parse("   ").is_err());
    }

    #[test]
    fn parse_rejects_digits_and_symbols() {
        assert!(TransferCode::parse("AB1D").is_err());
        assert!(TransferCode::parse("AB-D").is_err());
        assert!(TransferCode::parse("ÄBCD").is_err());
    }

    #[test]
    fn parse_rejects_overlong() {
        let long = "A".repeat(MAX_CODE_LEN + 1);
        assert!(TransferCode::parse(&long).is_err());
        assert!(TransferCode::parse(&"A".repeat(MAX_CODE_LEN)).is_ok());
    }

    #[test]
    fn from_letters_requires_uppercase() {
        assert!(TransferCode::from_letters(b"QWER").is_ok());
        assert!(TransferCode::from_letters(b"qwer").is_err());
        assert!(TransferCode::from_letters(b"").is_err());
    }

    #[test]
    fn serde_goes_through_parse() {
        let code: TransferCode = serde_json::from_str("\"xyzw\"").unwrap();
        assert_eq!(code.as_str(), "XYZW");
        assert!(serde_json::from_str::<TransferCode>("\"12\"").is_err());
    }

    #[test]
    fn kind_roundtrips_through_str() {
        for kind in [TransferKind::Text, TransferKind::Photo] {
            assert_eq!(kind.as_str().parse::<TransferKind>().unwrap(), kind);
        }
        assert!("video".parse::<TransferKind>().is_err());
    }

    #[test]
    fn keys_in_different_namespaces_differ() {
        let code = TransferCode::parse("ABCDE").unwrap();
        let text = RecordKey::new(TransferKind::Text, code.clone());
        let photo = RecordKey::new(TransferKind::Photo, code);
        assert_ne!(text, photo);
        assert_eq!(photo.to_string(), "photo/ABCDE");
    }
}
