//! Entity tags for normalized response bodies.
//!
//! Every string or JSON body produced by a route method carries a strong
//! `etag` computed from the serialized bytes, so identical bodies always
//! produce identical tags within a build.
//!
//! ```
//! use girder_core::etag::ETag;
//!
//! let tag = ETag::from_bytes(br#"[{"id":"1","content":"Hello"}]"#);
//! assert!(tag.to_header_value().starts_with('"'));
//! ```

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A strong HTTP entity tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ETag {
    value: String,
}

impl ETag {
    /// Byte-for-byte identity tag (`"abc123"`).
    pub fn strong(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Strong tag from a hash of `data`.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = DefaultHasher::new();
        data.hash(&mut hasher);
        Self::strong(format!("{:x}", hasher.finish()))
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn to_header_value(&self) -> String {
        format!("\"{}\"", self.value)
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_header_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_value() {
        assert_eq!(ETag::strong("abc").to_header_value(), "\"abc\"");
        assert_eq!(ETag::strong("abc").to_string(), "\"abc\"");
    }

    #[test]
    fn test_from_bytes_deterministic() {
        assert_eq!(ETag::from_bytes(b"hello"), ETag::from_bytes(b"hello"));
        assert_ne!(ETag::from_bytes(b"hello"), ETag::from_bytes(b"hello!"));
        assert!(ETag::from_bytes(b"hello").value().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
