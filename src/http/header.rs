//! A single HTTP header field.
//!
//! # Design Decisions
//! - The name keeps the exact case it was received (or built) with
//! - Identity is case-insensitive: `Content-Type` and `content-type` are the same header
//! - Values are raw bytes so obs-text survives a round trip untouched
//! - Immutable: filters build new headers instead of editing existing ones

use std::fmt;

/// An ordered name/value pair from a header block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Header {
    name: String,
    value: Vec<u8>,
}

impl Header {
    /// Create a header from a name and a raw value.
    pub fn new(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// The name exactly as received.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw value bytes.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// The value as text, if it is valid UTF-8.
    pub fn value_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }

    /// Lowercased name, used for identity comparisons.
    pub fn normalized_name(&self) -> String {
        self.name.to_ascii_lowercase()
    }

    /// True if both headers share a normalized name. Values are not compared.
    pub fn is_same_header(&self, other: &Header) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
    }

    /// True if this header's name matches `name`, ignoring case.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// A new header with the same value under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: self.value.clone(),
        }
    }

    /// Wire form without the line terminator: `<name>: <value>`.
    ///
    /// No escaping is performed; a value containing CR or LF produces a broken
    /// header block.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.name.len() + 2 + self.value.len());
        self.write_to(&mut out);
        out
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(&self.value);
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, String::from_utf8_lossy(&self.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_name_is_lowercase() {
        let header = Header::new("Content-Type", "text/HTML");
        assert_eq!(header.normalized_name(), "content-type");
        assert_eq!(header.value(), b"text/HTML");
    }

    #[test]
    fn same_header_ignores_case_and_value() {
        let a = Header::new("X-Trace", "1");
        let b = Header::new("x-TRACE", "2");
        let c = Header::new("X-Traces", "1");
        assert!(a.is_same_header(&b));
        assert!(!a.is_same_header(&c));
    }

    #[test]
    fn serialize_keeps_original_case() {
        let header = Header::new("cOnTeNt-LeNgTh", "5");
        assert_eq!(header.serialize(), b"cOnTeNt-LeNgTh: 5");
    }

    #[test]
    fn serialize_keeps_non_utf8_value() {
        let header = Header::new("X-Raw", vec![0xE9, b'a']);
        assert_eq!(header.serialize(), b"X-Raw: \xE9a");
        assert!(header.value_str().is_none());
    }

    #[test]
    fn renamed_keeps_value() {
        let header = Header::new("Date", "X");
        let renamed = header.renamed("dAtE");
        assert_eq!(renamed.name(), "dAtE");
        assert_eq!(renamed.value(), b"X");
        assert!(renamed.is_same_header(&header));
    }
}
