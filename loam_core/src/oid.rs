//! Object ids: BLAKE3 digests over an object's kind, length and content.

use crate::error::{Error, Result};
use crate::object::ObjectKind;
use serde::{Serialize, Serializer};
use std::fmt;

/// Object id size in bytes (BLAKE3 produces 256-bit digests).
pub const OID_SIZE: usize = 32;

/// Supported hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// BLAKE3 with 256-bit output.
    Blake3,
}

impl Algorithm {
    /// Returns the string representation of the algorithm (for config files).
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Blake3 => "blake3-256",
        }
    }

    /// Parse algorithm from string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "blake3-256" => Ok(Algorithm::Blake3),
            _ => Err(Error::unsupported_algorithm(s)),
        }
    }

    /// Returns the algorithm ID byte (for object headers).
    pub fn id(&self) -> u8 {
        match self {
            Algorithm::Blake3 => 1,
        }
    }

    /// Parse algorithm from ID byte.
    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            1 => Ok(Algorithm::Blake3),
            _ => Err(Error::unsupported_algorithm(format!("ID {}", id))),
        }
    }
}

/// A content id: the 32-byte digest identifying an object.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; OID_SIZE]);

impl ObjectId {
    /// Create an ObjectId from raw bytes.
    pub fn from_bytes(bytes: [u8; OID_SIZE]) -> Self {
        ObjectId(bytes)
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        if hex_str.len() != OID_SIZE * 2 {
            return Err(Error::invalid_oid(format!(
                "Expected {} hex characters, got {}",
                OID_SIZE * 2,
                hex_str.len()
            )));
        }

        let bytes =
            hex::decode(hex_str).map_err(|e| Error::invalid_oid(format!("Invalid hex: {}", e)))?;

        let mut id = [0u8; OID_SIZE];
        id.copy_from_slice(&bytes);
        Ok(ObjectId(id))
    }

    /// Convert to hex string (64 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 2 hex characters, used as the loose-object fan-out directory.
    pub fn prefix(&self) -> String {
        hex::encode(&self.0[..1])
    }

    /// Remaining 62 hex characters, used as the loose-object file name.
    pub fn suffix(&self) -> String {
        hex::encode(&self.0[1..])
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; OID_SIZE] {
        &self.0
    }

    /// Compute the id an object of `kind` holding `content` would get.
    pub fn for_content(kind: ObjectKind, content: &[u8]) -> Self {
        let mut hasher = ObjectHasher::new(kind, content.len() as u64);
        hasher.update(content);
        hasher.finalize()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Incremental id computation.
///
/// The digest covers `"<kind> <len>\0"` followed by the content, so the same
/// bytes stored as different kinds never share an id.
pub(crate) struct ObjectHasher {
    inner: blake3::Hasher,
}

impl ObjectHasher {
    pub(crate) fn new(kind: ObjectKind, len: u64) -> Self {
        let mut inner = blake3::Hasher::new();
        inner.update(format!("{} {}\0", kind.as_str(), len).as_bytes());
        Self { inner }
    }

    pub(crate) fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub(crate) fn finalize(&self) -> ObjectId {
        ObjectId(*self.inner.finalize().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oid_empty_blob() {
        let id = ObjectId::for_content(ObjectKind::Blob, b"");
        assert_eq!(id.to_hex().len(), 64);
    }

    #[test]
    fn test_oid_covers_kind_and_length() {
        let expected = blake3::hash(b"blob 11\0hello world");
        let id = ObjectId::for_content(ObjectKind::Blob, b"hello world");
        assert_eq!(id.as_bytes(), expected.as_bytes());

        let as_tree = ObjectId::for_content(ObjectKind::Tree, b"hello world");
        assert_ne!(id, as_tree);
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut hasher = ObjectHasher::new(ObjectKind::Blob, 10);
        hasher.update(b"01234");
        hasher.update(b"56789");
        assert_eq!(
            hasher.finalize(),
            ObjectId::for_content(ObjectKind::Blob, b"0123456789")
        );
    }

    #[test]
    fn test_oid_from_hex_invalid_length() {
        assert!(ObjectId::from_hex("abcd").is_err());
        assert!(ObjectId::from_hex("").is_err());
    }

    #[test]
    fn test_oid_from_hex_invalid_chars() {
        let invalid = "z".repeat(64);
        assert!(ObjectId::from_hex(&invalid).is_err());
    }

    #[test]
    fn test_algorithm_conversions() {
        let algo = Algorithm::Blake3;
        assert_eq!(algo.as_str(), "blake3-256");
        assert_eq!(algo.id(), 1);

        assert_eq!(Algorithm::parse("blake3-256").unwrap(), Algorithm::Blake3);
        assert_eq!(Algorithm::from_id(1).unwrap(), Algorithm::Blake3);

        assert!(Algorithm::parse("unknown").is_err());
        assert!(Algorithm::from_id(99).is_err());
    }

    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            max_shrink_iters: 10000,
            ..ProptestConfig::default()
        })]

        /// Hex parsing accepts exactly what to_hex produces
        #[test]
        fn prop_hex_roundtrip(bytes in prop::array::uniform32(any::<u8>())) {
            let id = ObjectId::from_bytes(bytes);
            let parsed = ObjectId::from_hex(&id.to_hex())?;
            prop_assert_eq!(id, parsed);
        }

        /// Fan-out prefix and file name reassemble the full id
        #[test]
        fn prop_prefix_suffix_concat(bytes in prop::array::uniform32(any::<u8>())) {
            let id = ObjectId::from_bytes(bytes);
            prop_assert_eq!(format!("{}{}", id.prefix(), id.suffix()), id.to_hex());
        }

        /// Any wrong-length hex string is rejected
        #[test]
        fn prop_invalid_hex_length_fails(
            s in "[0-9a-f]{0,63}|[0-9a-f]{65,128}"
        ) {
            prop_assert!(ObjectId::from_hex(&s).is_err());
        }
    }
}
