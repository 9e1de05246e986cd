//! Loose object header format.
//!
//! Every loose object file starts with a 16-byte header followed by the
//! (possibly compressed) content:
//!
//! ```text
//! 0x00  4   "LOAM" magic
//! 0x04  1   version (u8) = 1
//! 0x05  1   kind: 1=blob, 2=tree, 3=commit, 4=tag
//! 0x06  1   algo: 1=blake3-256
//! 0x07  1   compression: 0=none, 1=zstd
//! 0x08  8   content_len (u64 LE) - uncompressed size
//! 0x10  ... payload
//! ```
//!
//! The content length is written up front because a write stream declares
//! it before the first byte arrives.

use crate::error::{Error, Result};
use crate::oid::Algorithm;

/// Magic bytes at the start of every object file.
pub const MAGIC: &[u8; 4] = b"LOAM";

/// Current object format version.
pub const VERSION: u8 = 1;

/// Size of the object header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Object kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// File content or a symlink target.
    Blob = 1,
    /// Directory listing.
    Tree = 2,
    /// Commit record.
    Commit = 3,
    /// Annotated tag.
    Tag = 4,
}

impl ObjectKind {
    /// Convert to byte representation.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse from byte representation.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(ObjectKind::Blob),
            2 => Ok(ObjectKind::Tree),
            3 => Ok(ObjectKind::Commit),
            4 => Ok(ObjectKind::Tag),
            _ => Err(Error::invalid_object_type(
                "blob, tree, commit or tag",
                format!("kind byte {}", value),
            )),
        }
    }

    /// Get the string name of this object kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
            ObjectKind::Tag => "tag",
        }
    }
}

/// Compression types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    /// No compression.
    None = 0,
    /// Zstandard compression.
    Zstd = 1,
}

impl CompressionType {
    /// Convert to byte representation.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse from byte representation.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Zstd),
            _ => Err(Error::compression_error(format!(
                "Invalid compression type: {}",
                value
            ))),
        }
    }

    /// Get the string name of this compression type.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionType::None => "none",
            CompressionType::Zstd => "zstd",
        }
    }
}

/// A 16-byte object header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHeader {
    /// Object format version.
    pub version: u8,
    /// Object kind.
    pub kind: ObjectKind,
    /// Hash algorithm used.
    pub algorithm: Algorithm,
    /// Compression applied to the payload.
    pub compression: CompressionType,
    /// Uncompressed content length in bytes.
    pub content_len: u64,
}

impl ObjectHeader {
    /// Create a new object header.
    pub fn new(
        kind: ObjectKind,
        algorithm: Algorithm,
        compression: CompressionType,
        content_len: u64,
    ) -> Self {
        Self {
            version: VERSION,
            kind,
            algorithm,
            compression,
            content_len,
        }
    }

    /// Encode the header to a 16-byte array.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4] = self.version;
        buf[5] = self.kind.to_u8();
        buf[6] = self.algorithm.id();
        buf[7] = self.compression.to_u8();
        buf[8..16].copy_from_slice(&self.content_len.to_le_bytes());
        buf
    }

    /// Decode a header from the first 16 bytes of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::invalid_header(format!(
                "Header too short: {} bytes (expected {})",
                buf.len(),
                HEADER_SIZE
            )));
        }

        if &buf[0..4] != MAGIC {
            return Err(Error::invalid_header(format!(
                "Invalid magic: expected {:?}, got {:?}",
                MAGIC,
                &buf[0..4]
            )));
        }

        let version = buf[4];
        if version != VERSION {
            return Err(Error::invalid_header(format!(
                "Unsupported version: {} (expected {})",
                version, VERSION
            )));
        }

        let kind = ObjectKind::from_u8(buf[5])?;
        let algorithm = Algorithm::from_id(buf[6])?;
        let compression = CompressionType::from_u8(buf[7])?;

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&buf[8..16]);
        let content_len = u64::from_le_bytes(len_bytes);

        Ok(Self {
            version,
            kind,
            algorithm,
            compression,
            content_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_kind_conversions() {
        for kind in [
            ObjectKind::Blob,
            ObjectKind::Tree,
            ObjectKind::Commit,
            ObjectKind::Tag,
        ] {
            assert_eq!(ObjectKind::from_u8(kind.to_u8()).unwrap(), kind);
        }
        assert_eq!(ObjectKind::Blob.as_str(), "blob");
        assert!(ObjectKind::from_u8(0).is_err());
        assert!(ObjectKind::from_u8(5).is_err());
    }

    #[test]
    fn test_header_encode_layout() {
        let header = ObjectHeader::new(
            ObjectKind::Blob,
            Algorithm::Blake3,
            CompressionType::Zstd,
            0x0102,
        );
        let buf = header.encode();

        assert_eq!(&buf[0..4], b"LOAM");
        assert_eq!(buf[4], VERSION);
        assert_eq!(buf[5], 1);
        assert_eq!(buf[6], 1);
        assert_eq!(buf[7], 1);
        assert_eq!(&buf[8..10], &[0x02, 0x01]);

        assert_eq!(ObjectHeader::decode(&buf).unwrap(), header);
    }

    #[test]
    fn test_header_decode_bad_magic() {
        let mut buf = ObjectHeader::new(
            ObjectKind::Blob,
            Algorithm::Blake3,
            CompressionType::None,
            0,
        )
        .encode();
        buf[0] = b'X';
        let err = ObjectHeader::decode(&buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        assert!(err.to_string().contains("Invalid object header"));
    }

    #[test]
    fn test_header_decode_unknown_version() {
        let mut buf = ObjectHeader::new(
            ObjectKind::Tree,
            Algorithm::Blake3,
            CompressionType::None,
            0,
        )
        .encode();
        buf[4] = 9;
        let err = ObjectHeader::decode(&buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn test_header_decode_invalid_compression() {
        let mut buf = ObjectHeader::new(
            ObjectKind::Blob,
            Algorithm::Blake3,
            CompressionType::None,
            0,
        )
        .encode();
        buf[7] = 99;
        assert!(ObjectHeader::decode(&buf).is_err());
    }

    #[test]
    fn test_header_too_short() {
        let buf = [0u8; 10];
        let err = ObjectHeader::decode(&buf).unwrap_err();
        assert!(matches!(err, Error::InvalidHeader { .. }));
    }
}
