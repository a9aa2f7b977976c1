//! Content identifiers, the keys of provider records.

use std::fmt::{self, Debug, Formatter};

use bytes::Bytes;

/// Multihash code of sha2-256.
pub const SHA2_256: u64 = 0x12;
/// Multicodec of raw binary content.
pub const RAW: u64 = 0x55;
/// Multicodec of dag-protobuf content, the implicit codec of CIDv0.
pub const DAG_PB: u64 = 0x70;

/// Unsigned varints are limited to 9 bytes (63 bits).
const MAX_VARINT_LEN: usize = 9;
const CID_V0_LEN: usize = 34;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Reasons a byte string is not a content identifier.
pub enum CidError {
    #[error("cid: empty input")]
    Empty,

    #[error("cid: invalid varint")]
    InvalidVarint,

    #[error("cid: unsupported version {0}")]
    UnsupportedVersion(u64),

    #[error("cid: multihash digest length mismatch, declared {declared}, found {found}")]
    DigestLength { declared: u64, found: usize },

    #[error("cid: {0} unexpected trailing bytes")]
    TrailingBytes(usize),
}

#[derive(Clone, PartialEq, Eq, Hash)]
/// A parsed CIDv0 or CIDv1.
pub struct ContentId {
    version: u64,
    codec: u64,
    hash_code: u64,
    digest: Bytes,
    bytes: Bytes,
}

impl ContentId {
    /// Parse the canonical binary form of a CID.
    ///
    /// A 34 byte sha2-256 multihash is a CIDv0, anything else must be a
    /// complete CIDv1 with no trailing bytes.
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<ContentId, CidError> {
        let bytes = bytes.as_ref();

        if bytes.is_empty() {
            return Err(CidError::Empty);
        }

        if bytes.len() == CID_V0_LEN && bytes[0] == SHA2_256 as u8 && bytes[1] == 32 {
            return Ok(ContentId {
                version: 0,
                codec: DAG_PB,
                hash_code: SHA2_256,
                digest: Bytes::copy_from_slice(&bytes[2..]),
                bytes: Bytes::copy_from_slice(bytes),
            });
        }

        let (version, mut offset) = read_uvarint(bytes)?;
        if version != 1 {
            return Err(CidError::UnsupportedVersion(version));
        }

        let (codec, read) = read_uvarint(&bytes[offset..])?;
        offset += read;
        let (hash_code, read) = read_uvarint(&bytes[offset..])?;
        offset += read;
        let (digest_len, read) = read_uvarint(&bytes[offset..])?;
        offset += read;

        let remaining = bytes.len() - offset;
        if (remaining as u64) < digest_len {
            return Err(CidError::DigestLength {
                declared: digest_len,
                found: remaining,
            });
        }
        if (remaining as u64) > digest_len {
            return Err(CidError::TrailingBytes(remaining - digest_len as usize));
        }

        Ok(ContentId {
            version,
            codec,
            hash_code,
            digest: Bytes::copy_from_slice(&bytes[offset..]),
            bytes: Bytes::copy_from_slice(bytes),
        })
    }

    /// Build a CIDv1 from its parts.
    pub fn new_v1(codec: u64, hash_code: u64, digest: &[u8]) -> ContentId {
        let mut bytes = Vec::with_capacity(digest.len() + 4 * MAX_VARINT_LEN);
        write_uvarint(&mut bytes, 1);
        write_uvarint(&mut bytes, codec);
        write_uvarint(&mut bytes, hash_code);
        write_uvarint(&mut bytes, digest.len() as u64);
        bytes.extend_from_slice(digest);

        ContentId {
            version: 1,
            codec,
            hash_code,
            digest: Bytes::copy_from_slice(digest),
            bytes: bytes.into(),
        }
    }

    // === Getters ===

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn codec(&self) -> u64 {
        self.codec
    }

    pub fn hash_code(&self) -> u64 {
        self.hash_code
    }

    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    /// Canonical binary form.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Debug for ContentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId(v{}, ", self.version)?;
        for byte in self.digest.iter().take(8) {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

/// Read an unsigned LEB128 varint, returns the value and the bytes consumed.
fn read_uvarint(bytes: &[u8]) -> Result<(u64, usize), CidError> {
    let mut value: u64 = 0;

    for (i, byte) in bytes.iter().enumerate().take(MAX_VARINT_LEN) {
        value |= ((byte & 0x7f) as u64) << (7 * i);

        if byte & 0x80 == 0 {
            // Reject non minimal encodings, as multiformats does.
            if *byte == 0 && i > 0 {
                return Err(CidError::InvalidVarint);
            }
            return Ok((value, i + 1));
        }
    }

    Err(CidError::InvalidVarint)
}

fn write_uvarint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_v0() {
        let mut bytes = vec![0x12, 32];
        bytes.extend_from_slice(&[7; 32]);

        let cid = ContentId::from_bytes(&bytes).unwrap();

        assert_eq!(cid.version(), 0);
        assert_eq!(cid.codec(), DAG_PB);
        assert_eq!(cid.digest(), &[7; 32]);
        assert_eq!(cid.as_bytes(), &bytes[..]);
    }

    #[test]
    fn parse_v1() {
        let cid = ContentId::new_v1(RAW, SHA2_256, &[9; 32]);
        assert_eq!(&cid.as_bytes()[..4], &[1, 0x55, 0x12, 32]);

        let parsed = ContentId::from_bytes(cid.as_bytes()).unwrap();

        assert_eq!(parsed, cid);
        assert_eq!(parsed.version(), 1);
        assert_eq!(parsed.codec(), RAW);
    }

    #[test]
    fn multi_byte_codec() {
        // dag-jose 0x85 needs two varint bytes.
        let cid = ContentId::new_v1(0x85, SHA2_256, &[1; 32]);
        assert_eq!(&cid.as_bytes()[..3], &[1, 0x85, 0x01]);

        assert_eq!(ContentId::from_bytes(cid.as_bytes()).unwrap().codec(), 0x85);
    }

    #[test]
    fn reject_malformed() {
        assert_eq!(ContentId::from_bytes(Vec::<u8>::new()), Err(CidError::Empty));
        assert_eq!(
            ContentId::from_bytes(b"hello world"),
            Err(CidError::UnsupportedVersion(b'h' as u64))
        );
        assert_eq!(
            ContentId::from_bytes([1u8, 0x55, 0x12, 32, 1, 2]),
            Err(CidError::DigestLength {
                declared: 32,
                found: 2
            })
        );
        assert_eq!(
            ContentId::from_bytes([1u8, 0x55, 0x12, 1, 1, 2]),
            Err(CidError::TrailingBytes(1))
        );
        assert_eq!(
            ContentId::from_bytes([0x81u8, 0x80]),
            Err(CidError::InvalidVarint)
        );
    }
}
