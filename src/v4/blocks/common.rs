//! Common types and helpers for v4 block parsing.
//!
//! Every v4 block starts with a 24-byte header (4-byte ASCII id, 4 reserved
//! bytes, total length, link count), followed by `link_count` 64-bit links
//! and the block's data section. The graph reader splits a block into a
//! [`RawBlock`] (header + link array + remaining payload); typed
//! deserializers implement [`BlockDecode`] over that.

use crate::{Error, Result};

/// Size of the fixed v4 block header.
pub const HEADER_SIZE: usize = 24;

// ============================================================================
// Byte parsing helpers (v4 is always little-endian)
// ============================================================================

/// Read a u64 from a byte slice at the given offset (little-endian).
#[inline]
pub fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap())
}

/// Read a u32 from a byte slice at the given offset (little-endian).
#[inline]
pub fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

/// Read a u16 from a byte slice at the given offset (little-endian).
#[inline]
pub fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(bytes[offset..offset + 2].try_into().unwrap())
}

/// Read an i16 from a byte slice at the given offset (little-endian).
#[inline]
pub fn read_i16(bytes: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes(bytes[offset..offset + 2].try_into().unwrap())
}

/// Read an f64 from a byte slice at the given offset (little-endian).
#[inline]
pub fn read_f64(bytes: &[u8], offset: usize) -> f64 {
    f64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap())
}

/// Read a u8 from a byte slice at the given offset.
#[inline]
pub fn read_u8(bytes: &[u8], offset: usize) -> u8 {
    bytes[offset]
}

/// Validate that a buffer has at least `expected` bytes.
#[inline]
pub fn validate_buffer_size(bytes: &[u8], expected: usize) -> Result<()> {
    if bytes.len() < expected {
        return Err(Error::TooShortBuffer {
            actual: bytes.len(),
            expected,
            file: file!(),
            line: line!(),
        });
    }
    Ok(())
}

/// Calculate padding needed to reach 8-byte alignment.
#[inline]
pub const fn padding_to_align_8(size: usize) -> usize {
    (8 - (size % 8)) % 8
}

/// Assert that a buffer size is 8-byte aligned (debug builds only).
#[inline]
pub fn debug_assert_aligned(size: usize) {
    debug_assert_eq!(size % 8, 0, "Block size {} is not 8-byte aligned", size);
}

/// The 24-byte header present in all v4 blocks.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockHeader {
    /// 4-byte block type identifier (e.g., "##HD", "##DG").
    pub id: String,
    /// Reserved field, always 0.
    pub reserved: u32,
    /// Total length of the block in bytes, including this header.
    pub length: u64,
    /// Number of link fields following this header.
    pub link_count: u64,
}

impl BlockHeader {
    /// Build a header for the given id, total length, and link count.
    pub fn new(id: &str, length: u64, link_count: u64) -> Self {
        Self {
            id: String::from(id),
            reserved: 0,
            length,
            link_count,
        }
    }

    /// Parse a block header from the first 24 bytes of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        validate_buffer_size(bytes, HEADER_SIZE)?;

        let id = match core::str::from_utf8(&bytes[0..4]) {
            Ok(s) => String::from(s),
            Err(_) => String::from_utf8_lossy(&bytes[0..4]).into_owned(),
        };

        Ok(Self {
            id,
            reserved: read_u32(bytes, 4),
            length: read_u64(bytes, 8),
            link_count: read_u64(bytes, 16),
        })
    }

    /// Serialize the header to its 24-byte on-disk form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(HEADER_SIZE);

        let id_bytes = self.id.as_bytes();
        let mut id_field = [0u8; 4];
        let id_len = core::cmp::min(id_bytes.len(), 4);
        id_field[..id_len].copy_from_slice(&id_bytes[..id_len]);
        buffer.extend_from_slice(&id_field);

        buffer.extend_from_slice(&self.reserved.to_le_bytes());
        buffer.extend_from_slice(&self.length.to_le_bytes());
        buffer.extend_from_slice(&self.link_count.to_le_bytes());

        debug_assert_eq!(buffer.len(), HEADER_SIZE);
        Ok(buffer)
    }
}

/// A generic v4 block as produced by the graph reader: the header, the
/// pre-extracted link array, and the remaining payload bytes.
///
/// Ephemeral: constructed per read and dropped after typed deserialization.
#[derive(Debug, Clone)]
pub struct RawBlock {
    /// File offset the block was read from.
    pub addr: u64,
    /// Parsed 24-byte header.
    pub header: BlockHeader,
    /// `link_count` links decoded from the payload prefix.
    pub links: Vec<u64>,
    /// Data section after the link array.
    pub payload: Vec<u8>,
}

impl RawBlock {
    /// Link at position `index`; 0 (null link) when out of range.
    pub fn link(&self, index: usize) -> u64 {
        self.links.get(index).copied().unwrap_or(0)
    }

    /// Validate the payload holds at least `expected` bytes.
    pub fn require_payload(&self, expected: usize) -> Result<()> {
        validate_buffer_size(&self.payload, expected)
    }
}

/// Typed deserialization of a [`RawBlock`]'s payload.
pub trait BlockDecode: Sized {
    /// Expected 4-byte block identifier.
    const ID: &'static str;

    /// Interpret the raw payload into the typed block.
    ///
    /// The graph reader has already validated the id; implementations only
    /// read fields. Optional trailing fields must be gated on remaining
    /// payload length and default when absent.
    fn decode(raw: &RawBlock) -> Result<Self>;
}

/// Null-terminated, fixed-width or length-delimited string decoding: cut at
/// the first NUL byte, lossy UTF-8.
pub fn decode_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let header = BlockHeader::new("##DG", 64, 4);
        let bytes = header.to_bytes().unwrap();
        let parsed = BlockHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.id, "##DG");
        assert_eq!(parsed.length, 64);
        assert_eq!(parsed.link_count, 4);
    }

    #[test]
    fn string_decoding_cuts_at_nul() {
        assert_eq!(decode_string(b"speed\0\0\0"), "speed");
        assert_eq!(decode_string(b"no-nul"), "no-nul");
        assert_eq!(decode_string(b""), "");
    }

    #[test]
    fn raw_block_links_default_to_null() {
        let raw = RawBlock {
            addr: 64,
            header: BlockHeader::new("##DG", 64, 1),
            links: vec![0x100],
            payload: Vec::new(),
        };
        assert_eq!(raw.link(0), 0x100);
        assert_eq!(raw.link(5), 0);
    }
}
