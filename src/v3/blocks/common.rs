//! Common types and helpers for v3 block parsing.
//!
//! v3 blocks start with a 4-byte header (2-byte ASCII id + u16 total
//! length). Unlike v4, multi-byte fields follow the byte order declared in
//! the identification block, so every helper takes the file's [`ByteOrder`].
//! Links are inline u32 file offsets at fixed positions.

use crate::layout::ByteOrder;
use crate::{Error, Result};

/// Size of the fixed v3 block header.
pub const HEADER_SIZE: usize = 4;

#[inline]
pub fn read_u16(bytes: &[u8], offset: usize, order: ByteOrder) -> u16 {
    let raw: [u8; 2] = bytes[offset..offset + 2].try_into().unwrap();
    match order {
        ByteOrder::LittleEndian => u16::from_le_bytes(raw),
        ByteOrder::BigEndian => u16::from_be_bytes(raw),
    }
}

#[inline]
pub fn read_i16(bytes: &[u8], offset: usize, order: ByteOrder) -> i16 {
    read_u16(bytes, offset, order) as i16
}

#[inline]
pub fn read_u32(bytes: &[u8], offset: usize, order: ByteOrder) -> u32 {
    let raw: [u8; 4] = bytes[offset..offset + 4].try_into().unwrap();
    match order {
        ByteOrder::LittleEndian => u32::from_le_bytes(raw),
        ByteOrder::BigEndian => u32::from_be_bytes(raw),
    }
}

#[inline]
pub fn read_u64(bytes: &[u8], offset: usize, order: ByteOrder) -> u64 {
    let raw: [u8; 8] = bytes[offset..offset + 8].try_into().unwrap();
    match order {
        ByteOrder::LittleEndian => u64::from_le_bytes(raw),
        ByteOrder::BigEndian => u64::from_be_bytes(raw),
    }
}

#[inline]
pub fn read_f64(bytes: &[u8], offset: usize, order: ByteOrder) -> f64 {
    f64::from_bits(read_u64(bytes, offset, order))
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

/// Fixed-width string field: cut at the first NUL, lossy UTF-8.
pub fn decode_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// The 4-byte header present in all v3 blocks.
#[derive(Debug, Clone)]
pub struct BlockHeader {
    /// 2-byte block type identifier (e.g. "HD", "DG").
    pub id: String,
    /// Total length of the block in bytes, including this header.
    pub length: u16,
}

impl BlockHeader {
    pub fn from_bytes(bytes: &[u8], order: ByteOrder) -> Result<Self> {
        validate_buffer_size(bytes, HEADER_SIZE)?;
        Ok(Self {
            id: String::from_utf8_lossy(&bytes[0..2]).into_owned(),
            length: read_u16(bytes, 2, order),
        })
    }
}

/// Typed deserialization of a whole v3 block (header included in `bytes`).
///
/// Optional trailing fields added in later 3.x revisions are gated on the
/// remaining byte count; missing ones default.
pub trait BlockDecode: Sized {
    /// Expected 2-byte block identifier.
    const ID: &'static str;

    fn decode(bytes: &[u8], order: ByteOrder) -> Result<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_respects_byte_order() {
        let bytes = [b'H', b'D', 0x00, 0xA4];
        let be = BlockHeader::from_bytes(&bytes, ByteOrder::BigEndian).unwrap();
        assert_eq!(be.id, "HD");
        assert_eq!(be.length, 0x00A4);

        let bytes = [b'H', b'D', 0xA4, 0x00];
        let le = BlockHeader::from_bytes(&bytes, ByteOrder::LittleEndian).unwrap();
        assert_eq!(le.length, 0x00A4);
    }

    #[test]
    fn big_endian_floats() {
        let bytes = 1.5f64.to_be_bytes();
        assert_eq!(read_f64(&bytes, 0, ByteOrder::BigEndian), 1.5);
    }
}
