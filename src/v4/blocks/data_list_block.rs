use crate::v4::blocks::common::{
    BlockDecode, BlockHeader, HEADER_SIZE, RawBlock, debug_assert_aligned, read_u8, read_u16,
    read_u32, read_u64,
};
use crate::Result;

/// Data List flag: all referenced blocks have equal length.
pub const DL_FLAG_EQUAL_LENGTH: u8 = 0x01;

/// Data List Block (##DL) - ordered list of data block fragments.
///
/// Large measurements split their record stream into multiple ##DT/##DZ
/// fragments chained through data lists; reading them back to back
/// reconstructs the contiguous stream.
#[derive(Debug, Clone)]
pub struct DataListBlock {
    pub header: BlockHeader,
    /// Link to next data list block (0 if last).
    pub next_dl_addr: u64,
    /// Links to the data block fragments, in stream order.
    pub data_addrs: Vec<u64>,
    pub flags: u8,
    /// With the equal-length flag: common byte length of every fragment.
    pub equal_length: u64,
    /// Without the flag: stream offset of each fragment.
    pub offsets: Vec<u64>,
}

impl BlockDecode for DataListBlock {
    const ID: &'static str = "##DL";

    fn decode(raw: &RawBlock) -> Result<Self> {
        raw.require_payload(8)?;
        let p = &raw.payload;

        let flags = read_u8(p, 0);
        // payload bytes 1..4: reserved
        let count = read_u32(p, 4) as usize;

        let mut data_addrs = Vec::with_capacity(count);
        for i in 0..count {
            data_addrs.push(raw.link(1 + i));
        }

        let (equal_length, offsets) = if flags & DL_FLAG_EQUAL_LENGTH != 0 {
            raw.require_payload(16)?;
            (read_u64(p, 8), Vec::new())
        } else {
            raw.require_payload(8 + count * 8)?;
            let mut offsets = Vec::with_capacity(count);
            for i in 0..count {
                offsets.push(read_u64(p, 8 + i * 8));
            }
            (0, offsets)
        };

        Ok(Self {
            header: raw.header.clone(),
            next_dl_addr: raw.link(0),
            data_addrs,
            flags,
            equal_length,
            offsets,
        })
    }
}

impl DataListBlock {
    /// Serializes the block to its variable-length on-disk form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let count = self.data_addrs.len();
        let link_count = 1 + count;
        let equal = self.flags & DL_FLAG_EQUAL_LENGTH != 0;
        let data_len = if equal { 16 } else { 8 + count * 8 };
        let length = HEADER_SIZE + link_count * 8 + data_len;

        let header = BlockHeader::new("##DL", length as u64, link_count as u64);
        let mut buffer = Vec::with_capacity(length);

        buffer.extend_from_slice(&header.to_bytes()?);

        buffer.extend_from_slice(&self.next_dl_addr.to_le_bytes());
        for addr in &self.data_addrs {
            buffer.extend_from_slice(&addr.to_le_bytes());
        }

        buffer.push(self.flags);
        buffer.extend_from_slice(&[0u8; 3]); // reserved
        buffer.extend_from_slice(&(count as u32).to_le_bytes());
        if equal {
            buffer.extend_from_slice(&self.equal_length.to_le_bytes());
        } else {
            for offset in &self.offsets {
                buffer.extend_from_slice(&offset.to_le_bytes());
            }
        }

        debug_assert_aligned(buffer.len());
        Ok(buffer)
    }
}

impl Default for DataListBlock {
    fn default() -> Self {
        Self {
            header: BlockHeader::new("##DL", (HEADER_SIZE + 8 + 16) as u64, 1),
            next_dl_addr: 0,
            data_addrs: Vec::new(),
            flags: DL_FLAG_EQUAL_LENGTH,
            equal_length: 0,
            offsets: Vec::new(),
        }
    }
}

/// Header List block size (40 bytes).
pub const HL_BLOCK_SIZE: usize = 40;

/// Header List Block (##HL) - prefix of a data list chain carrying the
/// compression settings shared by all ##DZ fragments below it.
#[derive(Debug, Clone)]
pub struct HeaderListBlock {
    pub header: BlockHeader,
    /// Link to the first data list block.
    pub first_dl_addr: u64,
    pub flags: u16,
    /// Compression algorithm of the fragments (0 = deflate, 1 = transposed).
    pub zip_type: u8,
}

impl BlockDecode for HeaderListBlock {
    const ID: &'static str = "##HL";

    fn decode(raw: &RawBlock) -> Result<Self> {
        raw.require_payload(3)?;
        let p = &raw.payload;

        Ok(Self {
            header: raw.header.clone(),
            first_dl_addr: raw.link(0),
            flags: read_u16(p, 0),
            zip_type: read_u8(p, 2),
            // payload bytes 3..8: reserved
        })
    }
}

impl HeaderListBlock {
    /// Serializes the block to its 40-byte on-disk form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(HL_BLOCK_SIZE);

        buffer.extend_from_slice(&self.header.to_bytes()?);
        buffer.extend_from_slice(&self.first_dl_addr.to_le_bytes());
        buffer.extend_from_slice(&self.flags.to_le_bytes());
        buffer.push(self.zip_type);
        buffer.extend_from_slice(&[0u8; 5]); // reserved

        debug_assert_aligned(buffer.len());
        Ok(buffer)
    }
}

impl Default for HeaderListBlock {
    fn default() -> Self {
        Self {
            header: BlockHeader::new("##HL", HL_BLOCK_SIZE as u64, 1),
            first_dl_addr: 0,
            flags: 0,
            zip_type: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reparse(bytes: &[u8]) -> RawBlock {
        let header = BlockHeader::from_bytes(bytes).unwrap();
        let n = header.link_count as usize;
        let mut links = Vec::with_capacity(n);
        for i in 0..n {
            links.push(read_u64(bytes, HEADER_SIZE + i * 8));
        }
        RawBlock {
            addr: 0,
            header,
            links,
            payload: bytes[HEADER_SIZE + n * 8..].to_vec(),
        }
    }

    #[test]
    fn equal_length_list_roundtrip() {
        let block = DataListBlock {
            next_dl_addr: 0x200,
            data_addrs: vec![0x400, 0x500, 0x600],
            flags: DL_FLAG_EQUAL_LENGTH,
            equal_length: 4096,
            ..Default::default()
        };
        let parsed = DataListBlock::decode(&reparse(&block.to_bytes().unwrap())).unwrap();
        assert_eq!(parsed.next_dl_addr, 0x200);
        assert_eq!(parsed.data_addrs, vec![0x400, 0x500, 0x600]);
        assert_eq!(parsed.equal_length, 4096);
        assert!(parsed.offsets.is_empty());
    }

    #[test]
    fn offset_list_roundtrip() {
        let block = DataListBlock {
            next_dl_addr: 0,
            data_addrs: vec![0x400, 0x500],
            flags: 0,
            offsets: vec![0, 1000],
            ..Default::default()
        };
        let parsed = DataListBlock::decode(&reparse(&block.to_bytes().unwrap())).unwrap();
        assert_eq!(parsed.offsets, vec![0, 1000]);
    }
}
