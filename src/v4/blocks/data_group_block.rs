use crate::v4::blocks::common::{
    BlockDecode, BlockHeader, RawBlock, debug_assert_aligned, read_u8,
};
use crate::Result;

/// Data group block size (64 bytes).
pub const DG_BLOCK_SIZE: usize = 64;

/// Data Group Block (##DG) - groups channel groups that share a data block.
///
/// A data group typically corresponds to one acquisition device. It links
/// the channel group chain and the raw measurement data.
#[derive(Debug, Clone)]
pub struct DataGroupBlock {
    pub header: BlockHeader,
    /// Link to next data group block (0 if last).
    pub next_dg_addr: u64,
    /// Link to first channel group block.
    pub first_cg_addr: u64,
    /// Link to data block (DT, DZ, DL or HL).
    pub data_block_addr: u64,
    /// Link to comment text/metadata block.
    pub comment_addr: u64,
    /// Size of record ID in bytes (0, 1, 2, 4, or 8).
    pub record_id_size: u8,
}

impl BlockDecode for DataGroupBlock {
    const ID: &'static str = "##DG";

    fn decode(raw: &RawBlock) -> Result<Self> {
        raw.require_payload(1)?;

        Ok(Self {
            header: raw.header.clone(),
            next_dg_addr: raw.link(0),
            first_cg_addr: raw.link(1),
            data_block_addr: raw.link(2),
            comment_addr: raw.link(3),
            record_id_size: read_u8(&raw.payload, 0),
            // payload bytes 1-7: reserved
        })
    }
}

impl DataGroupBlock {
    /// Serializes the block to its 64-byte on-disk form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(DG_BLOCK_SIZE);

        buffer.extend_from_slice(&self.header.to_bytes()?);

        // Links (32 bytes)
        buffer.extend_from_slice(&self.next_dg_addr.to_le_bytes());
        buffer.extend_from_slice(&self.first_cg_addr.to_le_bytes());
        buffer.extend_from_slice(&self.data_block_addr.to_le_bytes());
        buffer.extend_from_slice(&self.comment_addr.to_le_bytes());

        // Data section (8 bytes)
        buffer.push(self.record_id_size);
        buffer.extend_from_slice(&[0u8; 7]); // reserved

        debug_assert_aligned(buffer.len());
        Ok(buffer)
    }
}

impl Default for DataGroupBlock {
    fn default() -> Self {
        Self {
            header: BlockHeader::new("##DG", DG_BLOCK_SIZE as u64, 4),
            next_dg_addr: 0,
            first_cg_addr: 0,
            data_block_addr: 0,
            comment_addr: 0,
            record_id_size: 0,
        }
    }
}
