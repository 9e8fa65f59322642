use crate::v4::blocks::common::{
    BlockDecode, BlockHeader, RawBlock, debug_assert_aligned, read_u16, read_u32, read_u64,
};
use crate::Result;

/// Channel group block size (104 bytes).
pub const CG_BLOCK_SIZE: usize = 104;

/// Channel Group Block (##CG) - groups channels sharing one record layout.
#[derive(Debug, Clone)]
pub struct ChannelGroupBlock {
    pub header: BlockHeader,
    pub next_cg_addr: u64,
    pub first_cn_addr: u64,
    pub acq_name_addr: u64,
    pub acq_source_addr: u64,
    pub first_sample_reduction_addr: u64,
    pub comment_addr: u64,
    /// Record ID tagging this group's records in the data stream.
    pub record_id: u64,
    /// Number of records written for this group.
    pub cycle_count: u64,
    pub flags: u16,
    pub path_separator: u16,
    /// Bytes of channel data per record.
    pub data_bytes: u32,
    /// Trailing invalidation bytes per record.
    pub invalidation_bytes: u32,
    /// Resolved acquisition name, populated by the graph reader.
    pub acq_name: Option<String>,
}

impl BlockDecode for ChannelGroupBlock {
    const ID: &'static str = "##CG";

    fn decode(raw: &RawBlock) -> Result<Self> {
        raw.require_payload(32)?;
        let p = &raw.payload;

        Ok(Self {
            header: raw.header.clone(),
            next_cg_addr: raw.link(0),
            first_cn_addr: raw.link(1),
            acq_name_addr: raw.link(2),
            acq_source_addr: raw.link(3),
            first_sample_reduction_addr: raw.link(4),
            comment_addr: raw.link(5),
            record_id: read_u64(p, 0),
            cycle_count: read_u64(p, 8),
            flags: read_u16(p, 16),
            path_separator: read_u16(p, 18),
            // payload bytes 20..24: reserved
            data_bytes: read_u32(p, 24),
            invalidation_bytes: read_u32(p, 28),
            acq_name: None,
        })
    }
}

impl ChannelGroupBlock {
    /// Serializes the block to its 104-byte on-disk form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(CG_BLOCK_SIZE);

        buffer.extend_from_slice(&self.header.to_bytes()?);

        // Links (48 bytes)
        buffer.extend_from_slice(&self.next_cg_addr.to_le_bytes());
        buffer.extend_from_slice(&self.first_cn_addr.to_le_bytes());
        buffer.extend_from_slice(&self.acq_name_addr.to_le_bytes());
        buffer.extend_from_slice(&self.acq_source_addr.to_le_bytes());
        buffer.extend_from_slice(&self.first_sample_reduction_addr.to_le_bytes());
        buffer.extend_from_slice(&self.comment_addr.to_le_bytes());

        // Data section (32 bytes)
        buffer.extend_from_slice(&self.record_id.to_le_bytes());
        buffer.extend_from_slice(&self.cycle_count.to_le_bytes());
        buffer.extend_from_slice(&self.flags.to_le_bytes());
        buffer.extend_from_slice(&self.path_separator.to_le_bytes());
        buffer.extend_from_slice(&0u32.to_le_bytes()); // reserved
        buffer.extend_from_slice(&self.data_bytes.to_le_bytes());
        buffer.extend_from_slice(&self.invalidation_bytes.to_le_bytes());

        debug_assert_aligned(buffer.len());
        Ok(buffer)
    }
}

impl Default for ChannelGroupBlock {
    fn default() -> Self {
        Self {
            header: BlockHeader::new("##CG", CG_BLOCK_SIZE as u64, 6),
            next_cg_addr: 0,
            first_cn_addr: 0,
            acq_name_addr: 0,
            acq_source_addr: 0,
            first_sample_reduction_addr: 0,
            comment_addr: 0,
            record_id: 0,
            cycle_count: 0,
            flags: 0,
            path_separator: 0,
            data_bytes: 0,
            invalidation_bytes: 0,
            acq_name: None,
        }
    }
}
