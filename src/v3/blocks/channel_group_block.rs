use crate::layout::ByteOrder;
use crate::v3::blocks::common::{
    BlockDecode, BlockHeader, read_u16, read_u32, validate_buffer_size,
};
use crate::Result;

/// Channel Group Block (CG).
#[derive(Debug, Clone)]
pub struct ChannelGroupBlock {
    pub header: BlockHeader,
    /// Link to next channel group block (0 if last).
    pub next_cg_addr: u32,
    /// Link to first channel block.
    pub first_cn_addr: u32,
    /// Link to comment text block.
    pub comment_addr: u32,
    pub record_id: u16,
    pub channel_count: u16,
    /// Bytes of channel data per record (without record ID framing).
    pub record_size: u16,
    /// Number of records written for this group.
    pub cycle_count: u32,
    /// Link to first sample reduction block; 3.3+ files only.
    pub first_sr_addr: u32,
    /// Resolved comment text.
    pub comment: Option<String>,
}

impl BlockDecode for ChannelGroupBlock {
    const ID: &'static str = "CG";

    fn decode(bytes: &[u8], order: ByteOrder) -> Result<Self> {
        validate_buffer_size(bytes, 26)?;

        let mut block = Self {
            header: BlockHeader::from_bytes(bytes, order)?,
            next_cg_addr: read_u32(bytes, 4, order),
            first_cn_addr: read_u32(bytes, 8, order),
            comment_addr: read_u32(bytes, 12, order),
            record_id: read_u16(bytes, 16, order),
            channel_count: read_u16(bytes, 18, order),
            record_size: read_u16(bytes, 20, order),
            cycle_count: read_u32(bytes, 22, order),
            first_sr_addr: 0,
            comment: None,
        };

        // 3.3 addition
        if bytes.len() >= 30 {
            block.first_sr_addr = read_u32(bytes, 26, order);
        }
        Ok(block)
    }
}
