use crate::layout::ByteOrder;
use crate::v3::blocks::common::{
    BlockDecode, BlockHeader, read_u16, read_u32, validate_buffer_size,
};
use crate::Result;

/// Data Group Block (DG).
#[derive(Debug, Clone)]
pub struct DataGroupBlock {
    pub header: BlockHeader,
    /// Link to next data group block (0 if last).
    pub next_dg_addr: u32,
    /// Link to first channel group block.
    pub first_cg_addr: u32,
    /// Link to trigger block (uninterpreted).
    pub trigger_addr: u32,
    /// Start of the raw record region. No block header; records run
    /// back to back from here.
    pub data_addr: u32,
    pub channel_group_count: u16,
    /// Record ID framing: 0 = none, 1 = leading ID byte, 2 = leading and
    /// trailing ID byte.
    pub record_id_count: u16,
}

impl BlockDecode for DataGroupBlock {
    const ID: &'static str = "DG";

    fn decode(bytes: &[u8], order: ByteOrder) -> Result<Self> {
        validate_buffer_size(bytes, 24)?;

        Ok(Self {
            header: BlockHeader::from_bytes(bytes, order)?,
            next_dg_addr: read_u32(bytes, 4, order),
            first_cg_addr: read_u32(bytes, 8, order),
            trigger_addr: read_u32(bytes, 12, order),
            data_addr: read_u32(bytes, 16, order),
            channel_group_count: read_u16(bytes, 20, order),
            record_id_count: read_u16(bytes, 22, order),
            // bytes 24..28: reserved
        })
    }
}
