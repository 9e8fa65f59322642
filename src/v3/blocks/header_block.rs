use crate::layout::ByteOrder;
use crate::v3::blocks::common::{
    BlockDecode, BlockHeader, decode_string, read_i16, read_u16, read_u32, read_u64,
    validate_buffer_size,
};
use crate::Result;

/// Header Block (HD) - root of the v3 block graph, at file offset 64.
#[derive(Debug, Clone)]
pub struct HeaderBlock {
    pub header: BlockHeader,
    /// Link to first data group block.
    pub first_dg_addr: u32,
    /// Link to comment text block.
    pub comment_addr: u32,
    /// Link to program-specific block (uninterpreted).
    pub program_addr: u32,
    pub data_group_count: u16,
    /// Recording date "DD:MM:YYYY".
    pub date: String,
    /// Recording time "HH:MM:SS".
    pub time: String,
    pub author: String,
    pub organization: String,
    pub project: String,
    pub subject: String,
    /// Start time in nanoseconds since Jan 1, 1970; 3.2+ files only.
    pub abs_time: u64,
    /// UTC offset in half hours; 3.2+ files only.
    pub utc_offset: i16,
    pub time_quality: u16,
    pub timer_id: String,
}

impl BlockDecode for HeaderBlock {
    const ID: &'static str = "HD";

    fn decode(bytes: &[u8], order: ByteOrder) -> Result<Self> {
        validate_buffer_size(bytes, 164)?;

        let mut block = Self {
            header: BlockHeader::from_bytes(bytes, order)?,
            first_dg_addr: read_u32(bytes, 4, order),
            comment_addr: read_u32(bytes, 8, order),
            program_addr: read_u32(bytes, 12, order),
            data_group_count: read_u16(bytes, 16, order),
            date: decode_string(&bytes[18..28]),
            time: decode_string(&bytes[28..36]),
            author: decode_string(&bytes[36..68]),
            organization: decode_string(&bytes[68..100]),
            project: decode_string(&bytes[100..132]),
            subject: decode_string(&bytes[132..164]),
            abs_time: 0,
            utc_offset: 0,
            time_quality: 0,
            timer_id: String::new(),
        };

        // 3.2 additions
        if bytes.len() >= 176 {
            block.abs_time = read_u64(bytes, 164, order);
            block.utc_offset = read_i16(bytes, 172, order);
            block.time_quality = read_u16(bytes, 174, order);
        }
        if bytes.len() >= 208 {
            block.timer_id = decode_string(&bytes[176..208]);
        }
        Ok(block)
    }
}
