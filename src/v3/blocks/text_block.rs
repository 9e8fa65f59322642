use crate::layout::ByteOrder;
use crate::v3::blocks::common::{BlockDecode, BlockHeader, HEADER_SIZE, decode_string};
use crate::Result;

/// Text Block (TX) - a NUL-terminated string.
#[derive(Debug, Clone)]
pub struct TextBlock {
    pub header: BlockHeader,
    pub text: String,
}

impl BlockDecode for TextBlock {
    const ID: &'static str = "TX";

    fn decode(bytes: &[u8], order: ByteOrder) -> Result<Self> {
        let header = BlockHeader::from_bytes(bytes, order)?;
        let end = bytes.len().min(header.length as usize);
        Ok(Self {
            text: decode_string(&bytes[HEADER_SIZE.min(end)..end]),
            header,
        })
    }
}
