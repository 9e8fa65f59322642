use crate::v4::blocks::common::{
    BlockDecode, BlockHeader, HEADER_SIZE, RawBlock, debug_assert_aligned, decode_string,
    padding_to_align_8,
};
use crate::Result;

/// Text Block (##TX) - a plain, NUL-terminated string.
///
/// Also used for ##MD metadata blocks, whose payload is an XML fragment but
/// is carried here as an uninterpreted string.
#[derive(Debug, Clone)]
pub struct TextBlock {
    pub header: BlockHeader,
    pub text: String,
}

impl BlockDecode for TextBlock {
    const ID: &'static str = "##TX";

    fn decode(raw: &RawBlock) -> Result<Self> {
        Ok(Self {
            header: raw.header.clone(),
            text: decode_string(&raw.payload),
        })
    }
}

impl TextBlock {
    /// Create a text block sized for `text` plus NUL terminator, padded to
    /// 8-byte alignment.
    pub fn new(text: &str) -> Self {
        let data_len = text.len() + 1;
        let length = HEADER_SIZE + data_len + padding_to_align_8(data_len);
        Self {
            header: BlockHeader::new("##TX", length as u64, 0),
            text: String::from(text),
        }
    }

    /// Serializes the block to its padded on-disk form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let data_len = self.text.len() + 1;
        let padding = padding_to_align_8(data_len);
        let mut buffer = Vec::with_capacity(HEADER_SIZE + data_len + padding);

        buffer.extend_from_slice(&self.header.to_bytes()?);
        buffer.extend_from_slice(self.text.as_bytes());
        buffer.push(0);
        buffer.extend(core::iter::repeat(0u8).take(padding));

        debug_assert_aligned(buffer.len());
        Ok(buffer)
    }
}

impl Default for TextBlock {
    fn default() -> Self {
        Self::new("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::v4::blocks::common::RawBlock;

    #[test]
    fn text_block_pads_to_alignment() {
        let block = TextBlock::new("speed");
        let bytes = block.to_bytes().unwrap();
        assert_eq!(bytes.len() % 8, 0);
        assert_eq!(bytes.len() as u64, block.header.length);
    }

    #[test]
    fn text_roundtrip() {
        let bytes = TextBlock::new("Engine_RPM").to_bytes().unwrap();
        let header = BlockHeader::from_bytes(&bytes).unwrap();
        let raw = RawBlock {
            addr: 0,
            header,
            links: Vec::new(),
            payload: bytes[super::HEADER_SIZE..].to_vec(),
        };
        let parsed = TextBlock::decode(&raw).unwrap();
        assert_eq!(parsed.text, "Engine_RPM");
    }
}
