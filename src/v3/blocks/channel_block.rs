use crate::layout::{ByteOrder, FieldKind};
use crate::v3::blocks::common::{
    BlockDecode, BlockHeader, decode_string, read_f64, read_u16, read_u32, validate_buffer_size,
};
use crate::v3::blocks::conversion_block::ConversionBlock;
use crate::Result;

/// Channel Block (CN) - one measurement channel's record layout.
#[derive(Debug, Clone)]
pub struct ChannelBlock {
    pub header: BlockHeader,
    pub next_cn_addr: u32,
    pub conversion_addr: u32,
    pub source_addr: u32,
    pub dependency_addr: u32,
    pub comment_addr: u32,
    /// 0 = data channel, 1 = time (master) channel.
    pub channel_type: u16,
    /// Short name, 31 characters; superseded by the long-name link in 3.2+.
    pub short_name: String,
    pub description: String,
    /// Start position of the field in bits, relative to the record start
    /// (plus `additional_byte_offset` bytes). May exceed 8.
    pub bit_offset_start: u16,
    pub bit_count: u16,
    pub data_type: u16,
    pub value_range_valid: bool,
    pub min_value: f64,
    pub max_value: f64,
    pub sample_rate: f64,
    /// Link to long name text block; 3.2+ files only.
    pub long_name_addr: u32,
    /// Link to display name text block; 3.2+ files only.
    pub display_name_addr: u32,
    /// Byte offset added to `bit_offset_start` for records wider than
    /// 8 KiB; 3.2+ files only.
    pub additional_byte_offset: u16,
    /// Resolved name: the long name when linked, the short name otherwise.
    pub name: String,
    /// Resolved conversion parameters.
    pub conversion: Option<ConversionBlock>,
}

impl BlockDecode for ChannelBlock {
    const ID: &'static str = "CN";

    fn decode(bytes: &[u8], order: ByteOrder) -> Result<Self> {
        validate_buffer_size(bytes, 218)?;

        let short_name = decode_string(&bytes[26..58]);
        let mut block = Self {
            header: BlockHeader::from_bytes(bytes, order)?,
            next_cn_addr: read_u32(bytes, 4, order),
            conversion_addr: read_u32(bytes, 8, order),
            source_addr: read_u32(bytes, 12, order),
            dependency_addr: read_u32(bytes, 16, order),
            comment_addr: read_u32(bytes, 20, order),
            channel_type: read_u16(bytes, 24, order),
            name: short_name.clone(),
            short_name,
            description: decode_string(&bytes[58..186]),
            bit_offset_start: read_u16(bytes, 186, order),
            bit_count: read_u16(bytes, 188, order),
            data_type: read_u16(bytes, 190, order),
            value_range_valid: read_u16(bytes, 192, order) != 0,
            min_value: read_f64(bytes, 194, order),
            max_value: read_f64(bytes, 202, order),
            sample_rate: read_f64(bytes, 210, order),
            long_name_addr: 0,
            display_name_addr: 0,
            additional_byte_offset: 0,
            conversion: None,
        };

        // 3.2 additions
        if bytes.len() >= 226 {
            block.long_name_addr = read_u32(bytes, 218, order);
            block.display_name_addr = read_u32(bytes, 222, order);
        }
        if bytes.len() >= 228 {
            block.additional_byte_offset = read_u16(bytes, 226, order);
        }
        Ok(block)
    }
}

impl ChannelBlock {
    /// Whether this channel is the group's master (time) channel.
    pub fn is_master(&self) -> bool {
        self.channel_type == 1
    }

    /// Absolute bit position of the field within the record.
    pub fn bit_position(&self) -> u32 {
        self.additional_byte_offset as u32 * 8 + self.bit_offset_start as u32
    }

    /// Numeric interpretation of the data type tag, `None` for strings and
    /// byte arrays. Tags 0-3 use the file's default byte order; 9-12 are
    /// explicitly big-endian and 13-16 explicitly little-endian.
    pub fn numeric_kind(&self, default_order: ByteOrder) -> Option<(FieldKind, ByteOrder)> {
        match self.data_type {
            0 => Some((FieldKind::UnsignedInt, default_order)),
            1 => Some((FieldKind::SignedInt, default_order)),
            2 | 3 => Some((FieldKind::Float, default_order)),
            9 => Some((FieldKind::UnsignedInt, ByteOrder::BigEndian)),
            10 => Some((FieldKind::SignedInt, ByteOrder::BigEndian)),
            11 | 12 => Some((FieldKind::Float, ByteOrder::BigEndian)),
            13 => Some((FieldKind::UnsignedInt, ByteOrder::LittleEndian)),
            14 => Some((FieldKind::SignedInt, ByteOrder::LittleEndian)),
            15 | 16 => Some((FieldKind::Float, ByteOrder::LittleEndian)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_position_combines_byte_and_bit_offsets() {
        let mut bytes = vec![0u8; 228];
        bytes[0] = b'C';
        bytes[1] = b'N';
        bytes[2..4].copy_from_slice(&228u16.to_le_bytes());
        bytes[186..188].copy_from_slice(&12u16.to_le_bytes()); // bit offset
        bytes[188..190].copy_from_slice(&4u16.to_le_bytes()); // bit count
        bytes[226..228].copy_from_slice(&2u16.to_le_bytes()); // extra bytes

        let cn = ChannelBlock::decode(&bytes, ByteOrder::LittleEndian).unwrap();
        assert_eq!(cn.bit_position(), 2 * 8 + 12);
        assert_eq!(cn.bit_count, 4);
    }

    #[test]
    fn short_block_skips_revision_extensions() {
        let mut bytes = vec![0u8; 218];
        bytes[0] = b'C';
        bytes[1] = b'N';
        bytes[2..4].copy_from_slice(&218u16.to_le_bytes());

        let cn = ChannelBlock::decode(&bytes, ByteOrder::LittleEndian).unwrap();
        assert_eq!(cn.long_name_addr, 0);
        assert_eq!(cn.additional_byte_offset, 0);
    }
}
