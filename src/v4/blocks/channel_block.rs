use std::rc::Rc;

use crate::layout::{ByteOrder, FieldKind};
use crate::v4::blocks::common::{
    BlockDecode, BlockHeader, RawBlock, debug_assert_aligned, read_f64, read_u8, read_u16,
    read_u32,
};
use crate::v4::blocks::conversion_block::ConversionBlock;
use crate::Result;

/// Channel block size (160 bytes).
pub const CN_BLOCK_SIZE: usize = 160;

/// Channel data type tag (cn_data_type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataType {
    UnsignedIntegerLE,
    UnsignedIntegerBE,
    SignedIntegerLE,
    SignedIntegerBE,
    FloatLE,
    FloatBE,
    StringLatin1,
    StringUtf8,
    StringUtf16LE,
    StringUtf16BE,
    ByteArray,
    MimeSample,
    MimeStream,
    CanOpenDate,
    CanOpenTime,
    ComplexLE,
    ComplexBE,
    Unknown(u8),
}

impl DataType {
    /// Convert a raw tag to the corresponding `DataType`. Values outside
    /// the known range yield `DataType::Unknown`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => DataType::UnsignedIntegerLE,
            1 => DataType::UnsignedIntegerBE,
            2 => DataType::SignedIntegerLE,
            3 => DataType::SignedIntegerBE,
            4 => DataType::FloatLE,
            5 => DataType::FloatBE,
            6 => DataType::StringLatin1,
            7 => DataType::StringUtf8,
            8 => DataType::StringUtf16LE,
            9 => DataType::StringUtf16BE,
            10 => DataType::ByteArray,
            11 => DataType::MimeSample,
            12 => DataType::MimeStream,
            13 => DataType::CanOpenDate,
            14 => DataType::CanOpenTime,
            15 => DataType::ComplexLE,
            16 => DataType::ComplexBE,
            other => DataType::Unknown(other),
        }
    }

    /// Numeric tag written to disk.
    pub fn to_u8(self) -> u8 {
        match self {
            DataType::UnsignedIntegerLE => 0,
            DataType::UnsignedIntegerBE => 1,
            DataType::SignedIntegerLE => 2,
            DataType::SignedIntegerBE => 3,
            DataType::FloatLE => 4,
            DataType::FloatBE => 5,
            DataType::StringLatin1 => 6,
            DataType::StringUtf8 => 7,
            DataType::StringUtf16LE => 8,
            DataType::StringUtf16BE => 9,
            DataType::ByteArray => 10,
            DataType::MimeSample => 11,
            DataType::MimeStream => 12,
            DataType::CanOpenDate => 13,
            DataType::CanOpenTime => 14,
            DataType::ComplexLE => 15,
            DataType::ComplexBE => 16,
            DataType::Unknown(v) => v,
        }
    }

    /// Numeric interpretation for the record decoder, `None` for
    /// non-numeric types (strings, byte arrays, complex).
    pub fn numeric_kind(self) -> Option<(FieldKind, ByteOrder)> {
        match self {
            DataType::UnsignedIntegerLE => Some((FieldKind::UnsignedInt, ByteOrder::LittleEndian)),
            DataType::UnsignedIntegerBE => Some((FieldKind::UnsignedInt, ByteOrder::BigEndian)),
            DataType::SignedIntegerLE => Some((FieldKind::SignedInt, ByteOrder::LittleEndian)),
            DataType::SignedIntegerBE => Some((FieldKind::SignedInt, ByteOrder::BigEndian)),
            DataType::FloatLE => Some((FieldKind::Float, ByteOrder::LittleEndian)),
            DataType::FloatBE => Some((FieldKind::Float, ByteOrder::BigEndian)),
            _ => None,
        }
    }
}

/// Channel Block (##CN) - one measurement channel's record layout.
///
/// `name` and `conversion` are the instanced counterparts of `name_addr`
/// and `conversion_addr`, populated by the graph reader's resolution step.
#[derive(Debug, Clone)]
pub struct ChannelBlock {
    pub header: BlockHeader,
    pub next_cn_addr: u64,
    pub component_addr: u64,
    pub name_addr: u64,
    pub source_addr: u64,
    pub conversion_addr: u64,
    pub data_addr: u64,
    pub unit_addr: u64,
    pub comment_addr: u64,
    /// 0 = fixed-length data, 2/3 = master (time), others unused here.
    pub channel_type: u8,
    pub sync_type: u8,
    pub data_type: DataType,
    pub bit_offset: u8,
    pub byte_offset: u32,
    pub bit_count: u32,
    pub flags: u32,
    pub pos_invalidation_bit: u32,
    pub precision: u8,
    pub attachment_count: u16,
    pub min_raw_value: f64,
    pub max_raw_value: f64,
    pub lower_limit: f64,
    pub upper_limit: f64,
    pub lower_ext_limit: f64,
    pub upper_ext_limit: f64,
    /// Resolved channel name.
    pub name: Option<String>,
    /// Resolved conversion parameters, shared between aliasing channels.
    pub conversion: Option<Rc<ConversionBlock>>,
}

impl BlockDecode for ChannelBlock {
    const ID: &'static str = "##CN";

    fn decode(raw: &RawBlock) -> Result<Self> {
        raw.require_payload(72)?;
        let p = &raw.payload;

        Ok(Self {
            header: raw.header.clone(),
            next_cn_addr: raw.link(0),
            component_addr: raw.link(1),
            name_addr: raw.link(2),
            source_addr: raw.link(3),
            conversion_addr: raw.link(4),
            data_addr: raw.link(5),
            unit_addr: raw.link(6),
            comment_addr: raw.link(7),
            channel_type: read_u8(p, 0),
            sync_type: read_u8(p, 1),
            data_type: DataType::from_u8(read_u8(p, 2)),
            bit_offset: read_u8(p, 3),
            byte_offset: read_u32(p, 4),
            bit_count: read_u32(p, 8),
            flags: read_u32(p, 12),
            pos_invalidation_bit: read_u32(p, 16),
            precision: read_u8(p, 20),
            // payload byte 21: reserved
            attachment_count: read_u16(p, 22),
            min_raw_value: read_f64(p, 24),
            max_raw_value: read_f64(p, 32),
            lower_limit: read_f64(p, 40),
            upper_limit: read_f64(p, 48),
            lower_ext_limit: read_f64(p, 56),
            upper_ext_limit: read_f64(p, 64),
            name: None,
            conversion: None,
        })
    }
}

impl ChannelBlock {
    /// Whether this channel is the group's master (time) channel.
    pub fn is_master(&self) -> bool {
        self.channel_type == 2 || self.channel_type == 3
    }

    /// Serializes the block to its 160-byte on-disk form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(CN_BLOCK_SIZE);

        buffer.extend_from_slice(&self.header.to_bytes()?);

        // Links (64 bytes)
        buffer.extend_from_slice(&self.next_cn_addr.to_le_bytes());
        buffer.extend_from_slice(&self.component_addr.to_le_bytes());
        buffer.extend_from_slice(&self.name_addr.to_le_bytes());
        buffer.extend_from_slice(&self.source_addr.to_le_bytes());
        buffer.extend_from_slice(&self.conversion_addr.to_le_bytes());
        buffer.extend_from_slice(&self.data_addr.to_le_bytes());
        buffer.extend_from_slice(&self.unit_addr.to_le_bytes());
        buffer.extend_from_slice(&self.comment_addr.to_le_bytes());

        // Format section (24 bytes)
        buffer.push(self.channel_type);
        buffer.push(self.sync_type);
        buffer.push(self.data_type.to_u8());
        buffer.push(self.bit_offset);
        buffer.extend_from_slice(&self.byte_offset.to_le_bytes());
        buffer.extend_from_slice(&self.bit_count.to_le_bytes());
        buffer.extend_from_slice(&self.flags.to_le_bytes());
        buffer.extend_from_slice(&self.pos_invalidation_bit.to_le_bytes());
        buffer.push(self.precision);
        buffer.push(0); // reserved
        buffer.extend_from_slice(&self.attachment_count.to_le_bytes());

        // Range section (48 bytes)
        buffer.extend_from_slice(&self.min_raw_value.to_le_bytes());
        buffer.extend_from_slice(&self.max_raw_value.to_le_bytes());
        buffer.extend_from_slice(&self.lower_limit.to_le_bytes());
        buffer.extend_from_slice(&self.upper_limit.to_le_bytes());
        buffer.extend_from_slice(&self.lower_ext_limit.to_le_bytes());
        buffer.extend_from_slice(&self.upper_ext_limit.to_le_bytes());

        debug_assert_aligned(buffer.len());
        Ok(buffer)
    }
}

impl Default for ChannelBlock {
    fn default() -> Self {
        Self {
            header: BlockHeader::new("##CN", CN_BLOCK_SIZE as u64, 8),
            next_cn_addr: 0,
            component_addr: 0,
            name_addr: 0,
            source_addr: 0,
            conversion_addr: 0,
            data_addr: 0,
            unit_addr: 0,
            comment_addr: 0,
            channel_type: 0,
            sync_type: 0,
            data_type: DataType::UnsignedIntegerLE,
            bit_offset: 0,
            byte_offset: 0,
            bit_count: 0,
            flags: 0,
            pos_invalidation_bit: 0,
            precision: 0,
            attachment_count: 0,
            min_raw_value: 0.0,
            max_raw_value: 0.0,
            lower_limit: 0.0,
            upper_limit: 0.0,
            lower_ext_limit: 0.0,
            upper_ext_limit: 0.0,
            name: None,
            conversion: None,
        }
    }
}
