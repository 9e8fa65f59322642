use std::rc::Rc;

use crate::v4::blocks::common::{
    BlockDecode, BlockHeader, RawBlock, debug_assert_aligned, read_f64, read_u8, read_u16,
};
use crate::{Error, Result};

/// Fixed portion of the conversion block payload (before the value array).
const CC_PAYLOAD_FIXED: usize = 24;

/// Conversion type tag (cc_type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConversionKind {
    /// 1:1, physical value equals raw value.
    Identity,
    /// phys = p0 + p1 * raw.
    Linear,
    /// phys = (p0*x^2 + p1*x + p2) / (p3*x^2 + p4*x + p5).
    Rational,
    /// Formula text in the first ref.
    Algebraic,
    /// Value-to-value table with interpolation.
    TableLookupInterp,
    /// Value-to-value table without interpolation.
    TableLookupNoInterp,
    /// Value-range-to-value table.
    RangeLookup,
    /// Value-to-text lookup, refs hold the texts.
    ValueToText,
    /// Value-range-to-text lookup.
    RangeToText,
    /// Text-to-value lookup.
    TextToValue,
    /// Text-to-text translation.
    TextToText,
    /// Bitfield text table.
    BitfieldText,
    Unknown(u8),
}

impl ConversionKind {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ConversionKind::Identity,
            1 => ConversionKind::Linear,
            2 => ConversionKind::Rational,
            3 => ConversionKind::Algebraic,
            4 => ConversionKind::TableLookupInterp,
            5 => ConversionKind::TableLookupNoInterp,
            6 => ConversionKind::RangeLookup,
            7 => ConversionKind::ValueToText,
            8 => ConversionKind::RangeToText,
            9 => ConversionKind::TextToValue,
            10 => ConversionKind::TextToText,
            11 => ConversionKind::BitfieldText,
            other => ConversionKind::Unknown(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            ConversionKind::Identity => 0,
            ConversionKind::Linear => 1,
            ConversionKind::Rational => 2,
            ConversionKind::Algebraic => 3,
            ConversionKind::TableLookupInterp => 4,
            ConversionKind::TableLookupNoInterp => 5,
            ConversionKind::RangeLookup => 6,
            ConversionKind::ValueToText => 7,
            ConversionKind::RangeToText => 8,
            ConversionKind::TextToValue => 9,
            ConversionKind::TextToText => 10,
            ConversionKind::BitfieldText => 11,
            ConversionKind::Unknown(v) => v,
        }
    }

    /// Number of parameters a fixed-arity kind requires, `None` for table
    /// and text kinds whose arity is declared in the block.
    fn fixed_arity(self) -> Option<usize> {
        match self {
            ConversionKind::Identity => Some(0),
            ConversionKind::Linear => Some(2),
            ConversionKind::Rational => Some(6),
            _ => None,
        }
    }
}

/// A resolved reference of a conversion block: either a text block's
/// contents or a nested conversion. Nested conversions are shared, so a
/// ref aliased by several channels decodes exactly once.
#[derive(Debug, Clone)]
pub enum ConversionRef {
    Text(String),
    Nested(Rc<ConversionBlock>),
}

/// Conversion Block (##CC) - raw-to-physical conversion parameters.
///
/// Parameters are decoded and carried as metadata; applying them to sample
/// values is left to the caller.
#[derive(Debug, Clone)]
pub struct ConversionBlock {
    pub header: BlockHeader,
    pub name_addr: u64,
    pub unit_addr: u64,
    pub comment_addr: u64,
    pub inverse_addr: u64,
    /// Reference links (links 4..), text or nested conversion blocks.
    pub ref_addrs: Vec<u64>,
    pub kind: ConversionKind,
    pub precision: u8,
    pub flags: u16,
    pub value_count: u16,
    pub phys_range_min: f64,
    pub phys_range_max: f64,
    /// Numeric parameter array (cc_val).
    pub values: Vec<f64>,
    /// Resolved conversion name.
    pub name: Option<String>,
    /// Resolved physical unit.
    pub unit: Option<String>,
    /// Resolved references, in `ref_addrs` order (null links skipped).
    pub refs: Vec<ConversionRef>,
}

impl BlockDecode for ConversionBlock {
    const ID: &'static str = "##CC";

    fn decode(raw: &RawBlock) -> Result<Self> {
        raw.require_payload(8)?;
        let p = &raw.payload;

        let kind = ConversionKind::from_u8(read_u8(p, 0));
        let precision = read_u8(p, 1);
        let flags = read_u16(p, 2);
        let ref_count = read_u16(p, 4) as usize;
        let value_count = read_u16(p, 6);

        // Physical range and values follow in revisions that carry them;
        // older or minimal blocks may end after the counts.
        let (phys_range_min, phys_range_max) = if p.len() >= CC_PAYLOAD_FIXED {
            (read_f64(p, 8), read_f64(p, 16))
        } else {
            (0.0, 0.0)
        };

        let value_bytes = value_count as usize * 8;
        if value_bytes > 0 {
            raw.require_payload(CC_PAYLOAD_FIXED + value_bytes)?;
        }
        let mut values = Vec::with_capacity(value_count as usize);
        for i in 0..value_count as usize {
            values.push(read_f64(p, CC_PAYLOAD_FIXED + i * 8));
        }

        if let Some(arity) = kind.fixed_arity() {
            if values.len() < arity {
                return Err(Error::TooShortBuffer {
                    actual: CC_PAYLOAD_FIXED + values.len() * 8,
                    expected: CC_PAYLOAD_FIXED + arity * 8,
                    file: file!(),
                    line: line!(),
                });
            }
        }

        let mut ref_addrs = Vec::with_capacity(ref_count);
        for i in 0..ref_count {
            ref_addrs.push(raw.link(4 + i));
        }

        Ok(Self {
            header: raw.header.clone(),
            name_addr: raw.link(0),
            unit_addr: raw.link(1),
            comment_addr: raw.link(2),
            inverse_addr: raw.link(3),
            ref_addrs,
            kind,
            precision,
            flags,
            value_count,
            phys_range_min,
            phys_range_max,
            values,
            name: None,
            unit: None,
            refs: Vec::new(),
        })
    }
}

impl ConversionBlock {
    /// Serializes the block to its variable-length on-disk form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let link_count = 4 + self.ref_addrs.len();
        let length =
            crate::v4::blocks::common::HEADER_SIZE + link_count * 8 + CC_PAYLOAD_FIXED
                + self.values.len() * 8;

        let header = BlockHeader::new("##CC", length as u64, link_count as u64);
        let mut buffer = Vec::with_capacity(length);

        buffer.extend_from_slice(&header.to_bytes()?);

        buffer.extend_from_slice(&self.name_addr.to_le_bytes());
        buffer.extend_from_slice(&self.unit_addr.to_le_bytes());
        buffer.extend_from_slice(&self.comment_addr.to_le_bytes());
        buffer.extend_from_slice(&self.inverse_addr.to_le_bytes());
        for addr in &self.ref_addrs {
            buffer.extend_from_slice(&addr.to_le_bytes());
        }

        buffer.push(self.kind.to_u8());
        buffer.push(self.precision);
        buffer.extend_from_slice(&self.flags.to_le_bytes());
        buffer.extend_from_slice(&(self.ref_addrs.len() as u16).to_le_bytes());
        buffer.extend_from_slice(&(self.values.len() as u16).to_le_bytes());
        buffer.extend_from_slice(&self.phys_range_min.to_le_bytes());
        buffer.extend_from_slice(&self.phys_range_max.to_le_bytes());
        for value in &self.values {
            buffer.extend_from_slice(&value.to_le_bytes());
        }

        debug_assert_aligned(buffer.len());
        Ok(buffer)
    }

    /// Linear conversion with the given offset and factor (phys = p0 + p1*x).
    pub fn linear(offset: f64, factor: f64) -> Self {
        Self {
            kind: ConversionKind::Linear,
            value_count: 2,
            values: vec![offset, factor],
            ..Self::default()
        }
    }
}

impl Default for ConversionBlock {
    fn default() -> Self {
        Self {
            header: BlockHeader::new(
                "##CC",
                (crate::v4::blocks::common::HEADER_SIZE + 4 * 8 + CC_PAYLOAD_FIXED) as u64,
                4,
            ),
            name_addr: 0,
            unit_addr: 0,
            comment_addr: 0,
            inverse_addr: 0,
            ref_addrs: Vec::new(),
            kind: ConversionKind::Identity,
            precision: 0,
            flags: 0,
            value_count: 0,
            phys_range_min: 0.0,
            phys_range_max: 0.0,
            values: Vec::new(),
            name: None,
            unit: None,
            refs: Vec::new(),
        }
    }
}
