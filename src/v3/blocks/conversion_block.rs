use crate::layout::ByteOrder;
use crate::v3::blocks::common::{
    BlockDecode, BlockHeader, decode_string, read_f64, read_u16, read_u32, validate_buffer_size,
};
use crate::{Error, Result};

/// Start of the parameter area within a CC block.
const CC_PARAMS_OFFSET: usize = 46;

/// Conversion type tag (cc_conversion_type, u16).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConversionKind {
    /// phys = p0 + p1 * raw.
    Linear,
    /// Value-to-value table with interpolation.
    TabInterp,
    /// Value-to-value table without interpolation.
    Tab,
    /// 6-parameter polynomial.
    Polynomial,
    /// 7-parameter exponential.
    Exponential,
    /// 7-parameter logarithmic.
    Logarithmic,
    /// 6-parameter rational.
    Rational,
    /// Formula text.
    Formula,
    /// Value-to-text table.
    TextTable,
    /// Value-range-to-text table.
    TextRangeTable,
    Date,
    Time,
    /// 1:1, physical value equals raw value.
    Identity,
    Unknown(u16),
}

impl ConversionKind {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => ConversionKind::Linear,
            1 => ConversionKind::TabInterp,
            2 => ConversionKind::Tab,
            6 => ConversionKind::Polynomial,
            7 => ConversionKind::Exponential,
            8 => ConversionKind::Logarithmic,
            9 => ConversionKind::Rational,
            10 => ConversionKind::Formula,
            11 => ConversionKind::TextTable,
            12 => ConversionKind::TextRangeTable,
            132 => ConversionKind::Date,
            133 => ConversionKind::Time,
            65535 => ConversionKind::Identity,
            other => ConversionKind::Unknown(other),
        }
    }

    /// Parameter count a fixed-arity kind requires.
    fn fixed_arity(self) -> Option<usize> {
        match self {
            ConversionKind::Linear => Some(2),
            ConversionKind::Polynomial | ConversionKind::Rational => Some(6),
            ConversionKind::Exponential | ConversionKind::Logarithmic => Some(7),
            _ => None,
        }
    }
}

/// Decoded parameter area of a conversion.
#[derive(Debug, Clone)]
pub enum ConversionData {
    /// Numeric parameters of fixed-arity and value-table kinds.
    Params(Vec<f64>),
    /// Formula text.
    Formula(String),
    /// (raw value, text) pairs.
    TextTable(Vec<(f64, String)>),
    /// (lower, upper, text block link) triples.
    TextRangeTable(Vec<(f64, f64, u32)>),
    /// Identity, date/time and unknown kinds carry no usable parameters.
    None,
}

/// Conversion Block (CC) - raw-to-physical conversion parameters.
///
/// Unknown conversion kinds are not an error; they decode with
/// [`ConversionData::None`] and behave as identity downstream.
#[derive(Debug, Clone)]
pub struct ConversionBlock {
    pub header: BlockHeader,
    pub range_valid: bool,
    pub min_value: f64,
    pub max_value: f64,
    /// Physical unit, inline 20-character field.
    pub unit: String,
    pub kind: ConversionKind,
    pub param_count: u16,
    pub data: ConversionData,
}

impl BlockDecode for ConversionBlock {
    const ID: &'static str = "CC";

    fn decode(bytes: &[u8], order: ByteOrder) -> Result<Self> {
        validate_buffer_size(bytes, CC_PARAMS_OFFSET)?;

        let kind = ConversionKind::from_u16(read_u16(bytes, 42, order));
        let param_count = read_u16(bytes, 44, order);
        let data = decode_params(bytes, order, kind, param_count)?;

        Ok(Self {
            header: BlockHeader::from_bytes(bytes, order)?,
            range_valid: read_u16(bytes, 4, order) != 0,
            min_value: read_f64(bytes, 6, order),
            max_value: read_f64(bytes, 14, order),
            unit: decode_string(&bytes[22..42]),
            kind,
            param_count,
            data,
        })
    }
}

fn decode_params(
    bytes: &[u8],
    order: ByteOrder,
    kind: ConversionKind,
    param_count: u16,
) -> Result<ConversionData> {
    let n = param_count as usize;

    if let Some(arity) = kind.fixed_arity() {
        if n < arity {
            return Err(Error::TooShortBuffer {
                actual: CC_PARAMS_OFFSET + n * 8,
                expected: CC_PARAMS_OFFSET + arity * 8,
                file: file!(),
                line: line!(),
            });
        }
        return Ok(ConversionData::Params(read_f64_array(bytes, order, arity)?));
    }

    match kind {
        // Value tables store n (raw, phys) pairs.
        ConversionKind::TabInterp | ConversionKind::Tab => {
            Ok(ConversionData::Params(read_f64_array(bytes, order, n * 2)?))
        }
        ConversionKind::Formula => {
            let end = bytes.len().min(CC_PARAMS_OFFSET + 256);
            Ok(ConversionData::Formula(decode_string(
                &bytes[CC_PARAMS_OFFSET..end],
            )))
        }
        ConversionKind::TextTable => {
            validate_buffer_size(bytes, CC_PARAMS_OFFSET + n * 40)?;
            let mut entries = Vec::with_capacity(n);
            for i in 0..n {
                let base = CC_PARAMS_OFFSET + i * 40;
                entries.push((
                    read_f64(bytes, base, order),
                    decode_string(&bytes[base + 8..base + 40]),
                ));
            }
            Ok(ConversionData::TextTable(entries))
        }
        ConversionKind::TextRangeTable => {
            validate_buffer_size(bytes, CC_PARAMS_OFFSET + n * 20)?;
            let mut entries = Vec::with_capacity(n);
            for i in 0..n {
                let base = CC_PARAMS_OFFSET + i * 20;
                entries.push((
                    read_f64(bytes, base, order),
                    read_f64(bytes, base + 8, order),
                    read_u32(bytes, base + 16, order),
                ));
            }
            Ok(ConversionData::TextRangeTable(entries))
        }
        _ => Ok(ConversionData::None),
    }
}

fn read_f64_array(bytes: &[u8], order: ByteOrder, count: usize) -> Result<Vec<f64>> {
    validate_buffer_size(bytes, CC_PARAMS_OFFSET + count * 8)?;
    let mut values = Vec::with_capacity(count);
    for i in 0..count {
        values.push(read_f64(bytes, CC_PARAMS_OFFSET + i * 8, order));
    }
    Ok(values)
}
