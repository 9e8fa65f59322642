//! Per-channel record decoding.
//!
//! A [`ValueDecoder`] is built once per channel from its static layout and
//! reused for every record, so the per-record work is a single match on a
//! precomputed plan: a direct fixed-width load when the field is byte
//! aligned, or a widened fold-shift-mask extraction for bit-packed fields.
//!
//! Values up to 53 significant bits are represented as `f64` (exact for
//! integers in that range); wider integer fields keep an exact 64-bit
//! representation, since a double cannot hold them.

use crate::layout::{ByteOrder, ChannelLayout, ChannelRole, FieldKind};
use crate::{Error, Result};

/// Number representation chosen for a channel's output sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SampleKind {
    /// Double precision; used for floats and integers of at most 53 bits.
    Double,
    /// Exact signed 64-bit; integers wider than 53 bits.
    Signed64,
    /// Exact unsigned 64-bit; integers wider than 53 bits.
    Unsigned64,
}

/// One decoded value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    Double(f64),
    Signed(i64),
    Unsigned(u64),
}

/// Extraction plan computed once per channel.
#[derive(Debug, Clone, Copy)]
enum Plan {
    /// Byte-aligned integer of standard width (1, 2, 4 or 8 bytes).
    Aligned {
        offset: usize,
        width: usize,
        endian: ByteOrder,
        signed: bool,
    },
    /// Byte-aligned IEEE float (4 or 8 bytes).
    Float {
        offset: usize,
        width: usize,
        endian: ByteOrder,
    },
    /// Bit-packed integer: fold the spanned bytes, shift to the field's
    /// least significant bit, mask to the field width.
    Packed {
        offset: usize,
        span: usize,
        bit_offset: u32,
        bit_count: u32,
        endian: ByteOrder,
        signed: bool,
    },
}

/// Decodes one channel's raw value out of a record's data bytes.
#[derive(Debug, Clone, Copy)]
pub struct ValueDecoder {
    plan: Plan,
    kind: SampleKind,
}

impl ValueDecoder {
    /// Build the extraction plan for a channel.
    ///
    /// Fails with [`Error::UnsupportedBitLayout`] for floats that are not
    /// byte-aligned 32/64-bit fields, and for zero-width or over-wide
    /// integer fields.
    pub fn new(channel: &ChannelLayout) -> Result<Self> {
        let bit_offset = channel.bit_offset as u32;
        let bit_count = channel.bit_count;
        let offset = channel.byte_offset as usize;

        if bit_count == 0 || bit_count > 64 {
            return Err(Error::UnsupportedBitLayout {
                bit_offset: channel.bit_offset,
                bit_count,
            });
        }

        match channel.kind {
            FieldKind::Float => {
                if bit_offset != 0 || (bit_count != 32 && bit_count != 64) {
                    return Err(Error::UnsupportedBitLayout {
                        bit_offset: channel.bit_offset,
                        bit_count,
                    });
                }
                Ok(Self {
                    plan: Plan::Float {
                        offset,
                        width: bit_count as usize / 8,
                        endian: channel.endian,
                    },
                    kind: SampleKind::Double,
                })
            }
            FieldKind::UnsignedInt | FieldKind::SignedInt => {
                let signed = channel.kind == FieldKind::SignedInt;
                let kind = if bit_count <= 53 {
                    SampleKind::Double
                } else if signed {
                    SampleKind::Signed64
                } else {
                    SampleKind::Unsigned64
                };
                let aligned =
                    bit_offset == 0 && matches!(bit_count, 8 | 16 | 32 | 64);
                let plan = if aligned {
                    Plan::Aligned {
                        offset,
                        width: bit_count as usize / 8,
                        endian: channel.endian,
                        signed,
                    }
                } else {
                    Plan::Packed {
                        offset,
                        span: ((bit_offset + bit_count) as usize).div_ceil(8),
                        bit_offset,
                        bit_count,
                        endian: channel.endian,
                        signed,
                    }
                };
                Ok(Self { plan, kind })
            }
        }
    }

    /// Number representation of the samples this decoder produces.
    pub fn sample_kind(&self) -> SampleKind {
        self.kind
    }

    /// Extract the channel's value from a record's data bytes (record ID
    /// already stripped).
    pub fn decode(&self, record: &[u8]) -> Result<Sample> {
        match self.plan {
            Plan::Aligned {
                offset,
                width,
                endian,
                signed,
            } => {
                let bytes = field_bytes(record, offset, width)?;
                let raw = fold(bytes, endian);
                Ok(self.finish_int(raw, width as u32 * 8, signed))
            }
            Plan::Float {
                offset,
                width,
                endian,
            } => {
                let bytes = field_bytes(record, offset, width)?;
                let raw = fold(bytes, endian);
                let value = if width == 4 {
                    f32::from_bits(raw as u32) as f64
                } else {
                    f64::from_bits(raw)
                };
                Ok(Sample::Double(value))
            }
            Plan::Packed {
                offset,
                span,
                bit_offset,
                bit_count,
                endian,
                signed,
            } => {
                let bytes = field_bytes(record, offset, span)?;
                // Widened accumulate: up to 9 bytes can span a 64-bit field
                // at a non-zero bit offset.
                let wide: u128 = match endian {
                    ByteOrder::LittleEndian => bytes
                        .iter()
                        .rev()
                        .fold(0u128, |acc, &b| (acc << 8) | b as u128),
                    ByteOrder::BigEndian => {
                        bytes.iter().fold(0u128, |acc, &b| (acc << 8) | b as u128)
                    }
                };
                let mask = if bit_count >= 64 {
                    u64::MAX as u128
                } else {
                    (1u128 << bit_count) - 1
                };
                let raw = ((wide >> bit_offset) & mask) as u64;
                Ok(self.finish_int(raw, bit_count, signed))
            }
        }
    }

    /// Apply sign extension and pick the output representation.
    fn finish_int(&self, raw: u64, bit_count: u32, signed: bool) -> Sample {
        if !signed {
            return match self.kind {
                SampleKind::Double => Sample::Double(raw as f64),
                _ => Sample::Unsigned(raw),
            };
        }
        let value = sign_extend(raw, bit_count);
        match self.kind {
            SampleKind::Double => Sample::Double(value as f64),
            _ => Sample::Signed(value),
        }
    }
}

/// Two's-complement sign extension of a `bit_count`-wide value.
fn sign_extend(raw: u64, bit_count: u32) -> i64 {
    if bit_count >= 64 {
        return raw as i64;
    }
    let sign_bit = 1u64 << (bit_count - 1);
    if raw & sign_bit != 0 {
        let mask = (1u64 << bit_count) - 1;
        (raw as i64) | !(mask as i64)
    } else {
        raw as i64
    }
}

fn field_bytes(record: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    if offset + len > record.len() {
        return Err(Error::TooShortBuffer {
            actual: record.len(),
            expected: offset + len,
            file: file!(),
            line: line!(),
        });
    }
    Ok(&record[offset..offset + len])
}

fn fold(bytes: &[u8], endian: ByteOrder) -> u64 {
    match endian {
        ByteOrder::LittleEndian => bytes
            .iter()
            .rev()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64),
        ByteOrder::BigEndian => bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64),
    }
}

/// Growable per-channel output sequence, tagged with its representation.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesValues {
    Double(Vec<f64>),
    Signed(Vec<i64>),
    Unsigned(Vec<u64>),
}

impl SeriesValues {
    /// Empty sequence of the given kind.
    pub fn new(kind: SampleKind) -> Self {
        match kind {
            SampleKind::Double => SeriesValues::Double(Vec::new()),
            SampleKind::Signed64 => SeriesValues::Signed(Vec::new()),
            SampleKind::Unsigned64 => SeriesValues::Unsigned(Vec::new()),
        }
    }

    /// Representation tag of this sequence.
    pub fn kind(&self) -> SampleKind {
        match self {
            SeriesValues::Double(_) => SampleKind::Double,
            SeriesValues::Signed(_) => SampleKind::Signed64,
            SeriesValues::Unsigned(_) => SampleKind::Unsigned64,
        }
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        match self {
            SeriesValues::Double(v) => v.len(),
            SeriesValues::Signed(v) => v.len(),
            SeriesValues::Unsigned(v) => v.len(),
        }
    }

    /// Whether the sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `index`, if present.
    pub fn get(&self, index: usize) -> Option<Sample> {
        match self {
            SeriesValues::Double(v) => v.get(index).map(|&x| Sample::Double(x)),
            SeriesValues::Signed(v) => v.get(index).map(|&x| Sample::Signed(x)),
            SeriesValues::Unsigned(v) => v.get(index).map(|&x| Sample::Unsigned(x)),
        }
    }

    /// Append a sample.
    ///
    /// The sample's representation must match the sequence. A sequence is
    /// always created from the [`SampleKind`] of the decoder that feeds it
    /// (see [`ValueDecoder::sample_kind`]), and a decoder's kind is fixed at
    /// construction, so a mismatch means the caller paired a series with
    /// the wrong decoder. Mismatches trip a debug assertion.
    pub fn push(&mut self, sample: Sample) {
        match (self, sample) {
            (SeriesValues::Double(v), Sample::Double(x)) => v.push(x),
            (SeriesValues::Signed(v), Sample::Signed(x)) => v.push(x),
            (SeriesValues::Unsigned(v), Sample::Unsigned(x)) => v.push(x),
            (series, sample) => {
                debug_assert!(false, "sample {sample:?} pushed into {:?} series", series.kind());
            }
        }
    }
}

/// One named output sequence produced by streaming a data group.
#[derive(Debug, Clone)]
pub struct Series {
    /// Channel name.
    pub name: String,
    /// Role of the originating channel.
    pub role: ChannelRole,
    /// Decoded values.
    pub values: SeriesValues,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(
        kind: FieldKind,
        endian: ByteOrder,
        byte_offset: u32,
        bit_offset: u8,
        bit_count: u32,
    ) -> ChannelLayout {
        ChannelLayout {
            name: String::from("ch"),
            role: ChannelRole::Signal,
            kind,
            endian,
            byte_offset,
            bit_offset,
            bit_count,
        }
    }

    /// Place `value & mask` at the given bit position, mirroring the
    /// decoder's fold direction for the chosen byte order.
    fn encode(buf: &mut [u8], endian: ByteOrder, bit_offset: u32, bit_count: u32, value: u64) {
        let mask = if bit_count >= 64 {
            u64::MAX as u128
        } else {
            (1u128 << bit_count) - 1
        };
        let wide = ((value as u128) & mask) << bit_offset;
        let n = buf.len();
        for (i, byte) in buf.iter_mut().enumerate() {
            let shift = match endian {
                ByteOrder::LittleEndian => 8 * i,
                ByteOrder::BigEndian => 8 * (n - 1 - i),
            };
            *byte |= ((wide >> shift) & 0xFF) as u8;
        }
    }

    #[test]
    fn round_trip_all_layouts() {
        for endian in [ByteOrder::LittleEndian, ByteOrder::BigEndian] {
            for bit_offset in 0u8..8 {
                for bit_count in [1u32, 3, 7, 8, 12, 16, 21, 32, 48, 53, 60, 64] {
                    let span = ((bit_offset as u32 + bit_count) as usize).div_ceil(8);
                    let max = if bit_count >= 64 {
                        u64::MAX
                    } else {
                        (1u64 << bit_count) - 1
                    };
                    for value in [0u64, 1, max / 2, max] {
                        let mut buf = vec![0u8; span];
                        encode(&mut buf, endian, bit_offset as u32, bit_count, value);
                        let ch = channel(FieldKind::UnsignedInt, endian, 0, bit_offset, bit_count);
                        let dec = ValueDecoder::new(&ch).unwrap();
                        let got = dec.decode(&buf).unwrap();
                        let expect = if bit_count <= 53 {
                            Sample::Double(value as f64)
                        } else {
                            Sample::Unsigned(value)
                        };
                        assert_eq!(
                            got, expect,
                            "endian={endian:?} bit_offset={bit_offset} bit_count={bit_count} value={value}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn signed_round_trip_preserves_sign() {
        for endian in [ByteOrder::LittleEndian, ByteOrder::BigEndian] {
            for bit_offset in 0u8..8 {
                for bit_count in [2u32, 4, 12, 16, 33, 53, 64] {
                    let min = i64::MIN >> (64 - bit_count);
                    for value in [-1i64, -2, 1, 0, min] {
                        let span = ((bit_offset as u32 + bit_count) as usize).div_ceil(8);
                        let mut buf = vec![0u8; span];
                        encode(&mut buf, endian, bit_offset as u32, bit_count, value as u64);
                        let ch = channel(FieldKind::SignedInt, endian, 0, bit_offset, bit_count);
                        let dec = ValueDecoder::new(&ch).unwrap();
                        let got = dec.decode(&buf).unwrap();
                        let expect = if bit_count <= 53 {
                            Sample::Double(value as f64)
                        } else {
                            Sample::Signed(value)
                        };
                        assert_eq!(
                            got, expect,
                            "endian={endian:?} bit_offset={bit_offset} bit_count={bit_count} value={value}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn twelve_bit_signed_minus_one_is_not_4095() {
        let mut buf = vec![0u8; 2];
        encode(&mut buf, ByteOrder::LittleEndian, 0, 12, (-1i64) as u64);
        let ch = channel(FieldKind::SignedInt, ByteOrder::LittleEndian, 0, 0, 12);
        let dec = ValueDecoder::new(&ch).unwrap();
        assert_eq!(dec.decode(&buf).unwrap(), Sample::Double(-1.0));
    }

    #[test]
    fn packed_signed_nibble_from_0xf5() {
        // 0xF5 = 0b1111_0101; the four bits at offset 4 are 0b1111 = -1.
        let ch = channel(FieldKind::SignedInt, ByteOrder::LittleEndian, 0, 4, 4);
        let dec = ValueDecoder::new(&ch).unwrap();
        assert_eq!(dec.decode(&[0xF5]).unwrap(), Sample::Double(-1.0));
    }

    #[test]
    fn wide_integers_keep_exact_representation() {
        let ch = channel(FieldKind::UnsignedInt, ByteOrder::LittleEndian, 0, 0, 64);
        let dec = ValueDecoder::new(&ch).unwrap();
        assert_eq!(dec.sample_kind(), SampleKind::Unsigned64);
        let value = (1u64 << 53) + 1; // not representable as f64
        assert_eq!(
            dec.decode(&value.to_le_bytes()).unwrap(),
            Sample::Unsigned(value)
        );

        let ch = channel(FieldKind::UnsignedInt, ByteOrder::LittleEndian, 0, 0, 53);
        assert_eq!(ValueDecoder::new(&ch).unwrap().sample_kind(), SampleKind::Double);
    }

    #[test]
    fn floats_decode_both_widths() {
        let ch = channel(FieldKind::Float, ByteOrder::LittleEndian, 0, 0, 32);
        let dec = ValueDecoder::new(&ch).unwrap();
        let bytes = 1.5f32.to_le_bytes();
        assert_eq!(dec.decode(&bytes).unwrap(), Sample::Double(1.5));

        let ch = channel(FieldKind::Float, ByteOrder::BigEndian, 0, 0, 64);
        let dec = ValueDecoder::new(&ch).unwrap();
        let bytes = (-2.25f64).to_be_bytes();
        assert_eq!(dec.decode(&bytes).unwrap(), Sample::Double(-2.25));
    }

    #[test]
    fn unaligned_float_is_rejected() {
        let ch = channel(FieldKind::Float, ByteOrder::LittleEndian, 0, 3, 32);
        assert!(matches!(
            ValueDecoder::new(&ch),
            Err(Error::UnsupportedBitLayout { .. })
        ));
        let ch = channel(FieldKind::Float, ByteOrder::LittleEndian, 0, 0, 24);
        assert!(matches!(
            ValueDecoder::new(&ch),
            Err(Error::UnsupportedBitLayout { .. })
        ));
    }

    #[test]
    fn field_at_nonzero_byte_offset() {
        let ch = channel(FieldKind::UnsignedInt, ByteOrder::LittleEndian, 2, 0, 16);
        let dec = ValueDecoder::new(&ch).unwrap();
        let record = [0xAA, 0xBB, 0x34, 0x12];
        assert_eq!(dec.decode(&record).unwrap(), Sample::Double(0x1234 as f64));
    }

    #[test]
    fn series_push_and_query() {
        let mut values = SeriesValues::new(SampleKind::Double);
        values.push(Sample::Double(1.0));
        values.push(Sample::Double(2.0));
        assert_eq!(values.len(), 2);
        assert_eq!(values.get(1), Some(Sample::Double(2.0)));
        assert_eq!(values.get(2), None);
    }
}
