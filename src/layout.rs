//! Version-independent layout of a data group's record stream.
//!
//! The v3 and v4 readers both normalize their block graphs into these types,
//! which is all the record decoding engine needs to know: where each channel
//! sits inside a record, how records are tagged, and how many rows to expect.
//!
//! With the `serde` feature the layout types serialize, so a host application
//! can persist a file's layout and skip the graph walk on reopen.

use crate::{Error, Result};

/// Byte order of a channel's raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

/// Numeric kind of a channel's raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FieldKind {
    UnsignedInt,
    SignedInt,
    Float,
}

/// Role a channel plays within its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChannelRole {
    /// Master/time channel of the group.
    Time,
    /// Ordinary measured signal.
    Signal,
    /// Anything else (virtual channels, unrecognized types).
    Unknown,
}

/// One channel's position and numeric interpretation within a record.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelLayout {
    /// Qualified channel name.
    pub name: String,
    /// Role of the channel (time vs signal).
    pub role: ChannelRole,
    /// Numeric kind of the raw value.
    pub kind: FieldKind,
    /// Byte order of the raw value.
    pub endian: ByteOrder,
    /// Byte offset of the field within the record data (after the record ID).
    pub byte_offset: u32,
    /// Bit offset within the first byte, normalized to 0..8.
    pub bit_offset: u8,
    /// Field width in bits.
    pub bit_count: u32,
}

/// One channel group: a record layout plus its channels.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupLayout {
    /// Group name, if the file carries one.
    pub name: Option<String>,
    /// Record ID tagging records of this group in the stream.
    pub record_id: u64,
    /// Length of the record's data portion in bytes (excluding record ID).
    pub data_len: u32,
    /// Trailing invalidation bytes per record.
    pub invalidation_len: u32,
    /// Declared number of records, used to stop streaming early.
    pub cycle_count: u64,
    /// Channels of this group.
    pub channels: Vec<ChannelLayout>,
}

impl GroupLayout {
    /// Total record body length in bytes (data plus invalidation bytes,
    /// without the record ID prefix).
    pub fn record_len(&self) -> usize {
        self.data_len as usize + self.invalidation_len as usize
    }
}

/// One data group: a record stream shared by one or more channel groups.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DataGroupLayout {
    /// Width of the leading record ID in bytes (0, 1, 2, 4 or 8).
    /// 0 means the stream holds a single implicit record type.
    pub record_id_width: u8,
    /// Channel groups sharing this stream.
    pub groups: Vec<GroupLayout>,
}

impl DataGroupLayout {
    /// Validate the record-ID uniqueness invariant.
    ///
    /// Must be called before any rows are decoded; a collision is a hard
    /// error per the format.
    pub fn validate(&self) -> Result<()> {
        for (i, group) in self.groups.iter().enumerate() {
            for other in &self.groups[i + 1..] {
                if group.record_id == other.record_id {
                    return Err(Error::DuplicateRecordId {
                        record_id: group.record_id,
                    });
                }
            }
        }
        Ok(())
    }

    /// Largest record body length across all groups, zero when the data
    /// group has no channel groups.
    pub fn max_record_len(&self) -> usize {
        self.groups
            .iter()
            .map(GroupLayout::record_len)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(feature = "serde")]
impl DataGroupLayout {
    /// Serialize the layout to JSON, so a host application can persist it
    /// and skip the graph walk on reopen.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Rebuild a layout from its JSON form.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
