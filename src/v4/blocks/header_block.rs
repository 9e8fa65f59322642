use crate::v4::blocks::common::{
    BlockDecode, BlockHeader, RawBlock, debug_assert_aligned, read_i16, read_u8, read_u64,
};
use crate::Result;

/// Header block size (104 bytes) - file-level metadata after identification.
pub const HD_BLOCK_SIZE: usize = 104;

/// Header Block (##HD) - root of the block graph.
///
/// Located at file offset 64, directly after the identification block. Its
/// links anchor the data group chain and the file history chain.
#[derive(Debug, Clone)]
pub struct HeaderBlock {
    pub header: BlockHeader,
    /// Link to first data group block.
    pub first_dg_addr: u64,
    /// Link to first file history block.
    pub file_history_addr: u64,
    /// Link to channel hierarchy tree (unused here).
    pub channel_tree_addr: u64,
    /// Link to first attachment block (unused here).
    pub first_attachment_addr: u64,
    /// Link to first event block (unused here).
    pub first_event_addr: u64,
    /// Link to comment text/metadata block.
    pub comment_addr: u64,
    /// Absolute start time in nanoseconds since Jan 1, 1970 (UTC).
    pub abs_time: u64,
    /// Timezone offset from UTC in minutes.
    pub tz_offset: i16,
    /// Daylight saving time offset in minutes.
    pub daylight_save_time: i16,
    pub time_flags: u8,
    pub time_quality: u8,
    pub flags: u8,
    pub start_angle: u64,
    pub start_distance: u64,
}

impl BlockDecode for HeaderBlock {
    const ID: &'static str = "##HD";

    fn decode(raw: &RawBlock) -> Result<Self> {
        raw.require_payload(32)?;
        let p = &raw.payload;

        Ok(Self {
            header: raw.header.clone(),
            first_dg_addr: raw.link(0),
            file_history_addr: raw.link(1),
            channel_tree_addr: raw.link(2),
            first_attachment_addr: raw.link(3),
            first_event_addr: raw.link(4),
            comment_addr: raw.link(5),
            abs_time: read_u64(p, 0),
            tz_offset: read_i16(p, 8),
            daylight_save_time: read_i16(p, 10),
            time_flags: read_u8(p, 12),
            time_quality: read_u8(p, 13),
            flags: read_u8(p, 14),
            // byte 15: reserved
            start_angle: read_u64(p, 16),
            start_distance: read_u64(p, 24),
        })
    }
}

impl HeaderBlock {
    /// Serializes the block to its 104-byte on-disk form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(HD_BLOCK_SIZE);

        buffer.extend_from_slice(&self.header.to_bytes()?);

        // Links (48 bytes)
        buffer.extend_from_slice(&self.first_dg_addr.to_le_bytes());
        buffer.extend_from_slice(&self.file_history_addr.to_le_bytes());
        buffer.extend_from_slice(&self.channel_tree_addr.to_le_bytes());
        buffer.extend_from_slice(&self.first_attachment_addr.to_le_bytes());
        buffer.extend_from_slice(&self.first_event_addr.to_le_bytes());
        buffer.extend_from_slice(&self.comment_addr.to_le_bytes());

        // Time section (16 bytes)
        buffer.extend_from_slice(&self.abs_time.to_le_bytes());
        buffer.extend_from_slice(&self.tz_offset.to_le_bytes());
        buffer.extend_from_slice(&self.daylight_save_time.to_le_bytes());
        buffer.push(self.time_flags);
        buffer.push(self.time_quality);
        buffer.push(self.flags);
        buffer.push(0); // reserved

        // Angle/distance section (16 bytes)
        buffer.extend_from_slice(&self.start_angle.to_le_bytes());
        buffer.extend_from_slice(&self.start_distance.to_le_bytes());

        debug_assert_aligned(buffer.len());
        Ok(buffer)
    }
}

impl Default for HeaderBlock {
    fn default() -> Self {
        Self {
            header: BlockHeader::new("##HD", HD_BLOCK_SIZE as u64, 6),
            first_dg_addr: 0,
            file_history_addr: 0,
            channel_tree_addr: 0,
            first_attachment_addr: 0,
            first_event_addr: 0,
            comment_addr: 0,
            abs_time: 0,
            tz_offset: 0,
            daylight_save_time: 0,
            time_flags: 0,
            time_quality: 0,
            flags: 0,
            start_angle: 0,
            start_distance: 0,
        }
    }
}
