use crate::v4::blocks::common::{
    BlockDecode, BlockHeader, RawBlock, debug_assert_aligned, read_i16, read_u8, read_u64,
};
use crate::Result;

/// File history block size (56 bytes).
pub const FH_BLOCK_SIZE: usize = 56;

/// File History Block (##FH) - one entry of the change log chain.
///
/// Every writing tool appends an entry; the comment link points to an ##MD
/// block describing the change.
#[derive(Debug, Clone)]
pub struct FileHistoryBlock {
    pub header: BlockHeader,
    /// Link to next file history block (0 if last).
    pub next_fh_addr: u64,
    /// Link to the change description (##MD).
    pub comment_addr: u64,
    /// Change time in nanoseconds since Jan 1, 1970 (UTC).
    pub time_ns: u64,
    /// Timezone offset from UTC in minutes.
    pub tz_offset: i16,
    /// Daylight saving time offset in minutes.
    pub daylight_save_time: i16,
    pub time_flags: u8,
    /// Resolved change description.
    pub comment: Option<String>,
}

impl BlockDecode for FileHistoryBlock {
    const ID: &'static str = "##FH";

    fn decode(raw: &RawBlock) -> Result<Self> {
        raw.require_payload(13)?;
        let p = &raw.payload;

        Ok(Self {
            header: raw.header.clone(),
            next_fh_addr: raw.link(0),
            comment_addr: raw.link(1),
            time_ns: read_u64(p, 0),
            tz_offset: read_i16(p, 8),
            daylight_save_time: read_i16(p, 10),
            time_flags: read_u8(p, 12),
            // payload bytes 13..16: reserved
            comment: None,
        })
    }
}

impl FileHistoryBlock {
    /// Serializes the block to its 56-byte on-disk form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(FH_BLOCK_SIZE);

        buffer.extend_from_slice(&self.header.to_bytes()?);

        buffer.extend_from_slice(&self.next_fh_addr.to_le_bytes());
        buffer.extend_from_slice(&self.comment_addr.to_le_bytes());

        buffer.extend_from_slice(&self.time_ns.to_le_bytes());
        buffer.extend_from_slice(&self.tz_offset.to_le_bytes());
        buffer.extend_from_slice(&self.daylight_save_time.to_le_bytes());
        buffer.push(self.time_flags);
        buffer.extend_from_slice(&[0u8; 3]); // reserved

        debug_assert_aligned(buffer.len());
        Ok(buffer)
    }
}

impl Default for FileHistoryBlock {
    fn default() -> Self {
        Self {
            header: BlockHeader::new("##FH", FH_BLOCK_SIZE as u64, 2),
            next_fh_addr: 0,
            comment_addr: 0,
            time_ns: 0,
            tz_offset: 0,
            daylight_save_time: 0,
            time_flags: 0,
            comment: None,
        }
    }
}
