//! File writing: offset assignment, 8-byte alignment, and after-the-fact
//! link patching.
//!
//! Blocks are serialized with null links first and wired up once their
//! targets' offsets are known, so a file can be emitted in a single forward
//! pass plus point patches.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use crate::mdf::Identification;
use crate::v4::blocks::common::HEADER_SIZE;
use crate::{Error, Result};

/// Default write buffer size (64 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// File offset of link `index` within a v4 block.
pub const fn link_offset(index: usize) -> u64 {
    (HEADER_SIZE + index * 8) as u64
}

/// Forward-writing serializer with a position ledger for link patching.
pub struct MdfWriter<W: Write + Seek> {
    writer: BufWriter<W>,
    offset: u64,
    /// Offsets of previously written blocks, keyed by caller-chosen IDs.
    block_positions: BTreeMap<String, u64>,
}

impl MdfWriter<File> {
    /// Create a writer for the given path with the default buffer size.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::create_with_capacity(path, DEFAULT_BUFFER_SIZE)
    }

    /// Create a writer with an explicit buffer capacity.
    pub fn create_with_capacity<P: AsRef<Path>>(path: P, capacity: usize) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::with_capacity(capacity, file),
            offset: 0,
            block_positions: BTreeMap::new(),
        })
    }
}

impl<W: Write + Seek> MdfWriter<W> {
    /// Wrap any seekable sink.
    pub fn from_writer(inner: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, inner),
            offset: 0,
            block_positions: BTreeMap::new(),
        }
    }

    /// Current write position.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Write the 64-byte identification block. Must be the first write.
    pub fn write_identification(&mut self, identification: &Identification) -> Result<()> {
        if self.offset != 0 {
            return Err(Error::BlockSerializationError(String::from(
                "identification block must be written at offset 0",
            )));
        }
        self.writer.write_all(&identification.to_bytes())?;
        self.offset = crate::mdf::ID_BLOCK_SIZE as u64;
        Ok(())
    }

    /// Write a block, zero-padding the current position to 8-byte alignment
    /// first. Returns the block's starting offset.
    pub fn write_block(&mut self, block_bytes: &[u8]) -> Result<u64> {
        let align = (8 - (self.offset % 8)) % 8;
        if align != 0 {
            self.writer.write_all(&[0u8; 8][..align as usize])?;
            self.offset += align;
        }

        self.writer.write_all(block_bytes)?;
        let block_start = self.offset;
        self.offset += block_bytes.len() as u64;
        Ok(block_start)
    }

    /// Write a block and record its position under `block_id`.
    pub fn write_block_with_id(&mut self, block_bytes: &[u8], block_id: &str) -> Result<u64> {
        let block_start = self.write_block(block_bytes)?;
        self.block_positions
            .insert(String::from(block_id), block_start);
        Ok(block_start)
    }

    /// Position of a previously written block.
    pub fn block_position(&self, block_id: &str) -> Option<u64> {
        self.block_positions.get(block_id).copied()
    }

    /// Overwrite the u64 link at `offset` with `address`.
    pub fn update_link(&mut self, offset: u64, address: u64) -> Result<()> {
        self.writer.seek(SeekFrom::Start(offset))?;
        self.writer.write_all(&address.to_le_bytes())?;
        self.writer.seek(SeekFrom::Start(self.offset))?;
        Ok(())
    }

    /// Patch link number `link_index` of `source_id` to point at `target_id`.
    pub fn update_block_link(
        &mut self,
        source_id: &str,
        link_index: usize,
        target_id: &str,
    ) -> Result<()> {
        let source_pos = self.block_position(source_id).ok_or_else(|| {
            Error::BlockLinkError(format!("source block '{source_id}' not found"))
        })?;
        let target_pos = self.block_position(target_id).ok_or_else(|| {
            Error::BlockLinkError(format!("target block '{target_id}' not found"))
        })?;
        self.update_link(source_pos + link_offset(link_index), target_pos)
    }

    /// Overwrite a u64 field at `field_offset` within `block_id`.
    pub fn update_block_u64(
        &mut self,
        block_id: &str,
        field_offset: u64,
        value: u64,
    ) -> Result<()> {
        let block_pos = self
            .block_position(block_id)
            .ok_or_else(|| Error::BlockLinkError(format!("block '{block_id}' not found")))?;
        self.writer.seek(SeekFrom::Start(block_pos + field_offset))?;
        self.writer.write_all(&value.to_le_bytes())?;
        self.writer.seek(SeekFrom::Start(self.offset))?;
        Ok(())
    }

    /// Flush and return the sink.
    pub fn finish(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| Error::IoError(e.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn blocks_are_aligned_and_gaps_zero_filled() {
        let mut writer = MdfWriter::from_writer(Cursor::new(Vec::new()));
        writer
            .write_identification(&Identification::new(410, "test"))
            .unwrap();
        writer.write_block(&[1, 2, 3]).unwrap(); // odd length
        let second = writer.write_block(&[9; 8]).unwrap();
        assert_eq!(second % 8, 0);

        let bytes = writer.finish().unwrap().into_inner();
        // Padding between the blocks is zeroed.
        assert_eq!(&bytes[67..second as usize], &[0, 0, 0, 0, 0]);
    }

    #[test]
    fn link_patching_by_block_id() {
        let mut writer = MdfWriter::from_writer(Cursor::new(Vec::new()));
        writer
            .write_identification(&Identification::new(410, "test"))
            .unwrap();
        let source = writer.write_block_with_id(&[0u8; 40], "a").unwrap();
        writer.write_block_with_id(&[0u8; 16], "b").unwrap();
        writer.update_block_link("a", 1, "b").unwrap();

        let bytes = writer.finish().unwrap().into_inner();
        let at = (source + link_offset(1)) as usize;
        let link = u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap());
        assert_eq!(link, writer_position(&bytes, source));
    }

    fn writer_position(bytes: &[u8], source: u64) -> u64 {
        // Block "b" starts right after the 40 bytes of "a".
        let b = source + 40;
        assert!(b as usize <= bytes.len());
        b
    }

    #[test]
    fn identification_must_come_first() {
        let mut writer = MdfWriter::from_writer(Cursor::new(Vec::new()));
        writer.write_block(&[0u8; 8]).unwrap();
        assert!(writer
            .write_identification(&Identification::new(410, "test"))
            .is_err());
    }
}
