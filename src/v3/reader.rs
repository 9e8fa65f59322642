//! v3 block graph reading and raw data region streaming.
//!
//! v3 has no framed data blocks: the record stream sits naked at the data
//! group's data address and its extent is derived from the channel groups'
//! cycle counts and record sizes.

use std::collections::BTreeSet;

use crate::cache::PageCache;
use crate::layout::{ByteOrder, ChannelLayout, ChannelRole, DataGroupLayout, GroupLayout};
use crate::source::ByteSource;
use crate::v3::blocks::common::{BlockDecode, BlockHeader, HEADER_SIZE};
use crate::v3::blocks::{
    ChannelBlock, ChannelGroupBlock, DataGroupBlock, HeaderBlock, TextBlock,
};
use crate::{Error, Result};

/// File offset of the header block, directly after the identification block.
pub const HD_ADDR: u32 = 64;

/// Slice size used when streaming the raw record region.
const DATA_CHUNK_SIZE: u64 = 64 * 1024;

/// Framed-block reader over the page cache, bound to the file's byte order.
pub struct BlockReader<S: ByteSource> {
    cache: PageCache<S>,
    order: ByteOrder,
}

impl<S: ByteSource> BlockReader<S> {
    pub fn new(source: S, order: ByteOrder) -> Self {
        Self {
            cache: PageCache::new(source),
            order,
        }
    }

    pub fn with_cache(cache: PageCache<S>, order: ByteOrder) -> Self {
        Self { cache, order }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Cache access counters.
    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.cache.stats()
    }

    /// Read and deserialize the block at `addr`, validating its identifier.
    pub fn read_block<B: BlockDecode>(&mut self, addr: u32) -> Result<B> {
        let header_bytes = self.cache.read_bytes(addr as u64, HEADER_SIZE as u64)?;
        let header = BlockHeader::from_bytes(&header_bytes, self.order)?;
        if header.id != B::ID {
            return Err(Error::BlockIdError {
                actual: header.id,
                expected: String::from(B::ID),
            });
        }

        let bytes = self.cache.read_bytes(addr as u64, header.length as u64)?;
        if bytes.len() < header.length as usize {
            return Err(Error::TooShortBuffer {
                actual: bytes.len(),
                expected: header.length as usize,
                file: file!(),
                line: line!(),
            });
        }
        B::decode(&bytes, self.order)
    }

    /// Resolve a text link, `None` for a null link.
    pub fn read_text(&mut self, addr: u32) -> Result<Option<String>> {
        if addr == 0 {
            return Ok(None);
        }
        let tx: TextBlock = self.read_block(addr)?;
        Ok(Some(tx.text))
    }
}

/// A channel group with its resolved channel chain.
#[derive(Debug, Clone)]
pub struct ChannelGroup {
    pub block: ChannelGroupBlock,
    pub channels: Vec<ChannelBlock>,
}

/// A data group with its resolved channel group chain.
#[derive(Debug, Clone)]
pub struct DataGroup {
    pub block: DataGroupBlock,
    pub channel_groups: Vec<ChannelGroup>,
}

impl DataGroup {
    /// Width of the record ID prefix in bytes (0 or 1).
    fn record_id_width(&self) -> u8 {
        if self.block.record_id_count == 0 { 0 } else { 1 }
    }

    /// With `record_id_count` 2, every record repeats its ID byte at the
    /// end; folding it into the invalidation region makes the demultiplexer
    /// skip it.
    fn trailing_id_bytes(&self) -> u32 {
        if self.block.record_id_count == 2 { 1 } else { 0 }
    }

    /// Normalized record layout of this data group.
    pub fn layout(&self, default_order: ByteOrder) -> DataGroupLayout {
        let groups = self
            .channel_groups
            .iter()
            .map(|cg| GroupLayout {
                name: cg.block.comment.clone(),
                record_id: cg.block.record_id as u64,
                data_len: cg.block.record_size as u32,
                invalidation_len: self.trailing_id_bytes(),
                cycle_count: cg.block.cycle_count as u64,
                channels: cg
                    .channels
                    .iter()
                    .filter_map(|cn| channel_layout(cn, default_order))
                    .collect(),
            })
            .collect();
        DataGroupLayout {
            record_id_width: self.record_id_width(),
            groups,
        }
    }

    /// Total byte extent of the raw record region.
    pub fn data_len(&self) -> u64 {
        let framing = self.record_id_width() as u64 + self.trailing_id_bytes() as u64;
        self.channel_groups
            .iter()
            .map(|cg| cg.block.cycle_count as u64 * (cg.block.record_size as u64 + framing))
            .sum()
    }
}

fn channel_layout(cn: &ChannelBlock, default_order: ByteOrder) -> Option<ChannelLayout> {
    let (kind, endian) = cn.numeric_kind(default_order)?;
    let bit_position = cn.bit_position();
    Some(ChannelLayout {
        name: cn.name.clone(),
        role: if cn.is_master() {
            ChannelRole::Time
        } else {
            ChannelRole::Signal
        },
        kind,
        endian,
        byte_offset: bit_position / 8,
        bit_offset: (bit_position % 8) as u8,
        bit_count: cn.bit_count as u32,
    })
}

/// The fully resolved block graph of a v3 file.
#[derive(Debug, Clone)]
pub struct V3File {
    pub header: HeaderBlock,
    pub data_groups: Vec<DataGroup>,
}

/// Register a chain element, failing on a revisit.
fn check_chain(visited: &mut BTreeSet<u32>, addr: u32) -> Result<()> {
    if !visited.insert(addr) {
        return Err(Error::BlockLinkError(format!(
            "cyclic block chain at offset {addr:#x}"
        )));
    }
    Ok(())
}

/// Walk the whole block graph starting at the header block.
pub fn load_graph<S: ByteSource>(reader: &mut BlockReader<S>) -> Result<V3File> {
    let header: HeaderBlock = reader.read_block(HD_ADDR)?;

    let mut data_groups = Vec::new();
    let mut visited = BTreeSet::new();
    let mut dg_addr = header.first_dg_addr;
    while dg_addr != 0 {
        check_chain(&mut visited, dg_addr)?;
        let dg: DataGroupBlock = reader.read_block(dg_addr)?;
        let channel_groups = load_channel_groups(reader, dg.first_cg_addr)?;
        dg_addr = dg.next_dg_addr;
        data_groups.push(DataGroup {
            block: dg,
            channel_groups,
        });
    }

    Ok(V3File {
        header,
        data_groups,
    })
}

fn load_channel_groups<S: ByteSource>(
    reader: &mut BlockReader<S>,
    first_cg_addr: u32,
) -> Result<Vec<ChannelGroup>> {
    let mut channel_groups = Vec::new();
    let mut visited = BTreeSet::new();
    let mut cg_addr = first_cg_addr;
    while cg_addr != 0 {
        check_chain(&mut visited, cg_addr)?;
        let mut cg: ChannelGroupBlock = reader.read_block(cg_addr)?;
        cg.comment = reader.read_text(cg.comment_addr)?;
        let channels = load_channels(reader, cg.first_cn_addr)?;
        cg_addr = cg.next_cg_addr;
        channel_groups.push(ChannelGroup {
            block: cg,
            channels,
        });
    }
    Ok(channel_groups)
}

fn load_channels<S: ByteSource>(
    reader: &mut BlockReader<S>,
    first_cn_addr: u32,
) -> Result<Vec<ChannelBlock>> {
    let mut channels = Vec::new();
    let mut visited = BTreeSet::new();
    let mut cn_addr = first_cn_addr;
    while cn_addr != 0 {
        check_chain(&mut visited, cn_addr)?;
        let mut cn: ChannelBlock = reader.read_block(cn_addr)?;
        if let Some(long_name) = reader.read_text(cn.long_name_addr)? {
            cn.name = long_name;
        }
        if cn.conversion_addr != 0 {
            cn.conversion = Some(reader.read_block(cn.conversion_addr)?);
        }
        cn_addr = cn.next_cn_addr;
        channels.push(cn);
    }
    Ok(channels)
}

/// The raw record region streamed in fixed-size slices through the cache.
pub struct DataChunks<'r, S: ByteSource> {
    reader: &'r mut BlockReader<S>,
    offset: u64,
    remaining: u64,
}

impl<'r, S: ByteSource> DataChunks<'r, S> {
    pub fn new(reader: &'r mut BlockReader<S>, data_addr: u32, data_len: u64) -> Self {
        Self {
            reader,
            offset: data_addr as u64,
            remaining: if data_addr == 0 { 0 } else { data_len },
        }
    }

    /// Pull the next slice, `None` when the region is exhausted.
    pub fn next(&mut self) -> Result<Option<Vec<u8>>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let take = self.remaining.min(DATA_CHUNK_SIZE);
        let bytes = self.reader.cache.read_bytes(self.offset, take)?;
        if bytes.is_empty() {
            // Region declared past the end of the file.
            self.remaining = 0;
            return Ok(None);
        }
        self.offset += bytes.len() as u64;
        self.remaining -= bytes.len() as u64;
        Ok(Some(bytes))
    }
}
