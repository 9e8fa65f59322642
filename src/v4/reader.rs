//! v4 block graph reading: generic block framing, chain traversal,
//! conversion resolution, and data chunk gathering.
//!
//! The graph load is atomic: [`load_graph`] either returns a fully resolved
//! [`V4File`] or the first structural error, before any record data is
//! exposed.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;

use crate::cache::{CacheStats, PageCache};
use crate::layout::{ChannelLayout, ChannelRole, DataGroupLayout, GroupLayout};
use crate::source::ByteSource;
use crate::v4::blocks::common::{BlockDecode, BlockHeader, HEADER_SIZE, RawBlock, decode_string};
use crate::v4::blocks::{
    ChannelBlock, ChannelGroupBlock, CompressedDataBlock, ConversionBlock, ConversionRef,
    DataGroupBlock, DataListBlock, FileHistoryBlock, HeaderBlock, HeaderListBlock,
};
use crate::{Error, Result};

/// File offset of the header block, directly after the identification block.
pub const HD_ADDR: u64 = 64;

/// Generic framed-block reader over the page cache.
pub struct BlockReader<S: ByteSource> {
    cache: PageCache<S>,
}

impl<S: ByteSource> BlockReader<S> {
    pub fn new(source: S) -> Self {
        Self {
            cache: PageCache::new(source),
        }
    }

    pub fn with_cache(cache: PageCache<S>) -> Self {
        Self { cache }
    }

    /// Cache access counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn source_len(&self) -> u64 {
        self.cache.source_len()
    }

    /// Read the 24-byte block header at `addr`.
    pub fn read_header(&mut self, addr: u64) -> Result<BlockHeader> {
        let bytes = self.cache.read_bytes(addr, HEADER_SIZE as u64)?;
        BlockHeader::from_bytes(&bytes)
    }

    /// Read the whole block at `addr` and split it into header, link array
    /// and payload.
    pub fn read_raw(&mut self, addr: u64) -> Result<RawBlock> {
        let header = self.read_header(addr)?;
        // link_count is file-controlled; saturating math keeps an absurd
        // value an error instead of an overflow.
        let min_length = header
            .link_count
            .saturating_mul(8)
            .saturating_add(HEADER_SIZE as u64);
        if header.length < min_length {
            return Err(Error::TooShortBuffer {
                actual: header.length as usize,
                expected: usize::try_from(min_length).unwrap_or(usize::MAX),
                file: file!(),
                line: line!(),
            });
        }
        let body = self
            .cache
            .read_bytes(addr + HEADER_SIZE as u64, header.length - HEADER_SIZE as u64)?;
        if (body.len() as u64) < header.length - HEADER_SIZE as u64 {
            return Err(Error::TooShortBuffer {
                actual: HEADER_SIZE + body.len(),
                expected: usize::try_from(header.length).unwrap_or(usize::MAX),
                file: file!(),
                line: line!(),
            });
        }
        // The body covers the declared length, so the link array fits in it.
        let link_bytes = header.link_count as usize * 8;

        let mut links = Vec::with_capacity(header.link_count as usize);
        for i in 0..header.link_count as usize {
            links.push(u64::from_le_bytes(body[i * 8..i * 8 + 8].try_into().unwrap()));
        }

        Ok(RawBlock {
            addr,
            header,
            links,
            payload: body[link_bytes..].to_vec(),
        })
    }

    /// Read and deserialize the block at `addr`, validating its identifier.
    pub fn read_block<B: BlockDecode>(&mut self, addr: u64) -> Result<B> {
        let raw = self.read_raw(addr)?;
        if raw.header.id != B::ID {
            return Err(Error::BlockIdError {
                actual: raw.header.id,
                expected: String::from(B::ID),
            });
        }
        B::decode(&raw)
    }

    /// Like [`read_block`](Self::read_block) but short-circuits on a null
    /// link.
    pub fn read_optional<B: BlockDecode>(&mut self, addr: u64) -> Result<Option<B>> {
        if addr == 0 {
            return Ok(None);
        }
        self.read_block(addr).map(Some)
    }

    /// Resolve a text link: the contents of a ##TX or ##MD block, `None` for
    /// a null link.
    pub fn read_text(&mut self, addr: u64) -> Result<Option<String>> {
        if addr == 0 {
            return Ok(None);
        }
        let raw = self.read_raw(addr)?;
        match raw.header.id.as_str() {
            "##TX" | "##MD" => Ok(Some(decode_string(&raw.payload))),
            other => Err(Error::BlockIdError {
                actual: String::from(other),
                expected: String::from("##TX or ##MD"),
            }),
        }
    }
}

/// Register a chain element, failing on a revisit.
fn check_chain(visited: &mut BTreeSet<u64>, addr: u64) -> Result<()> {
    if !visited.insert(addr) {
        return Err(Error::BlockLinkError(format!(
            "cyclic block chain at offset {addr:#x}"
        )));
    }
    Ok(())
}

/// Memoizing resolver for the conversion sub-graph.
///
/// Conversions are keyed by file offset; a block referenced from several
/// channels (or nested under several parents) decodes exactly once and is
/// shared via `Rc`.
pub struct ConversionResolver {
    resolved: BTreeMap<u64, Rc<ConversionBlock>>,
    /// Addresses currently on the descent stack, for cycle detection.
    in_progress: BTreeSet<u64>,
    decodes: u64,
}

impl ConversionResolver {
    pub fn new() -> Self {
        Self {
            resolved: BTreeMap::new(),
            in_progress: BTreeSet::new(),
            decodes: 0,
        }
    }

    /// Number of ##CC blocks actually decoded so far.
    pub fn decode_count(&self) -> u64 {
        self.decodes
    }

    /// Resolve the conversion at `addr` with its name, unit and references.
    pub fn resolve<S: ByteSource>(
        &mut self,
        reader: &mut BlockReader<S>,
        addr: u64,
    ) -> Result<Option<Rc<ConversionBlock>>> {
        if addr == 0 {
            return Ok(None);
        }
        if let Some(conversion) = self.resolved.get(&addr) {
            return Ok(Some(Rc::clone(conversion)));
        }
        if !self.in_progress.insert(addr) {
            return Err(Error::BlockLinkError(format!(
                "cyclic conversion reference at offset {addr:#x}"
            )));
        }

        let result = self.resolve_uncached(reader, addr);
        self.in_progress.remove(&addr);

        let conversion = Rc::new(result?);
        self.resolved.insert(addr, Rc::clone(&conversion));
        Ok(Some(conversion))
    }

    fn resolve_uncached<S: ByteSource>(
        &mut self,
        reader: &mut BlockReader<S>,
        addr: u64,
    ) -> Result<ConversionBlock> {
        let mut conversion: ConversionBlock = reader.read_block(addr)?;
        self.decodes += 1;

        conversion.name = reader.read_text(conversion.name_addr)?;
        conversion.unit = reader.read_text(conversion.unit_addr)?;

        let ref_addrs = conversion.ref_addrs.clone();
        for ref_addr in ref_addrs {
            if ref_addr == 0 {
                continue;
            }
            let header = reader.read_header(ref_addr)?;
            match header.id.as_str() {
                "##CC" => {
                    // resolve() is Some here: ref_addr is non-null.
                    if let Some(nested) = self.resolve(reader, ref_addr)? {
                        conversion.refs.push(ConversionRef::Nested(nested));
                    }
                }
                "##TX" | "##MD" => {
                    let raw = reader.read_raw(ref_addr)?;
                    conversion
                        .refs
                        .push(ConversionRef::Text(decode_string(&raw.payload)));
                }
                other => {
                    return Err(Error::BlockIdError {
                        actual: String::from(other),
                        expected: String::from("##CC, ##TX or ##MD"),
                    });
                }
            }
        }
        Ok(conversion)
    }
}

impl Default for ConversionResolver {
    fn default() -> Self {
        Self::new()
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
    /// Normalized record layout of this data group, the input to the
    /// demultiplexer. Channels whose data type has no numeric rendition
    /// (strings, byte arrays) are left out.
    pub fn layout(&self) -> DataGroupLayout {
        let groups = self
            .channel_groups
            .iter()
            .map(|cg| GroupLayout {
                name: cg.block.acq_name.clone(),
                record_id: cg.block.record_id,
                data_len: cg.block.data_bytes,
                invalidation_len: cg.block.invalidation_bytes,
                cycle_count: cg.block.cycle_count,
                channels: cg.channels.iter().filter_map(channel_layout).collect(),
            })
            .collect();
        DataGroupLayout {
            record_id_width: self.block.record_id_size,
            groups,
        }
    }
}

fn channel_layout(cn: &ChannelBlock) -> Option<ChannelLayout> {
    // Only fixed-length and master channels occupy record bytes directly.
    if cn.channel_type != 0 && !cn.is_master() {
        return None;
    }
    let (kind, endian) = cn.data_type.numeric_kind()?;
    Some(ChannelLayout {
        name: cn.name.clone().unwrap_or_default(),
        role: if cn.is_master() {
            ChannelRole::Time
        } else {
            ChannelRole::Signal
        },
        kind,
        endian,
        byte_offset: cn.byte_offset,
        bit_offset: cn.bit_offset,
        bit_count: cn.bit_count,
    })
}

/// The fully resolved block graph of a v4 file.
#[derive(Debug, Clone)]
pub struct V4File {
    pub header: HeaderBlock,
    pub file_histories: Vec<FileHistoryBlock>,
    pub data_groups: Vec<DataGroup>,
    /// Number of distinct conversion blocks decoded during the load.
    pub conversion_decodes: u64,
}

/// Walk the whole block graph starting at the header block.
pub fn load_graph<S: ByteSource>(reader: &mut BlockReader<S>) -> Result<V4File> {
    let header: HeaderBlock = reader.read_block(HD_ADDR)?;

    let mut file_histories = Vec::new();
    let mut visited = BTreeSet::new();
    let mut fh_addr = header.file_history_addr;
    while fh_addr != 0 {
        check_chain(&mut visited, fh_addr)?;
        let mut fh: FileHistoryBlock = reader.read_block(fh_addr)?;
        fh.comment = reader.read_text(fh.comment_addr)?;
        fh_addr = fh.next_fh_addr;
        file_histories.push(fh);
    }

    let mut conversions = ConversionResolver::new();
    let mut data_groups = Vec::new();
    let mut visited = BTreeSet::new();
    let mut dg_addr = header.first_dg_addr;
    while dg_addr != 0 {
        check_chain(&mut visited, dg_addr)?;
        let dg: DataGroupBlock = reader.read_block(dg_addr)?;
        let channel_groups = load_channel_groups(reader, &mut conversions, dg.first_cg_addr)?;
        dg_addr = dg.next_dg_addr;
        data_groups.push(DataGroup {
            block: dg,
            channel_groups,
        });
    }

    Ok(V4File {
        header,
        file_histories,
        data_groups,
        conversion_decodes: conversions.decode_count(),
    })
}

fn load_channel_groups<S: ByteSource>(
    reader: &mut BlockReader<S>,
    conversions: &mut ConversionResolver,
    first_cg_addr: u64,
) -> Result<Vec<ChannelGroup>> {
    let mut channel_groups = Vec::new();
    let mut visited = BTreeSet::new();
    let mut cg_addr = first_cg_addr;
    while cg_addr != 0 {
        check_chain(&mut visited, cg_addr)?;
        let mut cg: ChannelGroupBlock = reader.read_block(cg_addr)?;
        cg.acq_name = reader.read_text(cg.acq_name_addr)?;
        let channels = load_channels(reader, conversions, cg.first_cn_addr)?;
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
    conversions: &mut ConversionResolver,
    first_cn_addr: u64,
) -> Result<Vec<ChannelBlock>> {
    let mut channels = Vec::new();
    let mut visited = BTreeSet::new();
    let mut cn_addr = first_cn_addr;
    while cn_addr != 0 {
        check_chain(&mut visited, cn_addr)?;
        let mut cn: ChannelBlock = reader.read_block(cn_addr)?;
        cn.name = reader.read_text(cn.name_addr)?;
        cn.conversion = conversions.resolve(reader, cn.conversion_addr)?;
        cn_addr = cn.next_cn_addr;
        channels.push(cn);
    }
    Ok(channels)
}

/// Lazy, ordered sequence of uncompressed record-stream chunks behind a data
/// group's data link.
///
/// Dispatches on the linked block's tag: a single ##DT or ##DZ, a ##DL chain
/// of fragments, or a ##HL prefix in front of the first ##DL. Fragments are
/// read (and inflated) one at a time as the consumer pulls.
pub struct DataChunks<'r, S: ByteSource> {
    reader: &'r mut BlockReader<S>,
    fragments: VecDeque<u64>,
    next_dl: u64,
    visited: BTreeSet<u64>,
}

impl<'r, S: ByteSource> DataChunks<'r, S> {
    pub fn new(reader: &'r mut BlockReader<S>, data_addr: u64) -> Result<Self> {
        let mut chunks = Self {
            reader,
            fragments: VecDeque::new(),
            next_dl: 0,
            visited: BTreeSet::new(),
        };
        if data_addr == 0 {
            return Ok(chunks);
        }

        let header = chunks.reader.read_header(data_addr)?;
        match header.id.as_str() {
            "##DT" | "##DZ" => chunks.fragments.push_back(data_addr),
            "##DL" => chunks.load_list(data_addr)?,
            "##HL" => {
                let hl: HeaderListBlock = chunks.reader.read_block(data_addr)?;
                if hl.first_dl_addr != 0 {
                    chunks.load_list(hl.first_dl_addr)?;
                }
            }
            other => {
                return Err(Error::BlockIdError {
                    actual: String::from(other),
                    expected: String::from("##DT, ##DZ, ##DL or ##HL"),
                });
            }
        }
        Ok(chunks)
    }

    /// Pull the next chunk, `None` when the fragment sequence is exhausted.
    pub fn next(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(addr) = self.fragments.pop_front() {
                return self.read_fragment(addr).map(Some);
            }
            if self.next_dl == 0 {
                return Ok(None);
            }
            let addr = self.next_dl;
            self.next_dl = 0;
            self.load_list(addr)?;
        }
    }

    fn load_list(&mut self, addr: u64) -> Result<()> {
        check_chain(&mut self.visited, addr)?;
        let dl: DataListBlock = self.reader.read_block(addr)?;
        self.fragments
            .extend(dl.data_addrs.iter().copied().filter(|&a| a != 0));
        self.next_dl = dl.next_dl_addr;
        Ok(())
    }

    fn read_fragment(&mut self, addr: u64) -> Result<Vec<u8>> {
        let raw = self.reader.read_raw(addr)?;
        match raw.header.id.as_str() {
            "##DT" => Ok(raw.payload),
            "##DZ" => {
                let dz = CompressedDataBlock::decode(&raw)?;
                #[cfg(feature = "compression")]
                {
                    dz.decompress()
                }
                #[cfg(not(feature = "compression"))]
                {
                    let _ = dz;
                    Err(Error::IoError(std::io::Error::new(
                        std::io::ErrorKind::Unsupported,
                        "compressed data block requires the \"compression\" feature",
                    )))
                }
            }
            other => Err(Error::BlockIdError {
                actual: String::from(other),
                expected: String::from("##DT or ##DZ"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::v4::blocks::TextBlock;
    use crate::v4::blocks::data_block::DataBlock;

    /// Place pre-serialized blocks at fixed offsets in an in-memory file.
    fn file_with(blocks: &[(u64, Vec<u8>)]) -> Vec<u8> {
        let end = blocks
            .iter()
            .map(|(addr, bytes)| *addr as usize + bytes.len())
            .max()
            .unwrap_or(64);
        let mut buf = vec![0u8; end];
        for (addr, bytes) in blocks {
            buf[*addr as usize..*addr as usize + bytes.len()].copy_from_slice(bytes);
        }
        buf
    }

    #[test]
    fn cyclic_data_group_chain_is_detected() {
        let hd = HeaderBlock {
            first_dg_addr: 168,
            ..Default::default()
        };
        let dg = DataGroupBlock {
            next_dg_addr: 168, // points back at itself
            ..Default::default()
        };
        let file = file_with(&[(64, hd.to_bytes().unwrap()), (168, dg.to_bytes().unwrap())]);
        let mut reader = BlockReader::new(file);
        assert!(matches!(
            load_graph(&mut reader),
            Err(Error::BlockLinkError(_))
        ));
    }

    #[test]
    fn shared_conversion_decodes_once() {
        // HD -> DG -> CG -> CN1 -> CN2, both channels referencing one ##CC.
        let tx_addr = 64 + 104;
        let cc_addr = tx_addr + 32;
        let cn2_addr = cc_addr + 120;
        let cn1_addr = cn2_addr + 160;
        let cg_addr = cn1_addr + 160;
        let dg_addr = cg_addr + 104;

        let hd = HeaderBlock {
            first_dg_addr: dg_addr,
            ..Default::default()
        };
        let tx = TextBlock::new("rpm");
        let mut cc = ConversionBlock::linear(0.0, 0.5);
        cc.unit_addr = tx_addr;
        let make_cn = |next: u64| ChannelBlock {
            next_cn_addr: next,
            conversion_addr: cc_addr,
            bit_count: 8,
            ..Default::default()
        };
        let cg = ChannelGroupBlock {
            first_cn_addr: cn1_addr,
            data_bytes: 1,
            ..Default::default()
        };
        let dg = DataGroupBlock {
            first_cg_addr: cg_addr,
            ..Default::default()
        };

        let file = file_with(&[
            (64, hd.to_bytes().unwrap()),
            (tx_addr, tx.to_bytes().unwrap()),
            (cc_addr, cc.to_bytes().unwrap()),
            (cn2_addr, make_cn(0).to_bytes().unwrap()),
            (cn1_addr, make_cn(cn2_addr).to_bytes().unwrap()),
            (cg_addr, cg.to_bytes().unwrap()),
            (dg_addr, dg.to_bytes().unwrap()),
        ]);

        let mut reader = BlockReader::new(file);
        let graph = load_graph(&mut reader).unwrap();
        assert_eq!(graph.conversion_decodes, 1);

        let channels = &graph.data_groups[0].channel_groups[0].channels;
        let c1 = channels[0].conversion.as_ref().unwrap();
        let c2 = channels[1].conversion.as_ref().unwrap();
        assert!(Rc::ptr_eq(c1, c2));
        assert_eq!(c1.unit.as_deref(), Some("rpm"));
    }

    #[test]
    fn data_list_chunks_come_back_in_order() {
        let dt1 = DataBlock::new(vec![1, 2, 3, 4]);
        let dt2 = DataBlock::new(vec![5, 6]);
        let dt1_addr = 64;
        let dt2_addr = 96;
        let dl = DataListBlock {
            next_dl_addr: 0,
            data_addrs: vec![dt1_addr, dt2_addr],
            flags: crate::v4::blocks::DL_FLAG_EQUAL_LENGTH,
            equal_length: 4,
            ..Default::default()
        };
        let dl_addr = 128;

        let file = file_with(&[
            (dt1_addr, dt1.to_bytes().unwrap()),
            (dt2_addr, dt2.to_bytes().unwrap()),
            (dl_addr, dl.to_bytes().unwrap()),
        ]);
        let mut reader = BlockReader::new(file);
        let mut chunks = DataChunks::new(&mut reader, dl_addr).unwrap();
        assert_eq!(chunks.next().unwrap(), Some(vec![1, 2, 3, 4]));
        assert_eq!(chunks.next().unwrap(), Some(vec![5, 6]));
        assert_eq!(chunks.next().unwrap(), None);
    }

    #[test]
    fn absurd_link_count_is_rejected() {
        let header = BlockHeader::new("##DG", 64, u64::MAX);
        let file = file_with(&[(64, header.to_bytes().unwrap())]);
        let mut reader = BlockReader::new(file);
        assert!(matches!(
            reader.read_raw(64),
            Err(Error::TooShortBuffer { .. })
        ));
    }

    #[test]
    fn null_data_link_yields_no_chunks() {
        let mut reader = BlockReader::new(vec![0u8; 64]);
        let mut chunks = DataChunks::new(&mut reader, 0).unwrap();
        assert_eq!(chunks.next().unwrap(), None);
    }
}
