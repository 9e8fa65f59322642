//! File facade: identification parsing, version dispatch, and streaming
//! reads of whole data groups.

use std::path::Path;

use crate::cache::CacheStats;
use crate::demux::{Control, DEFAULT_PROGRESS_INTERVAL, GroupSeries, RecordDemux};
use crate::layout::{ByteOrder, DataGroupLayout};
use crate::source::{ByteSource, FileSource};
use crate::{Error, Result, v3, v4};

/// Size of the identification block at the start of every file.
pub const ID_BLOCK_SIZE: usize = 64;

/// The 8-byte magic at offset 0.
pub const MDF_MAGIC: &[u8; 8] = b"MDF     ";

/// The parsed 64-byte identification block.
#[derive(Debug, Clone)]
pub struct Identification {
    /// Version string, e.g. "4.10".
    pub version_string: String,
    /// Name of the writing program.
    pub program: String,
    /// Numeric version, e.g. 410 for 4.10.
    pub version: u16,
    /// Default byte order of the file. Fixed to little-endian in v4; v3
    /// files declare it here.
    pub byte_order: ByteOrder,
}

impl Identification {
    /// Parse the identification block, accepting versions in [300, 500).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < ID_BLOCK_SIZE {
            return Err(Error::TooShortBuffer {
                actual: bytes.len(),
                expected: ID_BLOCK_SIZE,
                file: file!(),
                line: line!(),
            });
        }
        if &bytes[0..8] != MDF_MAGIC {
            return Err(Error::InvalidFileHeader(
                String::from_utf8_lossy(&bytes[0..8]).into_owned(),
            ));
        }

        // The byte-order flag is order-independent to read: 0 means
        // little-endian. The numeric version then follows that order.
        let order_flag = u16::from_le_bytes(bytes[24..26].try_into().unwrap());
        let byte_order = if order_flag == 0 {
            ByteOrder::LittleEndian
        } else {
            ByteOrder::BigEndian
        };
        let version_raw: [u8; 2] = bytes[28..30].try_into().unwrap();
        let version = match byte_order {
            ByteOrder::LittleEndian => u16::from_le_bytes(version_raw),
            ByteOrder::BigEndian => u16::from_be_bytes(version_raw),
        };
        if !(300..500).contains(&version) {
            return Err(Error::UnsupportedVersion(version));
        }

        Ok(Self {
            version_string: trimmed_string(&bytes[8..16]),
            program: trimmed_string(&bytes[16..24]),
            version,
            byte_order,
        })
    }

    /// An identification block for a new little-endian file of the given
    /// numeric version.
    pub fn new(version: u16, program: &str) -> Self {
        Self {
            version_string: format!("{}.{:02}", version / 100, version % 100),
            program: String::from(program),
            version,
            byte_order: ByteOrder::LittleEndian,
        }
    }

    /// Serialize to the 64-byte on-disk form (little-endian).
    pub fn to_bytes(&self) -> [u8; ID_BLOCK_SIZE] {
        let mut bytes = [0u8; ID_BLOCK_SIZE];
        bytes[0..8].copy_from_slice(MDF_MAGIC);
        write_padded(&mut bytes[8..16], &self.version_string);
        write_padded(&mut bytes[16..24], &self.program);
        // bytes 24..28: byte order and float format, 0 = little-endian/IEEE
        bytes[28..30].copy_from_slice(&self.version.to_le_bytes());
        bytes
    }

    pub fn is_v4(&self) -> bool {
        self.version >= 400
    }
}

fn trimmed_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end])
        .trim_end()
        .to_owned()
}

fn write_padded(dst: &mut [u8], text: &str) {
    let src = text.as_bytes();
    let n = src.len().min(dst.len());
    dst[..n].copy_from_slice(&src[..n]);
    for b in dst[n..].iter_mut() {
        *b = b' ';
    }
}

/// Options for a streaming read of one data group.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Rows between progress callback invocations.
    pub progress_interval: u64,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

enum Inner<S: ByteSource> {
    V3 {
        reader: v3::BlockReader<S>,
        file: v3::V3File,
    },
    V4 {
        reader: v4::BlockReader<S>,
        file: v4::V4File,
    },
}

/// An opened measurement file.
///
/// The whole block graph is loaded and resolved up front; record data is
/// only touched by the `read_data_group*` methods, which stream it.
pub struct Mdf<S: ByteSource> {
    identification: Identification,
    inner: Inner<S>,
}

impl Mdf<FileSource> {
    /// Open a file from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_source(FileSource::open(path)?)
    }
}

impl<S: ByteSource> Mdf<S> {
    /// Open a file from any byte source.
    pub fn from_source(mut source: S) -> Result<Self> {
        let id_bytes = source.read_range(0, ID_BLOCK_SIZE as u64)?;
        let identification = Identification::from_bytes(&id_bytes)?;

        let inner = if identification.is_v4() {
            let mut reader = v4::BlockReader::new(source);
            let file = v4::load_graph(&mut reader)?;
            Inner::V4 { reader, file }
        } else {
            let mut reader = v3::BlockReader::new(source, identification.byte_order);
            let file = v3::load_graph(&mut reader)?;
            Inner::V3 { reader, file }
        };

        Ok(Self {
            identification,
            inner,
        })
    }

    pub fn identification(&self) -> &Identification {
        &self.identification
    }

    /// Numeric format version, e.g. 410.
    pub fn version(&self) -> u16 {
        self.identification.version
    }

    /// The resolved v4 block graph, when the file is v4.
    pub fn v4(&self) -> Option<&v4::V4File> {
        match &self.inner {
            Inner::V4 { file, .. } => Some(file),
            Inner::V3 { .. } => None,
        }
    }

    /// The resolved v3 block graph, when the file is v3.
    pub fn v3(&self) -> Option<&v3::V3File> {
        match &self.inner {
            Inner::V3 { file, .. } => Some(file),
            Inner::V4 { .. } => None,
        }
    }

    pub fn data_group_count(&self) -> usize {
        match &self.inner {
            Inner::V3 { file, .. } => file.data_groups.len(),
            Inner::V4 { file, .. } => file.data_groups.len(),
        }
    }

    /// Normalized record layouts of all data groups, in file order.
    pub fn data_groups(&self) -> Vec<DataGroupLayout> {
        match &self.inner {
            Inner::V3 { reader, file } => file
                .data_groups
                .iter()
                .map(|dg| dg.layout(reader.byte_order()))
                .collect(),
            Inner::V4 { file, .. } => {
                file.data_groups.iter().map(|dg| dg.layout()).collect()
            }
        }
    }

    /// Decode every record of one data group into per-channel series.
    pub fn read_data_group(&mut self, index: usize) -> Result<Vec<GroupSeries>> {
        let layout = self.layout_at(index)?;
        let demux = RecordDemux::new(&layout)?;
        self.pump(index, demux)
    }

    /// Like [`read_data_group`](Self::read_data_group), reporting cumulative
    /// row counts through `progress` while streaming.
    pub fn read_data_group_with_progress(
        &mut self,
        index: usize,
        options: &ReadOptions,
        progress: impl FnMut(u64),
    ) -> Result<Vec<GroupSeries>> {
        let layout = self.layout_at(index)?;
        let demux =
            RecordDemux::new(&layout)?.with_progress(options.progress_interval, progress);
        self.pump(index, demux)
    }

    /// Cache counters of the underlying page cache.
    pub fn cache_stats(&self) -> CacheStats {
        match &self.inner {
            Inner::V3 { reader, .. } => reader.cache_stats(),
            Inner::V4 { reader, .. } => reader.cache_stats(),
        }
    }

    fn layout_at(&self, index: usize) -> Result<DataGroupLayout> {
        match &self.inner {
            Inner::V3 { reader, file } => file
                .data_groups
                .get(index)
                .map(|dg| dg.layout(reader.byte_order())),
            Inner::V4 { file, .. } => file.data_groups.get(index).map(|dg| dg.layout()),
        }
        .ok_or_else(|| {
            Error::BlockLinkError(format!("data group index {index} out of range"))
        })
    }

    fn pump(&mut self, index: usize, mut demux: RecordDemux<'_>) -> Result<Vec<GroupSeries>> {
        match &mut self.inner {
            Inner::V4 { reader, file } => {
                let data_addr = file.data_groups[index].block.data_block_addr;
                let mut chunks = v4::DataChunks::new(reader, data_addr)?;
                while let Some(chunk) = chunks.next()? {
                    if demux.feed(&chunk)? == Control::Done {
                        break;
                    }
                }
            }
            Inner::V3 { reader, file } => {
                let dg = &file.data_groups[index];
                let data_addr = dg.block.data_addr;
                let data_len = dg.data_len();
                let mut chunks = v3::DataChunks::new(reader, data_addr, data_len);
                while let Some(chunk) = chunks.next()? {
                    if demux.feed(&chunk)? == Control::Done {
                        break;
                    }
                }
            }
        }
        Ok(demux.into_series())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_bytes(version: u16) -> Vec<u8> {
        Identification::new(version, "test").to_bytes().to_vec()
    }

    #[test]
    fn version_410_is_v4() {
        let id = Identification::from_bytes(&id_bytes(410)).unwrap();
        assert!(id.is_v4());
        assert_eq!(id.version_string, "4.10");
    }

    #[test]
    fn version_320_is_v3() {
        let id = Identification::from_bytes(&id_bytes(320)).unwrap();
        assert!(!id.is_v4());
        assert_eq!(id.version, 320);
    }

    #[test]
    fn version_999_is_rejected() {
        let result = Identification::from_bytes(&id_bytes(999));
        assert!(matches!(result, Err(Error::UnsupportedVersion(999))));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = id_bytes(410);
        bytes[0] = b'X';
        assert!(matches!(
            Identification::from_bytes(&bytes),
            Err(Error::InvalidFileHeader(_))
        ));
    }

    #[test]
    fn big_endian_v3_version_field() {
        let mut bytes = id_bytes(330);
        bytes[24..26].copy_from_slice(&[0x00, 0x01]); // byte order flag != 0
        bytes[28..30].copy_from_slice(&330u16.to_be_bytes());
        let id = Identification::from_bytes(&bytes).unwrap();
        assert_eq!(id.version, 330);
        assert_eq!(id.byte_order, ByteOrder::BigEndian);
    }
}
