use crate::v4::blocks::common::{
    BlockDecode, BlockHeader, HEADER_SIZE, RawBlock, padding_to_align_8, read_u8, read_u32,
    read_u64,
};
use crate::{Error, Result};

/// Data Table Block (##DT) - a fragment of the raw record stream.
///
/// The payload is opaque at this layer; record framing happens in the
/// demultiplexer.
#[derive(Debug, Clone)]
pub struct DataBlock {
    pub header: BlockHeader,
    pub data: Vec<u8>,
}

impl BlockDecode for DataBlock {
    const ID: &'static str = "##DT";

    fn decode(raw: &RawBlock) -> Result<Self> {
        Ok(Self {
            header: raw.header.clone(),
            data: raw.payload.clone(),
        })
    }
}

impl DataBlock {
    /// Create a data block holding the given record bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            header: BlockHeader::new("##DT", (HEADER_SIZE + data.len()) as u64, 0),
            data,
        }
    }

    /// Serializes the block. Record streams are not internally aligned, so
    /// the writer pads the file position after the block, not the block.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(HEADER_SIZE + self.data.len());
        buffer.extend_from_slice(&self.header.to_bytes()?);
        buffer.extend_from_slice(&self.data);
        Ok(buffer)
    }

    /// Bytes of padding the writer emits after this block.
    pub fn trailing_padding(&self) -> usize {
        padding_to_align_8(self.data.len())
    }
}

impl Default for DataBlock {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Compression algorithm tag of a ##DZ block (dz_zip_type).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZipType {
    /// Plain deflate stream.
    Deflate,
    /// Deflate of a byte-transposed record matrix.
    TransposedDeflate,
    Unknown(u8),
}

impl ZipType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ZipType::Deflate,
            1 => ZipType::TransposedDeflate,
            other => ZipType::Unknown(other),
        }
    }
}

/// Compressed Data Block (##DZ) - a deflated ##DT (or ##SD/##RD) fragment.
#[derive(Debug, Clone)]
pub struct CompressedDataBlock {
    pub header: BlockHeader,
    /// Block type of the uncompressed content ("DT" for record streams).
    pub orig_type: [u8; 2],
    pub zip_type: ZipType,
    /// Column count of the transposition matrix (transposed deflate only).
    pub zip_param: u32,
    /// Uncompressed byte length.
    pub orig_len: u64,
    /// Compressed byte length.
    pub compressed_len: u64,
    pub compressed: Vec<u8>,
}

impl BlockDecode for CompressedDataBlock {
    const ID: &'static str = "##DZ";

    fn decode(raw: &RawBlock) -> Result<Self> {
        raw.require_payload(24)?;
        let p = &raw.payload;

        // The declared length is file-controlled; compare against the
        // payload instead of computing 24 + len, which can overflow.
        let compressed_len = read_u64(p, 16);
        if compressed_len > (p.len() - 24) as u64 {
            return Err(Error::TooShortBuffer {
                actual: p.len(),
                expected: usize::try_from(compressed_len.saturating_add(24))
                    .unwrap_or(usize::MAX),
                file: file!(),
                line: line!(),
            });
        }

        Ok(Self {
            header: raw.header.clone(),
            orig_type: [p[0], p[1]],
            zip_type: ZipType::from_u8(read_u8(p, 2)),
            // payload byte 3: reserved
            zip_param: read_u32(p, 4),
            orig_len: read_u64(p, 8),
            compressed_len,
            compressed: p[24..24 + compressed_len as usize].to_vec(),
        })
    }
}

#[cfg(feature = "compression")]
impl CompressedDataBlock {
    /// Inflate the fragment back to its original bytes, undoing the byte
    /// transposition where the block declares one.
    pub fn decompress(&self) -> Result<Vec<u8>> {
        let inflated = miniz_oxide::inflate::decompress_to_vec_zlib(&self.compressed)
            .map_err(|e| {
                Error::IoError(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("deflate stream error: {e}"),
                ))
            })?;

        if inflated.len() as u64 != self.orig_len {
            return Err(Error::TooShortBuffer {
                actual: inflated.len(),
                expected: self.orig_len as usize,
                file: file!(),
                line: line!(),
            });
        }

        match self.zip_type {
            ZipType::Deflate => Ok(inflated),
            ZipType::TransposedDeflate => Ok(untranspose(&inflated, self.zip_param as usize)),
            ZipType::Unknown(t) => Err(Error::IoError(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unknown compression type {t}"),
            ))),
        }
    }
}

/// Undo the column-major byte transposition applied before deflation.
/// Only the leading whole matrix is transposed; a partial trailing row is
/// stored untouched.
#[cfg(feature = "compression")]
fn untranspose(data: &[u8], cols: usize) -> Vec<u8> {
    if cols <= 1 || data.len() < cols {
        return data.to_vec();
    }
    let rows = data.len() / cols;
    let body = rows * cols;
    let mut out = Vec::with_capacity(data.len());
    for r in 0..rows {
        for c in 0..cols {
            out.push(data[c * rows + r]);
        }
    }
    out.extend_from_slice(&data[body..]);
    out
}

#[cfg(test)]
mod decode_tests {
    use super::*;

    #[test]
    fn absurd_compressed_length_is_rejected() {
        let mut payload = vec![0u8; 32];
        payload[0..2].copy_from_slice(b"DT");
        payload[16..24].copy_from_slice(&u64::MAX.to_le_bytes());
        let raw = RawBlock {
            addr: 0,
            header: BlockHeader::new("##DZ", (HEADER_SIZE + payload.len()) as u64, 0),
            links: Vec::new(),
            payload,
        };
        assert!(matches!(
            CompressedDataBlock::decode(&raw),
            Err(Error::TooShortBuffer { .. })
        ));
    }
}
