//! Random-access byte sources backing the page cache.
//!
//! Anything that can report its size and serve range reads can back an MDF
//! reader: local files, in-memory buffers, or remote storage adapters
//! implemented by the host application.

use crate::{Error, Result};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// A random-access, length-known byte provider.
///
/// Range reads past the end of the source are clamped by the caller (the
/// page cache); implementations may assume `offset + length` is within
/// bounds and should error otherwise.
pub trait ByteSource {
    /// Total size of the source in bytes.
    fn len(&self) -> u64;

    /// Whether the source is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read `length` bytes starting at `offset`.
    fn read_range(&mut self, offset: u64, length: u64) -> Result<Vec<u8>>;
}

/// Local file implementation of [`ByteSource`].
pub struct FileSource {
    file: std::fs::File,
    size: u64,
}

impl FileSource {
    /// Open the file at `path` and capture its current size.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(Error::IoError)?;
        let size = file.metadata().map_err(Error::IoError)?.len();
        Ok(Self { file, size })
    }
}

impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.size
    }

    fn read_range(&mut self, offset: u64, length: u64) -> Result<Vec<u8>> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(Error::IoError)?;
        let mut buffer = vec![0u8; length as usize];
        self.file
            .read_exact(&mut buffer)
            .map_err(Error::IoError)?;
        Ok(buffer)
    }
}

/// In-memory implementation, used by tests and for files already loaded by
/// the host application.
impl ByteSource for Vec<u8> {
    fn len(&self) -> u64 {
        self.as_slice().len() as u64
    }

    fn read_range(&mut self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let start = offset as usize;
        let end = start + length as usize;
        if end > self.as_slice().len() {
            return Err(Error::TooShortBuffer {
                actual: self.as_slice().len(),
                expected: end,
                file: file!(),
                line: line!(),
            });
        }
        Ok(self[start..end].to_vec())
    }
}
