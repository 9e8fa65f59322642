//! Error types for MDF decoding and streaming.
//!
//! This module defines the [`Error`] enum which represents all failures that
//! can occur while walking the block graph, decoding records, or writing
//! files. Schema-extension short reads (optional trailing fields missing from
//! an older-revision block) are deliberately NOT errors; deserializers return
//! early with defaults in that case.

use core::fmt;

/// Errors that can occur during MDF file operations.
#[derive(Debug)]
pub enum Error {
    /// Buffer provided for parsing was too small.
    ///
    /// This typically indicates file corruption or an incomplete read.
    TooShortBuffer {
        /// Actual number of bytes available
        actual: usize,
        /// Minimum number of bytes required
        expected: usize,
        /// Source file where the error was detected
        file: &'static str,
        /// Line number where the error was detected
        line: u32,
    },

    /// The file does not start with the "MDF     " identifier.
    InvalidFileHeader(String),

    /// The numeric version is outside the supported [300,500) range.
    UnsupportedVersion(u16),

    /// A block identifier did not match the expected value.
    ///
    /// Every block starts with an ASCII identifier ("##HD" in v4, "HD" in
    /// v3). A mismatch indicates structural corruption and is fatal.
    BlockIdError {
        /// The identifier that was found
        actual: String,
        /// The identifier(s) that were expected
        expected: String,
    },

    /// A record ID read from the data stream is not registered with any
    /// channel group of the data group. Aborts the streaming operation.
    UnknownRecordId {
        /// The offending record ID
        record_id: u64,
    },

    /// Two channel groups within one data group declare the same record ID.
    /// Detected before any rows are decoded.
    DuplicateRecordId {
        /// The colliding record ID
        record_id: u64,
    },

    /// A channel requests a bit layout the extractor cannot serve, e.g. an
    /// unaligned or odd-width float field.
    UnsupportedBitLayout {
        /// Bit offset within the first byte
        bit_offset: u8,
        /// Field width in bits
        bit_count: u32,
    },

    /// An I/O error occurred while reading or writing the file.
    IoError(std::io::Error),

    /// Failed to link blocks together, or a link chain is malformed
    /// (e.g. a cyclic next-pointer chain).
    BlockLinkError(String),

    /// Failed to serialize a block to bytes.
    BlockSerializationError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TooShortBuffer {
                actual,
                expected,
                file,
                line,
            } => write!(
                f,
                "Buffer too small at {file}:{line}: need at least {expected} bytes, got {actual}"
            ),
            Error::InvalidFileHeader(id) => {
                write!(
                    f,
                    r#"Invalid file identifier: expected "MDF     ", found {id:?}"#
                )
            }
            Error::UnsupportedVersion(ver) => {
                write!(f, "Unsupported MDF version {ver}: expected 3.x or 4.x")
            }
            Error::BlockIdError { actual, expected } => {
                write!(
                    f,
                    "Invalid block identifier: expected {expected:?}, got {actual:?}"
                )
            }
            Error::UnknownRecordId { record_id } => {
                write!(f, "Unknown record ID {record_id} in data stream")
            }
            Error::DuplicateRecordId { record_id } => {
                write!(
                    f,
                    "Record ID {record_id} is used by more than one channel group"
                )
            }
            Error::UnsupportedBitLayout {
                bit_offset,
                bit_count,
            } => write!(
                f,
                "Unsupported bit layout: bit offset {bit_offset}, bit count {bit_count}"
            ),
            Error::IoError(e) => write!(f, "I/O error: {e}"),
            Error::BlockLinkError(s) => write!(f, "Block linking error: {s}"),
            Error::BlockSerializationError(s) => write!(f, "Block serialization error: {s}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

/// A specialized Result type for MDF operations.
pub type Result<T> = core::result::Result<T, Error>;
