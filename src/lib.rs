#![forbid(unsafe_code)]

//! # mdf-stream
//!
//! A streaming decoder for ASAM MDF (Measurement Data Format) files,
//! versions 3.x and 4.x.
//!
//! MDF is a binary format for recorded measurement data, common in
//! automotive and industrial data acquisition. A file is a graph of linked
//! blocks (header, data groups, channel groups, channels, conversions)
//! followed by a multiplexed record stream. This crate loads the block
//! graph up front, then streams the record data chunk by chunk through a
//! page cache, so files much larger than memory decode with a bounded
//! footprint.
//!
//! ## Features
//!
//! - **Page-cached reads**: scattered block-graph reads are served from a
//!   small LRU page cache; bulk record reads bypass it.
//! - **Record demultiplexing**: interleaved records of several channel
//!   groups are re-sorted by record ID and decoded row by row, with chunk
//!   boundaries allowed at any byte.
//! - **Bit-exact extraction**: aligned fields take a fast path; arbitrary
//!   bit offsets and widths go through a packed extractor with proper sign
//!   extension. Integers wider than 53 bits keep an exact 64-bit
//!   representation.
//! - **Writing** (secondary): serialize a block graph and record stream,
//!   used mainly to author test files.
//!
//! ## Quick start
//!
//! ```no_run
//! use mdf_stream::{Mdf, Result};
//!
//! fn main() -> Result<()> {
//!     let mut mdf = Mdf::open("recording.mf4")?;
//!     for (index, layout) in mdf.data_groups().iter().enumerate() {
//!         println!("data group {index}: {} channel group(s)", layout.groups.len());
//!     }
//!     let series = mdf.read_data_group(0)?;
//!     for group in &series {
//!         for channel in &group.channels {
//!             println!("{}: {} samples", channel.name, channel.values.len());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod decode;
pub mod demux;
pub mod error;
pub mod layout;
pub mod mdf;
pub mod source;
pub mod v3;
pub mod v4;
pub mod writer;

pub use cache::{CacheStats, PageCache};
pub use decode::{Sample, SampleKind, Series, SeriesValues, ValueDecoder};
pub use demux::{Control, GroupSeries, RecordDemux};
pub use error::{Error, Result};
pub use layout::{ByteOrder, ChannelLayout, ChannelRole, DataGroupLayout, FieldKind, GroupLayout};
pub use mdf::{Identification, Mdf, ReadOptions};
pub use source::{ByteSource, FileSource};
pub use writer::MdfWriter;
