//! MDF version 4.x: little-endian block graph with 24-byte block headers.

pub mod blocks;
pub mod reader;

pub use reader::{BlockReader, ConversionResolver, DataChunks, V4File, load_graph};
