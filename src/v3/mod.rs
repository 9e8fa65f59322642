//! MDF version 3.x: compact block graph with 4-byte block headers and
//! per-file byte order.

pub mod blocks;
pub mod reader;

pub use reader::{BlockReader, DataChunks, V3File, load_graph};
