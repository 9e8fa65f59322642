//! Typed deserializers for the MDF v4 block graph.

pub mod channel_block;
pub mod channel_group_block;
pub mod common;
pub mod conversion_block;
pub mod data_block;
pub mod data_group_block;
pub mod data_list_block;
pub mod file_history_block;
pub mod header_block;
pub mod text_block;

pub use channel_block::{ChannelBlock, DataType, CN_BLOCK_SIZE};
pub use channel_group_block::{ChannelGroupBlock, CG_BLOCK_SIZE};
pub use common::{BlockDecode, BlockHeader, RawBlock, HEADER_SIZE};
pub use conversion_block::{ConversionBlock, ConversionKind, ConversionRef};
pub use data_block::{CompressedDataBlock, DataBlock, ZipType};
pub use data_group_block::{DataGroupBlock, DG_BLOCK_SIZE};
pub use data_list_block::{DataListBlock, HeaderListBlock, DL_FLAG_EQUAL_LENGTH, HL_BLOCK_SIZE};
pub use file_history_block::{FileHistoryBlock, FH_BLOCK_SIZE};
pub use header_block::{HeaderBlock, HD_BLOCK_SIZE};
pub use text_block::TextBlock;
