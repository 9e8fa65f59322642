//! Typed deserializers for the MDF v3 block graph.

pub mod channel_block;
pub mod channel_group_block;
pub mod common;
pub mod conversion_block;
pub mod data_group_block;
pub mod header_block;
pub mod text_block;

pub use channel_block::ChannelBlock;
pub use channel_group_block::ChannelGroupBlock;
pub use common::{BlockDecode, BlockHeader, HEADER_SIZE};
pub use conversion_block::{ConversionBlock, ConversionData, ConversionKind};
pub use data_group_block::DataGroupBlock;
pub use header_block::HeaderBlock;
pub use text_block::TextBlock;
