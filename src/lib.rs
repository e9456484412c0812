//! Tilestream - CPU-side residency management for sparse tiled textures

pub mod alloc;
pub mod core;
pub mod streaming;
pub mod texture;

pub use crate::alloc::{HeapSlot, TileAllocator};
pub use crate::core::error::Error;
pub use crate::core::types::TextureTile;
pub use crate::streaming::manager::{
    ResidencyConfig, ResidencyManager, ResidencyManagerDesc, Statistics,
};
pub use crate::streaming::state::TileState;
pub use crate::texture::layout::{
    TextureDesc, TextureImageKind, TextureLayout, TileCoord, TiledLevelDesc, TiledTextureDesc,
};
