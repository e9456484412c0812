//! Tiled texture descriptions and derived tile indexing

pub mod layout;

pub use layout::{
    TextureDesc, TextureImageKind, TextureLayout, TileCoord, TiledLevelDesc, TiledTextureDesc,
};
