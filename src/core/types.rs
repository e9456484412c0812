//! Shared identifier types

/// Global tile identity: a texture id paired with a dense tile index.
///
/// Tile indices start with regular tiles ordered by increasing mip level
/// (finest first), row-major within a mip, followed by packed tiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureTile {
    pub texture_id: u32,
    pub tile_index: u32,
}

impl TextureTile {
    pub fn new(texture_id: u32, tile_index: u32) -> Self {
        Self {
            texture_id,
            tile_index,
        }
    }
}
