//! Tile indexing derived once per distinct texture shape
//!
//! A layout captures everything about a texture's tiling that does not
//! change at runtime: per-mip tile ranges, tile-index-to-coordinate
//! tables, the finer-to-coarser tile mapping used for mip-chain
//! propagation, and the sampler-feedback grid geometry. Textures with
//! identical shapes share one layout record.

use serde::{Deserialize, Serialize};

/// Tiling of one regular mip level, supplied by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TiledLevelDesc {
    pub width_in_tiles: u32,
    pub height_in_tiles: u32,
}

/// Caller-supplied description of a tiled texture.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TiledTextureDesc {
    /// Width of the texture in texels
    pub texture_width: u32,
    /// Height of the texture in texels
    pub texture_height: u32,
    /// Tiling of each regular (unpacked) mip level, finest first
    pub regular_mip_levels: Vec<TiledLevelDesc>,
    /// Number of packed mip levels at the tail of the pyramid
    pub packed_mip_levels_num: u32,
    /// Number of tiles backing the packed mip levels
    pub packed_tiles_num: u32,
    /// Width of a tile in texels
    pub tile_width: u32,
    /// Height of a tile in texels
    pub tile_height: u32,
}

/// Position of a tile within its mip grid.
///
/// Packed tiles use `mip_level == regular_mip_levels_num` and carry the
/// packed tile index in `x`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub mip_level: u32,
}

/// Tile-index range of one regular mip level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MipLevelTiling {
    pub first_tile_index: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
}

/// Which auxiliary image a dimension query refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureImageKind {
    /// The sampler feedback image the GPU resolves MinMip data into
    Feedback,
    /// The per-mip0-tile residency image shaders clamp against
    MinMip,
}

/// Dimensions reported for an auxiliary image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub mip_levels_num: u32,
}

/// Immutable per-shape tile indexing, shared across identical textures.
#[derive(Clone, Debug)]
pub struct TextureLayout {
    pub regular_tiles_num: u32,
    pub packed_tiles_num: u32,
    pub regular_mip_levels_num: u32,
    pub packed_mip_levels_num: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub feedback_granularity_x: u32,
    pub feedback_granularity_y: u32,
    pub feedback_tiles_x: u32,
    pub feedback_tiles_y: u32,
    pub mip_level_tilings: Vec<MipLevelTiling>,
    pub tile_index_to_coord: Vec<TileCoord>,
    /// For a regular tile, the tile one mip coarser covering the same
    /// texels; tiles of the last regular mip point at `regular_tiles_num`
    pub tile_index_to_lower_mip_tile_index: Vec<u32>,
}

/// Largest power of two less than or equal to `x`.
fn prev_pow2(x: u32) -> u32 {
    if x == 0 {
        0
    } else {
        1 << (31 - x.leading_zeros())
    }
}

impl TextureLayout {
    pub fn new(desc: &TiledTextureDesc) -> Self {
        let regular_mip_levels_num = desc.regular_mip_levels.len() as u32;

        let mut mip_level_tilings = Vec::with_capacity(desc.regular_mip_levels.len());
        let mut regular_tiles_num = 0u32;
        for level in &desc.regular_mip_levels {
            mip_level_tilings.push(MipLevelTiling {
                first_tile_index: regular_tiles_num,
                tiles_x: level.width_in_tiles,
                tiles_y: level.height_in_tiles,
            });
            regular_tiles_num += level.width_in_tiles * level.height_in_tiles;
        }

        let packed_tiles_num = if desc.packed_mip_levels_num > 0 {
            desc.packed_tiles_num
        } else {
            0
        };
        let tiles_num = regular_tiles_num + packed_tiles_num;

        // Feedback grid: shrink the feedback granule power-of-two-wise
        // until it is no larger than half the texture in each axis
        let half_width = (desc.texture_width / 2).max(1);
        let half_height = (desc.texture_height / 2).max(1);
        let mut feedback_tile_width = desc.tile_width;
        let mut feedback_tile_height = desc.tile_height;
        while feedback_tile_width > half_width {
            feedback_tile_width = prev_pow2(feedback_tile_width - 1);
        }
        while feedback_tile_height > half_height {
            feedback_tile_height = prev_pow2(feedback_tile_height - 1);
        }

        let feedback_granularity_x = desc.tile_width / feedback_tile_width;
        let feedback_granularity_y = desc.tile_height / feedback_tile_height;
        let feedback_tiles_x = desc.texture_width.div_ceil(feedback_tile_width);
        let feedback_tiles_y = desc.texture_height.div_ceil(feedback_tile_height);

        // Tile coordinate tables: regular tiles finest mip first,
        // row-major within a mip, packed tiles after
        let mut tile_index_to_coord = Vec::with_capacity(tiles_num as usize);
        let mut tile_index_to_lower_mip_tile_index = Vec::with_capacity(regular_tiles_num as usize);
        for (mip_level, level) in desc.regular_mip_levels.iter().enumerate() {
            let next_mip_level = mip_level + 1;
            for tile_y in 0..level.height_in_tiles {
                for tile_x in 0..level.width_in_tiles {
                    tile_index_to_coord.push(TileCoord {
                        x: tile_x,
                        y: tile_y,
                        mip_level: mip_level as u32,
                    });

                    let lower = if next_mip_level < desc.regular_mip_levels.len() {
                        let tiling = &mip_level_tilings[next_mip_level];
                        tiling.first_tile_index + (tile_y / 2) * tiling.tiles_x + tile_x / 2
                    } else {
                        regular_tiles_num
                    };
                    tile_index_to_lower_mip_tile_index.push(lower);
                }
            }
        }
        for packed_index in 0..packed_tiles_num {
            tile_index_to_coord.push(TileCoord {
                x: packed_index,
                y: 0,
                mip_level: regular_mip_levels_num,
            });
        }

        Self {
            regular_tiles_num,
            packed_tiles_num,
            regular_mip_levels_num,
            packed_mip_levels_num: desc.packed_mip_levels_num,
            tile_width: desc.tile_width,
            tile_height: desc.tile_height,
            feedback_granularity_x,
            feedback_granularity_y,
            feedback_tiles_x,
            feedback_tiles_y,
            mip_level_tilings,
            tile_index_to_coord,
            tile_index_to_lower_mip_tile_index,
        }
    }

    /// Total tile count, regular plus packed.
    pub fn tiles_num(&self) -> u32 {
        self.regular_tiles_num + self.packed_tiles_num
    }

    /// Dense index of a tile coordinate.
    ///
    /// Coordinates at or beyond the regular mip range map to the first
    /// packed tile.
    pub fn tile_index(&self, coord: TileCoord) -> u32 {
        if coord.mip_level >= self.regular_mip_levels_num {
            return self.regular_tiles_num;
        }

        let tiling = &self.mip_level_tilings[coord.mip_level as usize];
        tiling.first_tile_index + coord.y * tiling.tiles_x + coord.x
    }

    /// Mip-0 tile grid width (one cell when there are no regular mips).
    pub fn mip0_tiles_x(&self) -> u32 {
        if self.regular_tiles_num > 0 {
            self.mip_level_tilings[0].tiles_x
        } else {
            1
        }
    }

    /// Mip-0 tile grid height (one cell when there are no regular mips).
    pub fn mip0_tiles_y(&self) -> u32 {
        if self.regular_tiles_num > 0 {
            self.mip_level_tilings[0].tiles_y
        } else {
            1
        }
    }

    /// Dimensions of the named auxiliary image for this shape.
    pub fn texture_desc(&self, kind: TextureImageKind) -> TextureDesc {
        match kind {
            TextureImageKind::Feedback => TextureDesc {
                width: self.tile_width / self.feedback_granularity_x,
                height: self.tile_height / self.feedback_granularity_y,
                mip_levels_num: self.regular_mip_levels_num + self.packed_mip_levels_num,
            },
            TextureImageKind::MinMip => TextureDesc {
                width: self.mip0_tiles_x(),
                height: self.mip0_tiles_y(),
                mip_levels_num: 1,
            },
        }
    }

    /// Structural equality, the layout deduplication criterion: all
    /// scalar geometry plus the per-mip tiling table must match.
    pub fn same_shape(&self, other: &TextureLayout) -> bool {
        self.regular_tiles_num == other.regular_tiles_num
            && self.packed_tiles_num == other.packed_tiles_num
            && self.regular_mip_levels_num == other.regular_mip_levels_num
            && self.packed_mip_levels_num == other.packed_mip_levels_num
            && self.tile_width == other.tile_width
            && self.tile_height == other.tile_height
            && self.feedback_granularity_x == other.feedback_granularity_x
            && self.feedback_granularity_y == other.feedback_granularity_y
            && self.feedback_tiles_x == other.feedback_tiles_x
            && self.feedback_tiles_y == other.feedback_tiles_y
            && self.mip_level_tilings == other.mip_level_tilings
    }
}
