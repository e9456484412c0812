//! Sampler feedback decoding
//!
//! Turns a resolved MinMip byte grid into the frame's requested-tile
//! set. Each cell holds the finest mip the GPU sampled in that region,
//! or `0xFF` for no sample. After the per-cell pass, one ascending walk
//! propagates every request down its mip chain, so a request at mip 0
//! implies requests at every coarser regular mip.

use crate::core::bitset::Bitset;
use crate::texture::layout::{TextureLayout, TileCoord};

/// Cell value meaning no sample was recorded since the last clear.
pub const NO_SAMPLE: u8 = 0xFF;

/// Eight consecutive no-sample cells, the batch-skip pattern.
const NO_SAMPLE_WORD: u64 = u64::MAX;

/// Decode a MinMip feedback grid into `requested`.
///
/// `requested` must span the texture's full tile range (regular plus
/// packed) and is only ever set, never cleared, so packed or carry-over
/// bits may be pre-seeded by the caller. `min_mip_data` must hold at
/// least `feedback_tiles_x * feedback_tiles_y` bytes; that precondition
/// is the caller's (the buffer is GPU-resolved at exactly that size).
///
/// Returns the smallest requested tile index, or `None` when every cell
/// was `NO_SAMPLE`.
pub fn decode_min_mip_feedback(
    layout: &TextureLayout,
    min_mip_data: &[u8],
    mip_level_bias: i32,
    requested: &mut Bitset,
) -> Option<u32> {
    let cells_num = (layout.feedback_tiles_x * layout.feedback_tiles_y) as usize;
    debug_assert!(min_mip_data.len() >= cells_num);
    debug_assert_eq!(requested.len(), layout.tiles_num());

    let batchable = cells_num % 8 == 0;
    let mut first_tile_index: Option<u32> = None;

    let mut cell = 0usize;
    while cell < cells_num {
        // Skip fully idle 8-cell runs with a single unaligned word read
        if batchable && cell % 8 == 0 {
            let word: u64 = bytemuck::pod_read_unaligned(&min_mip_data[cell..cell + 8]);
            if word == NO_SAMPLE_WORD {
                cell += 8;
                continue;
            }
        }

        let value = min_mip_data[cell];
        if value != NO_SAMPLE {
            let mip_level = (value as i32 + mip_level_bias).max(0) as u32;

            let tile_index = if mip_level >= layout.regular_mip_levels_num {
                // Sample resolved to the packed tail; never index the
                // regular mip tables for it
                if layout.packed_tiles_num == 0 {
                    cell += 1;
                    continue;
                }
                layout.regular_tiles_num
            } else {
                let fx = cell as u32 % layout.feedback_tiles_x;
                let fy = cell as u32 / layout.feedback_tiles_x;
                layout.tile_index(TileCoord {
                    x: (fx / layout.feedback_granularity_x) >> mip_level,
                    y: (fy / layout.feedback_granularity_y) >> mip_level,
                    mip_level,
                })
            };

            requested.set(tile_index);
            first_tile_index = Some(first_tile_index.map_or(tile_index, |f| f.min(tile_index)));
        }

        cell += 1;
    }

    propagate_to_lower_mips(layout, requested, first_tile_index);
    first_tile_index
}

/// Ensure every requested tile's coarser ancestors are requested too.
///
/// Tile indices ascend finest-to-coarsest, so a single ascending pass
/// reaches the whole chain: setting a parent bit at a higher index is
/// always observed later in the same walk. Tiles of the last regular
/// mip are excluded; their parent is the packed tail, which is handled
/// by the packed-tile request rule.
pub fn propagate_to_lower_mips(
    layout: &TextureLayout,
    requested: &mut Bitset,
    first_tile_index: Option<u32>,
) {
    let Some(first) = first_tile_index else {
        return;
    };
    if layout.regular_mip_levels_num < 2 {
        return;
    }

    let last_mip_first_tile = layout.mip_level_tilings[(layout.regular_mip_levels_num - 1) as usize]
        .first_tile_index;
    for tile_index in first..last_mip_first_tile {
        if requested.get(tile_index) {
            requested.set(layout.tile_index_to_lower_mip_tile_index[tile_index as usize]);
        }
    }
}
