//! Residency image generation
//!
//! Produces the per-mip0-tile MinMip byte grid shaders use to clamp
//! sampling to the finest fully resident mip. An entry may only report
//! mip `m` when the whole chain from `m` down to the packed tail is
//! resident; holes in the middle of the chain must stop the value from
//! decreasing past them.

use crate::core::bitset::Bitset;
use crate::texture::layout::TextureLayout;

/// Write the residency image for one texture into `data`.
///
/// `resident` holds a bit per tile for tiles whose contents are GPU
/// addressable (mapped or standby). `data` is caller-owned and must hold
/// `mip0_tiles_x * mip0_tiles_y` bytes.
///
/// Resident tiles are visited coarsest mip first, which the descending
/// index walk provides for free since tile indices ascend finest to
/// coarsest. Each tile stamps its mip-0 footprint, but only over entries
/// currently reporting the next coarser mip: that guard is what keeps a
/// reported chain contiguous. A missing tile in the middle leaves its
/// footprint at the coarser value and finer resident tiles cannot
/// overwrite it.
pub fn write_min_mip_data(layout: &TextureLayout, resident: &Bitset, data: &mut [u8]) {
    let mip0_tiles_x = layout.mip0_tiles_x();
    let mip0_tiles_y = layout.mip0_tiles_y();
    let entries_num = (mip0_tiles_x * mip0_tiles_y) as usize;
    debug_assert!(data.len() >= entries_num);

    // Nothing resident reads as the packed pseudo-level
    data[..entries_num].fill(layout.regular_mip_levels_num as u8);

    if layout.regular_tiles_num == 0 {
        return;
    }

    for tile_index in resident.iter_ones_rev() {
        if tile_index >= layout.regular_tiles_num {
            // Packed tiles are below the range the image reports
            continue;
        }

        let coord = layout.tile_index_to_coord[tile_index as usize];
        let mip_level = coord.mip_level;
        let footprint = 1u32 << mip_level;
        let x_start = coord.x << mip_level;
        let y_start = coord.y << mip_level;
        let x_end = (x_start + footprint).min(mip0_tiles_x);
        let y_end = (y_start + footprint).min(mip0_tiles_y);

        for y in y_start..y_end {
            for x in x_start..x_end {
                let entry = &mut data[(y * mip0_tiles_x + x) as usize];
                if *entry == (mip_level + 1) as u8 {
                    *entry = mip_level as u8;
                }
            }
        }
    }
}
