//! Residency engine - coordinates feedback, tile lifecycle and heaps
//!
//! Owns all residency state: per-texture tile states, the global
//! requested and standby queues, and the heap allocator. Every queue
//! membership change and counter update funnels through a single
//! transition primitive so the per-tile state and the queues can never
//! drift apart.
//!
//! The caller drives one frame as: feedback updates per texture,
//! follower matching, then globally trim standby, (re)size heaps,
//! allocate requested tiles, optionally defragment, then per texture
//! drain the map/unmap deltas, perform the driver mapping and commit it
//! back with `update_tiles_mapping`.

use serde::{Deserialize, Serialize};

use crate::alloc::heap::{HeapSlot, TileAllocator};
use crate::core::bitset::Bitset;
use crate::core::lru::LruQueue;
use crate::core::types::TextureTile;
use crate::core::Result;
use crate::streaming::feedback::decode_min_mip_feedback;
use crate::streaming::minmip::write_min_mip_data;
use crate::streaming::state::TileState;
use crate::texture::layout::{
    TextureDesc, TextureImageKind, TextureLayout, TileCoord, TiledTextureDesc,
};

/// Tile backing granularity; standard for tiled resources.
pub const TILE_SIZE_IN_BYTES: u32 = 64 * 1024;

/// Fixed-at-construction engine settings.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ResidencyManagerDesc {
    /// Tile slots per backing heap; allocation granularity
    pub heap_tiles_capacity: u32,
    /// Request every texture's packed tail at registration time
    pub always_map_packed_tiles: bool,
}

impl Default for ResidencyManagerDesc {
    fn default() -> Self {
        Self {
            heap_tiles_capacity: 256,
            always_map_packed_tiles: true,
        }
    }
}

/// Settings that may change between frames.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ResidencyConfig {
    /// Target number of inactive tiles kept mapped before eviction
    pub num_extra_standby_tiles: u32,
}

impl Default for ResidencyConfig {
    fn default() -> Self {
        Self {
            num_extra_standby_tiles: 1000,
        }
    }
}

/// Snapshot of engine counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    /// Tiles tracked across all live textures
    pub total_tiles_num: u32,
    /// Tiles currently holding a heap slot
    pub allocated_tiles_num: u32,
    /// Tiles sitting in the standby queue
    pub standby_tiles_num: u32,
    /// Unoccupied slots across registered heaps
    pub heap_free_tiles_num: u32,
}

/// Mutable per-texture residency state.
struct TiledTexture {
    live: bool,
    layout_index: usize,
    states: Vec<TileState>,
    last_requested_time: Vec<f32>,
    heap_slots: Vec<HeapSlot>,
    tiles_to_map: Vec<u32>,
    tiles_to_unmap: Vec<u32>,
    /// Last frame's decoded request set, kept for follower matching
    requested_bits: Bitset,
    /// Mapped or standby tiles, for the residency image
    resident_bits: Bitset,
    allocated_unpacked_tiles_num: u32,
    requested_tiles_num: u32,
}

impl TiledTexture {
    fn vacant() -> Self {
        Self {
            live: false,
            layout_index: 0,
            states: Vec::new(),
            last_requested_time: Vec::new(),
            heap_slots: Vec::new(),
            tiles_to_map: Vec::new(),
            tiles_to_unmap: Vec::new(),
            requested_bits: Bitset::new(0),
            resident_bits: Bitset::new(0),
            allocated_unpacked_tiles_num: 0,
            requested_tiles_num: 0,
        }
    }

    fn init(&mut self, layout_index: usize, tiles_num: u32, packed_tiles_num: u32) {
        self.live = true;
        self.layout_index = layout_index;
        self.states = vec![TileState::Free; tiles_num as usize];
        self.last_requested_time = vec![0.0; tiles_num as usize];
        self.heap_slots = vec![HeapSlot::invalid(); tiles_num as usize];
        self.tiles_to_map = Vec::new();
        self.tiles_to_unmap = Vec::new();
        self.requested_bits = Bitset::new(tiles_num);
        self.resident_bits = Bitset::new(tiles_num);
        self.allocated_unpacked_tiles_num = 0;
        self.requested_tiles_num = packed_tiles_num;
    }
}

/// Whether a tile may be relocated by the defragmenter: a regular tile
/// whose contents are resident (mapped or standby).
fn movable(textures: &[TiledTexture], layouts: &[TextureLayout], key: TextureTile) -> bool {
    let texture = &textures[key.texture_id as usize];
    let layout = &layouts[texture.layout_index];
    key.tile_index < layout.regular_tiles_num
        && texture.states[key.tile_index as usize].is_resident()
}

/// Top-level tile residency engine.
pub struct ResidencyManager {
    desc: ResidencyManagerDesc,
    config: ResidencyConfig,
    allocator: TileAllocator,
    layouts: Vec<TextureLayout>,
    textures: Vec<TiledTexture>,
    texture_freelist: Vec<u32>,
    requested_queue: LruQueue<TextureTile>,
    standby_queue: LruQueue<TextureTile>,
    total_tiles_num: u32,
    active_tiles_num: u32,
}

impl ResidencyManager {
    pub fn new(desc: ResidencyManagerDesc) -> Self {
        Self {
            desc,
            config: ResidencyConfig::default(),
            allocator: TileAllocator::new(desc.heap_tiles_capacity, TILE_SIZE_IN_BYTES),
            layouts: Vec::new(),
            textures: Vec::new(),
            texture_freelist: Vec::new(),
            requested_queue: LruQueue::new(),
            standby_queue: LruQueue::new(),
            total_tiles_num: 0,
            active_tiles_num: 0,
        }
    }

    /// Update runtime-mutable settings.
    pub fn set_config(&mut self, config: ResidencyConfig) {
        self.config = config;
    }

    pub fn config(&self) -> ResidencyConfig {
        self.config
    }

    // --- Texture registry ---

    /// Register a texture; returns its id (small, dense, recycled).
    ///
    /// Identical shapes share one layout record. With
    /// `always_map_packed_tiles` the packed tail is requested
    /// immediately and surfaces in `get_tiles_to_map` after the next
    /// `allocate_requested_tiles`.
    pub fn add_tiled_texture(&mut self, desc: &TiledTextureDesc) -> u32 {
        let layout = TextureLayout::new(desc);
        let layout_index = match self
            .layouts
            .iter()
            .position(|existing| existing.same_shape(&layout))
        {
            Some(index) => index,
            None => {
                self.layouts.push(layout);
                self.layouts.len() - 1
            }
        };

        let texture_id = match self.texture_freelist.pop() {
            Some(id) => id,
            None => {
                self.textures.push(TiledTexture::vacant());
                self.textures.len() as u32 - 1
            }
        };

        let shared = &self.layouts[layout_index];
        let tiles_num = shared.tiles_num();
        let regular_tiles_num = shared.regular_tiles_num;
        let packed_tiles_num = shared.packed_tiles_num;
        self.textures[texture_id as usize].init(layout_index, tiles_num, packed_tiles_num);
        self.total_tiles_num += tiles_num;

        if self.desc.always_map_packed_tiles {
            for packed_index in 0..packed_tiles_num {
                self.transition_tile(
                    texture_id,
                    regular_tiles_num + packed_index,
                    TileState::Requested,
                );
            }
        }

        log::debug!(
            "added texture {} ({} regular + {} packed tiles)",
            texture_id,
            regular_tiles_num,
            packed_tiles_num
        );
        texture_id
    }

    /// Unregister a texture: releases its slots, erases its queue
    /// entries and recycles the id.
    pub fn remove_tiled_texture(&mut self, texture_id: u32) {
        debug_assert!(self.texture(texture_id).live);

        let tiles_num = self.layout(texture_id).tiles_num();
        for tile_index in 0..tiles_num {
            let texture = &mut self.textures[texture_id as usize];
            if texture.states[tile_index as usize] != TileState::Free {
                self.active_tiles_num -= 1;
            }
            let slot = std::mem::take(&mut texture.heap_slots[tile_index as usize]);
            if slot.is_valid() {
                self.allocator.free(slot);
            }

            let key = TextureTile::new(texture_id, tile_index);
            self.requested_queue.remove(&key);
            self.standby_queue.remove(&key);
        }

        self.total_tiles_num -= tiles_num;
        self.textures[texture_id as usize] = TiledTexture::vacant();
        self.texture_freelist.push(texture_id);
        log::debug!("removed texture {}", texture_id);
    }

    // --- Per-frame updates ---

    /// Reconcile one texture against a resolved MinMip feedback grid.
    ///
    /// `min_mip_data` must hold `feedback_tiles_x * feedback_tiles_y`
    /// bytes (see `get_texture_desc`); `0xFF` cells mean no sample.
    /// `timestamp` and `timeout` are caller-defined durations in the
    /// same unit; a tile mapped but unrequested for at least `timeout`
    /// moves to standby.
    pub fn update_with_sampler_feedback(
        &mut self,
        texture_id: u32,
        min_mip_data: &[u8],
        mip_level_bias: i32,
        timestamp: f32,
        timeout: f32,
    ) {
        debug_assert!(self.texture(texture_id).live);

        let layout = self.layout(texture_id);
        if layout.regular_mip_levels_num == 0 {
            let packed_tiles_num = layout.packed_tiles_num;
            self.textures[texture_id as usize].requested_tiles_num = packed_tiles_num;
            return;
        }

        let mut requested = Bitset::new(layout.tiles_num());
        let first_tile_index =
            decode_min_mip_feedback(layout, min_mip_data, mip_level_bias, &mut requested);

        self.seed_packed_requests(texture_id, &mut requested, first_tile_index.is_some());
        self.reconcile_requests(texture_id, requested, first_tile_index, timestamp, timeout);
    }

    /// Mirror a primary texture's request set onto a follower by
    /// geometric overlap, then reconcile the follower.
    ///
    /// For every regular tile requested in the primary, every follower
    /// tile at the same mip whose texel rectangle intersects it becomes
    /// requested. Exact only when both textures share tile pixel
    /// dimensions. Follower mips finer than the primary's
    /// coarsest-requested mip are never requested by this path.
    pub fn match_primary_texture(
        &mut self,
        primary_texture_id: u32,
        follower_texture_id: u32,
        timestamp: f32,
        timeout: f32,
    ) {
        debug_assert!(self.texture(primary_texture_id).live);
        debug_assert!(self.texture(follower_texture_id).live);

        let primary = self.texture(primary_texture_id);
        let primary_layout = &self.layouts[primary.layout_index];
        let follower_layout = &self.layouts[self.texture(follower_texture_id).layout_index];

        let mut requested = Bitset::new(follower_layout.tiles_num());
        let mut first_tile_index: Option<u32> = None;

        for primary_tile in primary.requested_bits.iter_ones() {
            // Packed pseudo-coordinates carry no geometry
            if primary_tile >= primary_layout.regular_tiles_num {
                continue;
            }

            let coord = primary_layout.tile_index_to_coord[primary_tile as usize];
            if coord.mip_level >= follower_layout.regular_mip_levels_num {
                continue;
            }

            let primary_left = coord.x * primary_layout.tile_width;
            let primary_top = coord.y * primary_layout.tile_height;
            let primary_right = primary_left + primary_layout.tile_width;
            let primary_bottom = primary_top + primary_layout.tile_height;

            let tiling = follower_layout.mip_level_tilings[coord.mip_level as usize];
            let tiles_end = tiling.first_tile_index + tiling.tiles_x * tiling.tiles_y;
            for follower_tile in tiling.first_tile_index..tiles_end {
                let follower_coord = follower_layout.tile_index_to_coord[follower_tile as usize];
                let follower_left = follower_coord.x * follower_layout.tile_width;
                let follower_top = follower_coord.y * follower_layout.tile_height;
                let follower_right = follower_left + follower_layout.tile_width;
                let follower_bottom = follower_top + follower_layout.tile_height;

                if follower_left < primary_right
                    && follower_right > primary_left
                    && follower_top < primary_bottom
                    && follower_bottom > primary_top
                {
                    requested.set(follower_tile);
                    first_tile_index =
                        Some(first_tile_index.map_or(follower_tile, |f| f.min(follower_tile)));
                }
            }
        }

        self.seed_packed_requests(
            follower_texture_id,
            &mut requested,
            first_tile_index.is_some(),
        );
        self.reconcile_requests(
            follower_texture_id,
            requested,
            first_tile_index,
            timestamp,
            timeout,
        );
    }

    /// Packed tiles join the request set whenever the engine maps them
    /// unconditionally, or anything at all was requested this frame.
    fn seed_packed_requests(&self, texture_id: u32, requested: &mut Bitset, any_requested: bool) {
        if !self.desc.always_map_packed_tiles && !any_requested {
            return;
        }

        let layout = self.layout(texture_id);
        for tile_index in layout.regular_tiles_num..layout.tiles_num() {
            requested.set(tile_index);
        }
    }

    /// Shared reconciliation pass: refresh request times, promote
    /// requested tiles, demote timed-out mapped tiles.
    fn reconcile_requests(
        &mut self,
        texture_id: u32,
        requested: Bitset,
        first_tile_index: Option<u32>,
        timestamp: f32,
        timeout: f32,
    ) {
        let texture_index = texture_id as usize;
        let layout = self.layout(texture_id);
        let regular_tiles_num = layout.regular_tiles_num;
        let tiles_num = layout.tiles_num();
        let packed_tiles_num = layout.packed_tiles_num;

        // Kept verbatim for follower matching
        self.textures[texture_index].requested_bits = requested;
        self.textures[texture_index].requested_tiles_num = packed_tiles_num;

        if regular_tiles_num == 0 {
            return;
        }

        let any_requested = first_tile_index.is_some();
        let has_unpacked = self.textures[texture_index].allocated_unpacked_tiles_num > 0;

        if any_requested || has_unpacked {
            for tile_index in 0..regular_tiles_num {
                let texture = &mut self.textures[texture_index];
                let state = texture.states[tile_index as usize];

                if texture.requested_bits.get(tile_index) {
                    texture.last_requested_time[tile_index as usize] = timestamp;
                    texture.requested_tiles_num += 1;

                    match state {
                        // Still mapped driver-side: reactivate in place
                        TileState::Standby => {
                            self.transition_tile(texture_id, tile_index, TileState::Mapped);
                        }
                        TileState::Free => {
                            self.transition_tile(texture_id, tile_index, TileState::Requested);
                        }
                        _ => {}
                    }
                } else if state == TileState::Mapped {
                    let idle = timestamp - texture.last_requested_time[tile_index as usize];
                    if idle >= timeout {
                        self.transition_tile(texture_id, tile_index, TileState::Standby);
                    }
                }
            }
        }

        // Packed tiles are promoted on demand but never timed out; they
        // stay resident for as long as the texture lives
        if self.desc.always_map_packed_tiles || any_requested {
            for tile_index in regular_tiles_num..tiles_num {
                let texture = &mut self.textures[texture_index];
                if texture.requested_bits.get(tile_index) {
                    texture.last_requested_time[tile_index as usize] = timestamp;
                    if texture.states[tile_index as usize] == TileState::Free {
                        self.transition_tile(texture_id, tile_index, TileState::Requested);
                    }
                }
            }
        }
    }

    // --- Heap management ---

    /// Heaps needed to back every currently requested tile plus the
    /// configured standby slack.
    pub fn num_desired_heaps(&self) -> u32 {
        let requested: u32 = self
            .textures
            .iter()
            .filter(|texture| texture.live)
            .map(|texture| texture.requested_tiles_num)
            .sum();

        (requested + self.config.num_extra_standby_tiles).div_ceil(self.desc.heap_tiles_capacity)
    }

    /// Register a backing heap under a caller-owned id.
    pub fn add_heap(&mut self, heap_id: u32) -> Result<()> {
        self.allocator.add_heap(heap_id)
    }

    /// Detach an empty heap. Fails while any slot is occupied.
    pub fn remove_heap(&mut self, heap_id: u32) -> Result<()> {
        self.allocator.remove_heap(heap_id)
    }

    /// Ids of registered heaps with no occupied slots.
    pub fn get_empty_heaps(&self) -> Vec<u32> {
        self.allocator.empty_heaps()
    }

    // --- Global per-frame passes ---

    /// Evict oldest standby tiles until at most the configured count
    /// remains.
    pub fn trim_standby_tiles(&mut self) {
        let mut evicted = 0u32;
        while self.standby_queue.len() > self.config.num_extra_standby_tiles as usize {
            let front = self.standby_queue.front().expect("standby queue non-empty");
            self.transition_tile(front.texture_id, front.tile_index, TileState::Free);
            evicted += 1;
        }

        if evicted > 0 {
            log::debug!("trimmed {} standby tiles", evicted);
        }
    }

    /// Drain the requested queue oldest-first into allocated slots,
    /// stopping at the first allocation failure. Unplaced requests stay
    /// queued for the next frame.
    pub fn allocate_requested_tiles(&mut self) {
        let mut allocated = 0u32;
        while let Some(front) = self.requested_queue.front() {
            if !self.transition_tile(front.texture_id, front.tile_index, TileState::Allocated) {
                break;
            }
            self.requested_queue.pop_front();
            allocated += 1;
        }

        if allocated > 0 {
            log::debug!("allocated {} requested tiles", allocated);
        }
    }

    /// Relocate up to `num_tiles` resident tiles out of late heaps.
    ///
    /// Each donor is freed and re-requested; the next
    /// `allocate_requested_tiles` re-places it, and first-fit prefers
    /// the earlier heaps the free space has accumulated in.
    pub fn defragment_tiles(&mut self, num_tiles: u32) {
        for _ in 0..num_tiles {
            let donor = {
                let textures = &self.textures;
                let layouts = &self.layouts;
                self.allocator
                    .fragmented_donor(|occupant| movable(textures, layouts, occupant))
            };
            let Some(donor) = donor else {
                break;
            };

            log::trace!(
                "defragmenting texture {} tile {}",
                donor.texture_id,
                donor.tile_index
            );
            self.transition_tile(donor.texture_id, donor.tile_index, TileState::Free);
            self.transition_tile(donor.texture_id, donor.tile_index, TileState::Requested);
        }
    }

    // --- Delta lists and mapping commit ---

    /// Drain the pending list of tiles the driver must map.
    pub fn get_tiles_to_map(&mut self, texture_id: u32) -> Vec<u32> {
        debug_assert!(self.texture(texture_id).live);
        std::mem::take(&mut self.textures[texture_id as usize].tiles_to_map)
    }

    /// Drain the pending list of tiles the driver must unmap.
    pub fn get_tiles_to_unmap(&mut self, texture_id: u32) -> Vec<u32> {
        debug_assert!(self.texture(texture_id).live);
        std::mem::take(&mut self.textures[texture_id as usize].tiles_to_unmap)
    }

    /// Commit the driver's mapping work: each tile moves from allocated
    /// to mapped.
    pub fn update_tiles_mapping(&mut self, texture_id: u32, tile_indices: &[u32]) {
        debug_assert!(self.texture(texture_id).live);
        for &tile_index in tile_indices {
            self.transition_tile(texture_id, tile_index, TileState::Mapped);
        }
    }

    // --- Queries ---

    /// Write the MinMip residency image; `data` must hold
    /// `mip0_tiles_x * mip0_tiles_y` bytes (see `get_texture_desc`).
    pub fn write_min_mip_data(&self, texture_id: u32, data: &mut [u8]) {
        debug_assert!(self.texture(texture_id).live);
        let texture = self.texture(texture_id);
        write_min_mip_data(
            &self.layouts[texture.layout_index],
            &texture.resident_bits,
            data,
        );
    }

    /// Dimensions required for a texture's auxiliary images.
    pub fn get_texture_desc(&self, texture_id: u32, kind: TextureImageKind) -> TextureDesc {
        debug_assert!(self.texture(texture_id).live);
        self.layout(texture_id).texture_desc(kind)
    }

    /// Tile-index to coordinate table for a texture.
    pub fn tile_coordinates(&self, texture_id: u32) -> &[TileCoord] {
        debug_assert!(self.texture(texture_id).live);
        &self.layout(texture_id).tile_index_to_coord
    }

    /// Per-tile heap placements; an entry is valid while its tile holds
    /// a slot.
    pub fn tile_allocations(&self, texture_id: u32) -> &[HeapSlot] {
        debug_assert!(self.texture(texture_id).live);
        &self.texture(texture_id).heap_slots
    }

    /// Whether the defragmenter may relocate this tile.
    pub fn is_movable_tile(&self, texture_id: u32, tile_index: u32) -> bool {
        debug_assert!(self.texture(texture_id).live);
        movable(
            &self.textures,
            &self.layouts,
            TextureTile::new(texture_id, tile_index),
        )
    }

    pub fn get_statistics(&self) -> Statistics {
        Statistics {
            total_tiles_num: self.total_tiles_num,
            allocated_tiles_num: self.allocator.allocated_tiles_num(),
            standby_tiles_num: self.standby_queue.len() as u32,
            heap_free_tiles_num: self.allocator.free_tiles_num(),
        }
    }

    // --- Internals ---

    fn texture(&self, texture_id: u32) -> &TiledTexture {
        &self.textures[texture_id as usize]
    }

    fn layout(&self, texture_id: u32) -> &TextureLayout {
        &self.layouts[self.texture(texture_id).layout_index]
    }

    /// The single tile lifecycle primitive. All queue membership,
    /// slot ownership, delta-list and counter changes happen here,
    /// exactly once per transition.
    ///
    /// Returns false only when entering `Allocated` fails for lack of
    /// heap space; the tile then stays `Requested`.
    fn transition_tile(&mut self, texture_id: u32, tile_index: u32, new_state: TileState) -> bool {
        let key = TextureTile::new(texture_id, tile_index);
        let old_state = self.textures[texture_id as usize].states[tile_index as usize];
        let regular_tiles_num = self.layout(texture_id).regular_tiles_num;

        debug_assert!(
            old_state.can_transition_to(new_state),
            "invalid tile transition {:?} -> {:?} (texture {}, tile {})",
            old_state,
            new_state,
            texture_id,
            tile_index
        );

        // Leaving standby always clears its queue entry
        if old_state == TileState::Standby {
            self.standby_queue.remove(&key);
        }

        match new_state {
            TileState::Free => {
                debug_assert!(self.active_tiles_num > 0);
                self.active_tiles_num -= 1;

                let texture = &mut self.textures[texture_id as usize];
                let slot = std::mem::take(&mut texture.heap_slots[tile_index as usize]);
                texture.tiles_to_unmap.push(tile_index);
                texture.resident_bits.reset(tile_index);
                if tile_index < regular_tiles_num {
                    texture.allocated_unpacked_tiles_num -= 1;
                }
                self.allocator.free(slot);
            }

            TileState::Requested => {
                debug_assert!(!self.requested_queue.contains(&key));
                self.requested_queue.push_back(key);
                self.active_tiles_num += 1;
            }

            TileState::Allocated => {
                // Under full heaps, the oldest standby tile gives way
                if self.allocator.free_tiles_num() == 0 {
                    if let Some(victim) = self.standby_queue.front() {
                        log::trace!(
                            "evicting standby texture {} tile {} under heap pressure",
                            victim.texture_id,
                            victim.tile_index
                        );
                        self.transition_tile(victim.texture_id, victim.tile_index, TileState::Free);
                    }
                }

                let Some(slot) = self.allocator.allocate(key) else {
                    return false;
                };

                let texture = &mut self.textures[texture_id as usize];
                texture.heap_slots[tile_index as usize] = slot;
                texture.tiles_to_map.push(tile_index);
                if tile_index < regular_tiles_num {
                    texture.allocated_unpacked_tiles_num += 1;
                }
            }

            TileState::Mapped => {
                self.textures[texture_id as usize]
                    .resident_bits
                    .set(tile_index);
            }

            TileState::Standby => {
                debug_assert!(!self.standby_queue.contains(&key));
                self.standby_queue.push_back(key);
            }
        }

        self.textures[texture_id as usize].states[tile_index as usize] = new_state;
        true
    }
}
