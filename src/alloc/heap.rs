//! Fixed-capacity tile heaps and the first-fit allocator over them
//!
//! Heaps are registered by the caller under opaque ids and scanned in
//! insertion order, first-fit. Over time evictions concentrate free
//! space in earlier heaps, which makes later heaps identifiable as
//! fragmentation donors and eventually releasable once empty.

use std::collections::BTreeSet;

use crate::core::error::Error;
use crate::core::types::TextureTile;
use crate::core::Result;

const INVALID_SLOT: u32 = u32::MAX;

/// A tile's placement inside a registered heap.
///
/// A plain reference: heaps own their slots, allocations only point at
/// them by heap id and slot index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapSlot {
    pub heap_id: u32,
    pub slot_index: u32,
}

impl HeapSlot {
    pub fn invalid() -> Self {
        Self {
            heap_id: 0,
            slot_index: INVALID_SLOT,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.slot_index != INVALID_SLOT
    }
}

impl Default for HeapSlot {
    fn default() -> Self {
        Self::invalid()
    }
}

/// One fixed-capacity backing heap of tile slots.
pub struct TileHeap {
    heap_id: u32,
    /// Free slot indices, popped from the back for LIFO locality
    free_slots: Vec<u32>,
    /// Occupied slot indices in ascending order
    used_slots: BTreeSet<u32>,
    /// Occupant per slot, valid only while the slot is in `used_slots`
    occupancy: Vec<TextureTile>,
}

impl TileHeap {
    fn new(heap_id: u32, capacity: u32) -> Self {
        Self {
            heap_id,
            free_slots: (0..capacity).collect(),
            used_slots: BTreeSet::new(),
            occupancy: vec![TextureTile::new(0, 0); capacity as usize],
        }
    }

    fn allocate(&mut self, occupant: TextureTile) -> u32 {
        let slot_index = self.free_slots.pop().expect("heap has a free slot");
        self.used_slots.insert(slot_index);
        self.occupancy[slot_index as usize] = occupant;
        slot_index
    }

    fn free(&mut self, slot_index: u32) {
        debug_assert!(self.used_slots.contains(&slot_index));
        self.used_slots.remove(&slot_index);
        self.free_slots.push(slot_index);
    }

    pub fn heap_id(&self) -> u32 {
        self.heap_id
    }

    pub fn free_slots_num(&self) -> u32 {
        self.free_slots.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.used_slots.is_empty()
    }

    /// Occupant of a used slot.
    pub fn occupant(&self, slot_index: u32) -> TextureTile {
        debug_assert!(self.used_slots.contains(&slot_index));
        self.occupancy[slot_index as usize]
    }
}

/// First-fit allocator packing tiles into registered heaps.
pub struct TileAllocator {
    heaps: Vec<TileHeap>,
    heap_tiles_capacity: u32,
    tile_size_in_bytes: u32,
    allocated_tiles_num: u32,
}

impl TileAllocator {
    pub fn new(heap_tiles_capacity: u32, tile_size_in_bytes: u32) -> Self {
        Self {
            heaps: Vec::new(),
            heap_tiles_capacity,
            tile_size_in_bytes,
            allocated_tiles_num: 0,
        }
    }

    /// Register a fresh heap under a caller-owned id.
    pub fn add_heap(&mut self, heap_id: u32) -> Result<()> {
        if self.heaps.iter().any(|heap| heap.heap_id == heap_id) {
            return Err(Error::DuplicateHeap(heap_id));
        }

        self.heaps
            .push(TileHeap::new(heap_id, self.heap_tiles_capacity));
        log::debug!(
            "registered heap {} ({} tile slots)",
            heap_id,
            self.heap_tiles_capacity
        );
        Ok(())
    }

    /// Detach an empty heap.
    pub fn remove_heap(&mut self, heap_id: u32) -> Result<()> {
        let Some(position) = self.heaps.iter().position(|heap| heap.heap_id == heap_id) else {
            return Err(Error::UnknownHeap(heap_id));
        };

        let used = self.heap_tiles_capacity - self.heaps[position].free_slots_num();
        if used > 0 {
            return Err(Error::HeapNotEmpty(heap_id, used));
        }

        self.heaps.remove(position);
        log::debug!("removed heap {}", heap_id);
        Ok(())
    }

    /// Place a tile in the first heap with room, in heap insertion order.
    pub fn allocate(&mut self, occupant: TextureTile) -> Option<HeapSlot> {
        let heap = self.heaps.iter_mut().find(|heap| heap.free_slots_num() > 0)?;
        let slot_index = heap.allocate(occupant);
        self.allocated_tiles_num += 1;

        Some(HeapSlot {
            heap_id: heap.heap_id,
            slot_index,
        })
    }

    /// Return a slot to its heap's free stack.
    pub fn free(&mut self, slot: HeapSlot) {
        debug_assert!(slot.is_valid());
        let Some(heap) = self
            .heaps
            .iter_mut()
            .find(|heap| heap.heap_id == slot.heap_id)
        else {
            debug_assert!(false, "freeing a slot in unregistered heap {}", slot.heap_id);
            return;
        };

        heap.free(slot.slot_index);
        self.allocated_tiles_num -= 1;
    }

    pub fn heaps_num(&self) -> u32 {
        self.heaps.len() as u32
    }

    pub fn allocated_tiles_num(&self) -> u32 {
        self.allocated_tiles_num
    }

    pub fn total_tiles_num(&self) -> u32 {
        self.heaps_num() * self.heap_tiles_capacity
    }

    pub fn free_tiles_num(&self) -> u32 {
        self.total_tiles_num() - self.allocated_tiles_num
    }

    pub fn tile_size_in_bytes(&self) -> u32 {
        self.tile_size_in_bytes
    }

    /// Ids of heaps with no occupied slots, in insertion order.
    pub fn empty_heaps(&self) -> Vec<u32> {
        self.heaps
            .iter()
            .filter(|heap| heap.is_empty())
            .map(|heap| heap.heap_id)
            .collect()
    }

    /// Pick a tile to relocate out of a late heap.
    ///
    /// The allocator is fragmented when any heap before the last has free
    /// slots. If so, heaps are scanned newest to second; within a heap,
    /// occupied slots ascend. The first occupant accepted by `is_movable`
    /// is returned.
    pub fn fragmented_donor(
        &self,
        mut is_movable: impl FnMut(TextureTile) -> bool,
    ) -> Option<TextureTile> {
        if self.heaps.len() < 2 {
            return None;
        }

        let fragmented = self.heaps[..self.heaps.len() - 1]
            .iter()
            .any(|heap| heap.free_slots_num() > 0);
        if !fragmented {
            return None;
        }

        for heap in self.heaps[1..].iter().rev() {
            for &slot_index in &heap.used_slots {
                let occupant = heap.occupant(slot_index);
                if is_movable(occupant) {
                    return Some(occupant);
                }
            }
        }

        None
    }
}
