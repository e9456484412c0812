//! Heap-packed tile slot allocation

pub mod heap;

pub use heap::{HeapSlot, TileAllocator, TileHeap};
