//! Per-frame residency streaming: feedback decode, tile lifecycle,
//! eviction, defragmentation and the residency image

pub mod feedback;
pub mod manager;
pub mod minmip;
pub mod state;

pub use manager::{ResidencyConfig, ResidencyManager, ResidencyManagerDesc, Statistics};
pub use state::TileState;
