//! Core building blocks: bitsets, LRU queues, shared types and errors

pub mod bitset;
pub mod error;
pub mod lru;
pub mod types;

pub use bitset::Bitset;
pub use error::Error;
pub use lru::LruQueue;
pub use types::TextureTile;

/// Standard Result type for the engine
pub type Result<T> = std::result::Result<T, Error>;
