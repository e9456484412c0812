//! Error types for the residency engine

use thiserror::Error;

/// Main error type for the engine
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("heap {0} is already registered")]
    DuplicateHeap(u32),

    #[error("heap {0} is not registered")]
    UnknownHeap(u32),

    #[error("heap {0} still has {1} occupied tile slots")]
    HeapNotEmpty(u32, u32),
}
