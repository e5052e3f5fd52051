//! Coordinate math: Morton (Z-order) keys and the world/cell grid indexer.
#![forbid(unsafe_code)]

mod indexer;
mod morton;

pub use indexer::{GridIndexer, IndexError};
pub use morton::{MORTON_AXIS_BITS, MORTON_AXIS_LIMIT, MortonIndex};
