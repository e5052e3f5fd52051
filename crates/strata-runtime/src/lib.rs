//! World runtime: faulting chunk cache, region transactions, lazy sunlight and
//! journal replay on top of the chunk store.
#![forbid(unsafe_code)]

mod error;
mod locked;
mod snapshot;
mod world;

pub use error::{Result, WorldError};
pub use snapshot::VoxelSnapshot;
pub use world::{RegionChanged, VoxelWorld, WorldStats, WriteReport};
