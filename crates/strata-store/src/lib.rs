//! Persistent chunk storage: a block allocator inside growable memory-mapped
//! region files, a per-file key lookup table, and the sharded chunk store on top.

mod backing;
mod error;
mod region_file;
mod store;
pub mod zone;

pub use backing::{Backing, MappedFile};
pub use error::{Result, StoreError};
pub use region_file::{INITIAL_FILE_LEN, INITIAL_TABLE_CAPACITY, RegionFile};
pub use store::{ChunkStore, StoreStats};
pub use zone::{BlockInfo, BlockRef, GrowableZone, Zone};
