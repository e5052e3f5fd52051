//! Concurrency primitives shared by the store and the runtime.

mod region_lock;
mod sparse_cache;

pub use region_lock::{Access, RegionArbitrator, RegionGuard};
pub use sparse_cache::{CacheStats, SparseCache, SuspendGuard};
