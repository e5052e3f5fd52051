//! World edits: terrain operations and the append-only journal that replays them.
#![forbid(unsafe_code)]

mod journal;
mod operation;

pub use journal::{JOURNAL_VERSION, Journal, JournalEntry, JournalError, JournalHeader};
pub use operation::{TerrainOperation, VoxelSink};
