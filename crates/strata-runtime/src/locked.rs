use hashbrown::HashMap;
use parking_lot::{RwLock, RwLockWriteGuard};
use std::sync::Arc;

use strata_chunk::{Voxel, VoxelDataChunk};
use strata_edit::VoxelSink;
use strata_geom::IVec3;
use strata_grid::GridIndexer;
use strata_lighting::{ChunkNeighborhood, Column};

pub(crate) type ChunkHandle = Arc<RwLock<VoxelDataChunk>>;

/// Half-open range of chunk coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ChunkRange {
    pub lo: IVec3,
    pub hi: IVec3,
}

impl ChunkRange {
    pub fn cells(self) -> impl Iterator<Item = IVec3> {
        let ChunkRange { lo, hi } = self;
        (lo.y..hi.y).flat_map(move |y| {
            (lo.z..hi.z).flat_map(move |z| (lo.x..hi.x).map(move |x| IVec3::new(x, y, z)))
        })
    }

    pub fn columns(self) -> impl Iterator<Item = Column> {
        let ChunkRange { lo, hi } = self;
        (lo.z..hi.z).flat_map(move |z| (lo.x..hi.x).map(move |x| Column::new(x, z)))
    }
}

/// Every chunk of an exclusive access region, write-locked for the length of a
/// transaction. Chunks outside the region read as walls to the lighting pass.
pub(crate) struct LockedChunks<'a> {
    voxel_grid: GridIndexer,
    dim: usize,
    column_height: i32,
    guards: HashMap<IVec3, RwLockWriteGuard<'a, VoxelDataChunk>>,
    writes: usize,
}

impl<'a> LockedChunks<'a> {
    pub fn lock(
        voxel_grid: GridIndexer,
        dim: usize,
        column_height: i32,
        handles: &'a [(IVec3, ChunkHandle)],
    ) -> Self {
        let guards = handles.iter().map(|(c, h)| (*c, h.write())).collect();
        Self {
            voxel_grid,
            dim,
            column_height,
            guards,
            writes: 0,
        }
    }

    pub fn get(&self, coords: IVec3) -> Option<&VoxelDataChunk> {
        self.guards.get(&coords).map(|g| &**g)
    }

    pub fn iter(&self) -> impl Iterator<Item = (IVec3, &VoxelDataChunk)> {
        self.guards.iter().map(|(c, g)| (*c, &**g))
    }

    /// Voxels written through [`VoxelSink`] so far.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl ChunkNeighborhood for LockedChunks<'_> {
    fn chunk_dim(&self) -> usize {
        self.dim
    }

    fn column_height(&self) -> i32 {
        self.column_height
    }

    fn chunk_mut(&mut self, coords: IVec3) -> Option<&mut VoxelDataChunk> {
        self.guards.get_mut(&coords).map(|g| &mut **g)
    }
}

impl VoxelSink for LockedChunks<'_> {
    fn voxel_grid(&self) -> &GridIndexer {
        &self.voxel_grid
    }

    fn set_value(&mut self, cell: IVec3, value: f32) {
        let dim = self.dim as i32;
        let coords = cell.div_euclid(dim);
        let local = cell.rem_euclid(dim);
        let Some(chunk) = self.guards.get_mut(&coords) else {
            debug_assert!(false, "write to {cell:?} outside the locked region");
            log::warn!("dropped write to {cell:?} outside the locked region");
            return;
        };
        let old = chunk.get_local(local);
        // Emptying an empty voxel keeps its light and the chunk's variant.
        if old.is_empty() && value == 0.0 {
            return;
        }
        let new = Voxel {
            value,
            sun_light: 0,
            torch_light: old.torch_light,
        };
        if chunk.set_local(local, new) {
            self.writes += 1;
        }
    }
}
