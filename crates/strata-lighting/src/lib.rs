//! Sunlight flood fill over a 3×3 neighbourhood of chunk columns.
#![forbid(unsafe_code)]

use std::collections::{HashMap, VecDeque};

use strata_chunk::{MAX_LIGHT, VoxelDataChunk};
use strata_geom::IVec3;

/// Lateral reach of a light source: a voxel further than this from every lit
/// voxel can not receive any of its light.
pub const LIGHT_REACH: i32 = MAX_LIGHT as i32 - 1;

/// Chunk access for one propagation run.
///
/// `chunk_mut` returns `None` for chunks outside the world or outside the region the
/// caller holds; the flood fill treats those as walls.
pub trait ChunkNeighborhood {
    fn chunk_dim(&self) -> usize;
    /// Chunks per column, counted from chunk y = 0.
    fn column_height(&self) -> i32;
    fn chunk_mut(&mut self, coords: IVec3) -> Option<&mut VoxelDataChunk>;
}

/// Chunk column, addressed by chunk x and z.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Column {
    pub x: i32,
    pub z: i32,
}

impl Column {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub fn of_chunk(chunk: IVec3) -> Self {
        Self::new(chunk.x, chunk.z)
    }

    pub fn chunk(self, y: i32) -> IVec3 {
        IVec3::new(self.x, y, self.z)
    }

    pub fn offset(self, dx: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.z + dz)
    }
}

/// Lateral voxel window a caller is about to read, local to the centre column,
/// `min` inclusive and `max` exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnWindow {
    pub min_x: i32,
    pub min_z: i32,
    pub max_x: i32,
    pub max_z: i32,
}

impl ColumnWindow {
    pub fn full(dim: usize) -> Self {
        Self {
            min_x: 0,
            min_z: 0,
            max_x: dim as i32,
            max_z: dim as i32,
        }
    }

    /// True when no light entering from a neighbouring column can reach the window.
    pub fn clear_of_neighbors(&self, dim: usize) -> bool {
        let d = dim as i32;
        self.min_x >= LIGHT_REACH
            && self.min_z >= LIGHT_REACH
            && self.max_x <= d - LIGHT_REACH
            && self.max_z <= d - LIGHT_REACH
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LightingReport {
    pub columns_seeded: usize,
    pub seeds: usize,
    pub updates: usize,
    /// Only the centre column was seeded; completion is left unset.
    pub fast_path: bool,
}

// Seed rectangle `[lo, hi)` on one axis for a column at offset `d` from the centre.
fn seed_span(d: i32, dim: i32) -> (i32, i32) {
    let w = LIGHT_REACH.min(dim);
    match d {
        -1 => (dim - w, dim),
        1 => (0, w),
        _ => (0, dim),
    }
}

#[inline]
fn split(p: IVec3, dim: i32) -> (IVec3, IVec3) {
    (p.div_euclid(dim), p.rem_euclid(dim))
}

struct Flood<'a, N: ChunkNeighborhood> {
    nb: &'a mut N,
    dim: i32,
    queue: VecDeque<IVec3>,
    updates: usize,
}

impl<N: ChunkNeighborhood> Flood<'_, N> {
    fn light_at(&mut self, p: IVec3) -> Option<u8> {
        let (chunk, local) = split(p, self.dim);
        self.nb.chunk_mut(chunk).map(|c| c.get_local(local).sun_light)
    }

    fn try_light(&mut self, p: IVec3, level: u8, lossless: bool) {
        let (chunk, local) = split(p, self.dim);
        let Some(c) = self.nb.chunk_mut(chunk) else {
            return;
        };
        let mut v = c.get_local(local);
        if !v.is_empty() {
            return;
        }
        let brighter = if lossless {
            level > v.sun_light
        } else {
            level >= v.sun_light.saturating_add(2)
        };
        if !brighter {
            return;
        }
        v.sun_light = level;
        c.set_local(local, v);
        self.updates += 1;
        self.queue.push_back(p);
    }

    fn run(&mut self) {
        while let Some(p) = self.queue.pop_front() {
            let Some(level) = self.light_at(p) else {
                continue;
            };
            if level == 0 {
                continue;
            }
            let lateral = level - 1;
            if lateral > 0 {
                for (dx, dz) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
                    self.try_light(p.offset(dx, 0, dz), lateral, false);
                }
            }
            let below = p.offset(0, -1, 0);
            if level == MAX_LIGHT {
                self.try_light(below, MAX_LIGHT, true);
            } else if lateral > 0 {
                self.try_light(below, lateral, false);
            }
        }
    }

    /// Seeds the top layer of the column's highest non-Sky chunk inside the
    /// rectangle `[x0, x1) × [z0, z1)`.
    fn seed_column(&mut self, column: Column, xs: (i32, i32), zs: (i32, i32)) -> usize {
        let top = (0..self.nb.column_height())
            .rev()
            .find(|&y| self.nb.chunk_mut(column.chunk(y)).is_some_and(|c| !c.is_sky()));
        let Some(cy) = top else {
            return 0;
        };
        let chunk = column.chunk(cy);
        let origin = chunk * self.dim;
        let ly = self.dim - 1;
        let mut seeded = 0;
        let Some(c) = self.nb.chunk_mut(chunk) else {
            return 0;
        };
        for lz in zs.0..zs.1 {
            for lx in xs.0..xs.1 {
                let local = IVec3::new(lx, ly, lz);
                let mut v = c.get_local(local);
                if !v.is_empty() {
                    continue;
                }
                if v.sun_light != MAX_LIGHT {
                    v.sun_light = MAX_LIGHT;
                    c.set_local(local, v);
                }
                self.queue.push_back(origin + local);
                seeded += 1;
            }
        }
        seeded
    }
}

/// Floods sunlight into `column` from the tops of it and its eight neighbours.
///
/// With a `request` window that neighbouring light cannot reach, only the centre
/// column is seeded; that result is exact for the window but not for the whole
/// column, so the column stays incomplete. Otherwise every chunk of the centre
/// column is marked complete once the queue drains.
pub fn propagate_sunlight<N: ChunkNeighborhood>(
    nb: &mut N,
    column: Column,
    request: Option<&ColumnWindow>,
) -> LightingReport {
    let dim = nb.chunk_dim() as i32;
    let fast_path = request.is_some_and(|w| w.clear_of_neighbors(dim as usize));
    let mut flood = Flood {
        nb,
        dim,
        queue: VecDeque::new(),
        updates: 0,
    };
    let mut report = LightingReport {
        fast_path,
        ..LightingReport::default()
    };
    for dz in -1..=1 {
        for dx in -1..=1 {
            if fast_path && (dx != 0 || dz != 0) {
                continue;
            }
            let seeds = flood.seed_column(
                column.offset(dx, dz),
                seed_span(dx, dim),
                seed_span(dz, dim),
            );
            if seeds > 0 {
                report.columns_seeded += 1;
                report.seeds += seeds;
            }
        }
    }
    flood.run();
    report.updates = flood.updates;

    if !fast_path {
        for y in 0..nb.column_height() {
            if let Some(c) = nb.chunk_mut(column.chunk(y)) {
                c.set_complete(true);
            }
        }
    }
    log::debug!(
        target: "lighting",
        "column ({}, {}): {} seeds in {} columns, {} updates{}",
        column.x,
        column.z,
        report.seeds,
        report.columns_seeded,
        report.updates,
        if fast_path { " (centre only)" } else { "" }
    );
    report
}

/// True when every available chunk of `column` has reached equilibrium.
pub fn column_is_complete<N: ChunkNeighborhood>(nb: &mut N, column: Column) -> bool {
    (0..nb.column_height()).all(|y| nb.chunk_mut(column.chunk(y)).is_none_or(|c| c.is_complete()))
}

/// Drops the sunlight of every chunk in `column` and marks it for propagation.
pub fn invalidate_column<N: ChunkNeighborhood>(nb: &mut N, column: Column) {
    for y in 0..nb.column_height() {
        if let Some(c) = nb.chunk_mut(column.chunk(y)) {
            c.clear_sunlight();
        }
    }
}

/// Neighbourhood backed by an owned map; chunks not present are walls.
#[derive(Clone, Debug, Default)]
pub struct ChunkMap {
    dim: usize,
    column_height: i32,
    chunks: HashMap<IVec3, VoxelDataChunk>,
}

impl ChunkMap {
    pub fn new(dim: usize, column_height: i32) -> Self {
        Self {
            dim,
            column_height,
            chunks: HashMap::new(),
        }
    }

    pub fn insert(&mut self, coords: IVec3, chunk: VoxelDataChunk) -> Option<VoxelDataChunk> {
        debug_assert_eq!(chunk.dim(), self.dim);
        self.chunks.insert(coords, chunk)
    }

    pub fn get(&self, coords: IVec3) -> Option<&VoxelDataChunk> {
        self.chunks.get(&coords)
    }

    pub fn remove(&mut self, coords: IVec3) -> Option<VoxelDataChunk> {
        self.chunks.remove(&coords)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn into_chunks(self) -> HashMap<IVec3, VoxelDataChunk> {
        self.chunks
    }

    /// Sun level of a voxel in world voxel coordinates.
    pub fn sun_at(&self, p: IVec3) -> Option<u8> {
        let (chunk, local) = split(p, self.dim as i32);
        self.get(chunk).map(|c| c.get_local(local).sun_light)
    }
}

impl ChunkNeighborhood for ChunkMap {
    fn chunk_dim(&self) -> usize {
        self.dim
    }

    fn column_height(&self) -> i32 {
        self.column_height
    }

    fn chunk_mut(&mut self, coords: IVec3) -> Option<&mut VoxelDataChunk> {
        self.chunks.get_mut(&coords)
    }
}
