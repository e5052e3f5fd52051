use crossbeam_channel::{Receiver, Sender, unbounded};
use hashbrown::HashSet;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use strata_chunk::VoxelDataChunk;
use strata_edit::{Journal, JournalEntry, TerrainOperation};
use strata_geom::{Aabb, IVec3};
use strata_grid::{GridIndexer, IndexError, MortonIndex};
use strata_lighting::{
    Column, ColumnWindow, column_is_complete, invalidate_column, propagate_sunlight,
};
use strata_store::{ChunkStore, StoreStats};
use strata_sync::{Access, CacheStats, RegionArbitrator, SparseCache};
use strata_world::{Generator, WorldConfig, generator_from_config};

use crate::error::Result;
use crate::locked::{ChunkHandle, ChunkRange, LockedChunks};
use crate::snapshot::VoxelSnapshot;

/// Sent once per committed writer transaction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegionChanged {
    /// Voxels the operation may have changed, clipped to the world.
    pub region: Aabb,
    /// Chunk-aligned region the transaction held.
    pub access_region: Aabb,
    /// Position of the operation in the journal, starting at 1.
    pub sequence: u64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WriteReport {
    /// Voxels the operation addressed.
    pub voxels_written: usize,
    /// Voxels whose stored value actually changed.
    pub voxels_changed: usize,
    pub chunks_persisted: usize,
    pub access_region: Aabb,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorldStats {
    pub cache: CacheStats,
    pub store: StoreStats,
    pub chunks_generated: u64,
    pub lighting_runs: u64,
    pub journal_entries: usize,
    pub active_claims: usize,
}

/// A chunked voxel world: faulting cache over persistent region files, region
/// locking for readers and writers, lazy sunlight, and a replayable edit journal.
pub struct VoxelWorld {
    config: WorldConfig,
    voxel_grid: GridIndexer,
    chunk_grid: GridIndexer,
    dim: usize,
    seed: i32,
    generator: Arc<dyn Generator>,
    cache: SparseCache<MortonIndex, ChunkHandle>,
    store: ChunkStore,
    regions: RegionArbitrator,
    journal: Mutex<Journal>,
    subscribers: Mutex<Vec<Sender<RegionChanged>>>,
    pool: ThreadPool,
    generated: AtomicU64,
    lighting_runs: AtomicU64,
    /// Columns whose interior band was lit by a centre-only run. Cleared for
    /// every column a writer invalidates.
    interior_lit: Mutex<HashSet<Column>>,
}

impl VoxelWorld {
    /// Opens the world under `config.data_dir`.
    ///
    /// When the chunk store is new but the journal is not, the journal is replayed
    /// over freshly generated terrain before the world is returned.
    pub fn open(config: WorldConfig, generator: Option<Arc<dyn Generator>>) -> Result<Self> {
        config.validate()?;
        let (store, fresh) = ChunkStore::open(
            &config.regions_dir(),
            config.region_size,
            config.region_file_limit,
            config.chunk_size,
        )?;
        let (journal, entries) = Journal::open_or_create(&config.journal_path(), config.seed)?;
        let seed = journal.seed();
        let generator =
            generator.unwrap_or_else(|| generator_from_config(&config.generator, seed));
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|i| format!("strata-worker-{i}"))
            .build()?;
        let voxel_grid = config.voxel_grid();
        let chunk_grid = config.chunk_grid();
        log::info!(
            "world {:?} voxels in {:?} chunks of {}³, seed {seed}",
            voxel_grid.resolution(),
            chunk_grid.resolution(),
            config.chunk_size
        );

        let world = Self {
            dim: config.chunk_size,
            cache: SparseCache::new(config.working_set),
            voxel_grid,
            chunk_grid,
            seed,
            generator,
            store,
            regions: RegionArbitrator::new(),
            journal: Mutex::new(journal),
            subscribers: Mutex::new(Vec::new()),
            pool,
            generated: AtomicU64::new(0),
            lighting_runs: AtomicU64::new(0),
            interior_lit: Mutex::new(HashSet::new()),
            config,
        };

        if fresh && !entries.is_empty() {
            let t0 = Instant::now();
            log::info!(target: "journal", "replaying {} operations", entries.len());
            for entry in &entries {
                world.write(&entry.operation, false)?;
            }
            world.store.flush()?;
            log::info!(
                target: "journal",
                "replay finished in {} ms",
                t0.elapsed().as_millis()
            );
        }
        Ok(world)
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn seed(&self) -> i32 {
        self.seed
    }

    pub fn voxel_grid(&self) -> &GridIndexer {
        &self.voxel_grid
    }

    pub fn chunk_grid(&self) -> &GridIndexer {
        &self.chunk_grid
    }

    fn column_height(&self) -> i32 {
        self.chunk_grid.resolution().y
    }

    /// Cached handle for `coords`, loading or generating the chunk on a miss.
    /// A generated chunk is stored before it becomes visible, so no chunk is ever
    /// generated twice.
    fn handle(&self, coords: IVec3) -> Result<ChunkHandle> {
        let key = self.chunk_grid.index_at_cell_coords(coords)?;
        self.cache.try_get_or_create(key, || -> Result<ChunkHandle> {
            if let Some(chunk) = self.store.load_chunk(coords)? {
                return Ok(Arc::new(RwLock::new(chunk)));
            }
            let region = self.chunk_grid.cell_at_cell_coords(coords)?;
            let chunk = VoxelDataChunk::from_generated(self.generator.generate(&region, self.dim));
            self.store.store_chunk(coords, &chunk)?;
            self.generated.fetch_add(1, Ordering::Relaxed);
            log::trace!("generated chunk {coords:?} as {:?}", chunk.variant());
            Ok(Arc::new(RwLock::new(chunk)))
        })
    }

    /// Copy of the chunk at `coords`, faulted in if needed.
    pub fn chunk(&self, coords: IVec3) -> Result<VoxelDataChunk> {
        Ok(self.handle(coords)?.read().clone())
    }

    /// Faults every listed chunk in on the worker pool. Returns how many were
    /// requested.
    pub fn prefetch(&self, coords: &[IVec3]) -> Result<usize> {
        self.pool.install(|| {
            coords
                .par_iter()
                .try_for_each(|c| self.handle(*c).map(drop))
        })?;
        Ok(coords.len())
    }

    /// Voxel cells of `region` clipped to the world, and the chunks holding them.
    /// A region that holds no voxel of the world is an error.
    fn chunk_range(&self, region: &Aabb) -> Result<(ChunkRange, IVec3, IVec3)> {
        let (vlo, vhi) = self
            .voxel_grid
            .clipped_cell_range(region)
            .ok_or(IndexError::OutOfBounds {
                min: region.min(),
                max: region.max(),
            })?;
        let dim = self.dim as i32;
        let range = ChunkRange {
            lo: vlo.div_euclid(dim),
            hi: (vhi - IVec3::ONE).div_euclid(dim) + IVec3::ONE,
        };
        Ok((range, vlo, vhi))
    }

    /// `range` widened by one chunk laterally and to the full column height.
    fn access_range(&self, range: ChunkRange) -> ChunkRange {
        let res = self.chunk_grid.resolution();
        ChunkRange {
            lo: IVec3::new((range.lo.x - 1).max(0), 0, (range.lo.z - 1).max(0)),
            hi: IVec3::new((range.hi.x + 1).min(res.x), res.y, (range.hi.z + 1).min(res.z)),
        }
    }

    fn region_of(&self, range: ChunkRange) -> Aabb {
        self.chunk_grid.region_for_cells(range.lo, range.hi)
    }

    /// Faults every chunk of `range` in on the worker pool. The result keeps the
    /// range's canonical order, which is the order chunk locks are taken in.
    fn fault_range(&self, range: ChunkRange) -> Result<Vec<(IVec3, ChunkHandle)>> {
        let cells: Vec<IVec3> = range.cells().collect();
        self.pool.install(|| {
            cells
                .par_iter()
                .map(|&c| -> Result<(IVec3, ChunkHandle)> { Ok((c, self.handle(c)?)) })
                .collect()
        })
    }

    fn persist<'a>(&self, chunks: impl Iterator<Item = (IVec3, &'a VoxelDataChunk)>) -> Result<usize> {
        let mut n = 0;
        for (c, chunk) in chunks {
            self.store.store_chunk(c, chunk)?;
            n += 1;
        }
        Ok(n)
    }

    /// Lateral part of the cells `[vlo, vhi)` that falls in `column`.
    fn window_in(&self, column: Column, vlo: IVec3, vhi: IVec3) -> ColumnWindow {
        let dim = self.dim as i32;
        let (base_x, base_z) = (column.x * dim, column.z * dim);
        ColumnWindow {
            min_x: (vlo.x - base_x).max(0),
            min_z: (vlo.z - base_z).max(0),
            max_x: (vhi.x - base_x).min(dim),
            max_z: (vhi.z - base_z).min(dim),
        }
    }

    /// Whether `window` of `column` can be read without lighting it first.
    fn interior_ready(&self, column: Column, window: &ColumnWindow) -> bool {
        window.clear_of_neighbors(self.dim) && self.interior_lit.lock().contains(&column)
    }

    fn columns_lit(&self, range: ChunkRange, vlo: IVec3, vhi: IVec3) -> Result<bool> {
        for column in range.columns() {
            if self.interior_ready(column, &self.window_in(column, vlo, vhi)) {
                continue;
            }
            for y in 0..self.column_height() {
                if !self.handle(column.chunk(y))?.read().is_complete() {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Runs `f` over a snapshot of the voxels in `region`.
    ///
    /// The region is clipped to the world. If any touched column has not been lit
    /// yet, sunlight is propagated first under an exclusive claim that covers the
    /// lighting neighbourhood, and the lit chunks are stored.
    pub fn reader_transaction<R>(
        &self,
        region: &Aabb,
        f: impl FnOnce(&VoxelSnapshot) -> R,
    ) -> Result<R> {
        let (range, vlo, vhi) = self.chunk_range(region)?;
        let snapped = self.voxel_grid.region_for_cells(vlo, vhi);
        let mut snapshot = VoxelSnapshot::new(vlo, vhi, snapped);
        let _hold = self.cache.suspended();

        {
            let _claim = self.regions.lock(self.region_of(range), Access::Shared);
            if self.columns_lit(range, vlo, vhi)? {
                for c in range.cells() {
                    snapshot.copy_from(c, &self.handle(c)?.read());
                }
                return Ok(f(&snapshot));
            }
        }

        let access = self.access_range(range);
        let _claim = self.regions.lock(self.region_of(access), Access::Exclusive);
        let handles = self.fault_range(access)?;
        let mut chunks = LockedChunks::lock(self.voxel_grid, self.dim, self.column_height(), &handles);
        let mut lit = false;
        for column in range.columns() {
            let window = self.window_in(column, vlo, vhi);
            if column_is_complete(&mut chunks, column) || self.interior_ready(column, &window) {
                continue;
            }
            let report = propagate_sunlight(&mut chunks, column, Some(&window));
            if report.fast_path {
                self.interior_lit.lock().insert(column);
            }
            self.lighting_runs.fetch_add(1, Ordering::Relaxed);
            lit = true;
        }
        if lit {
            self.persist(chunks.iter())?;
        }
        for c in range.cells() {
            if let Some(chunk) = chunks.get(c) {
                snapshot.copy_from(c, chunk);
            }
        }
        Ok(f(&snapshot))
    }

    /// Applies `op` under an exclusive claim, stores every chunk it may have
    /// changed and records it in the journal before the claim is released.
    pub fn writer_transaction(&self, op: TerrainOperation) -> Result<WriteReport> {
        self.write(&op, true)
    }

    fn write(&self, op: &TerrainOperation, record: bool) -> Result<WriteReport> {
        if let TerrainOperation::SetVoxel { position, .. } = op {
            self.voxel_grid.cell_coords_at_point(*position)?;
        }
        let affected = op.affected_region();
        let (range, vlo, vhi) = self.chunk_range(&affected)?;
        let access = self.access_range(range);
        let access_region = self.region_of(access);

        let _hold = self.cache.suspended();
        let claim = self.regions.lock(access_region, Access::Exclusive);
        let handles = self.fault_range(access)?;
        let mut chunks = LockedChunks::lock(self.voxel_grid, self.dim, self.column_height(), &handles);

        let voxels_written = op.apply(&mut chunks)?;
        {
            let mut interior_lit = self.interior_lit.lock();
            for column in access.columns() {
                invalidate_column(&mut chunks, column);
                interior_lit.remove(&column);
            }
        }
        let chunks_persisted = self.persist(chunks.iter())?;
        let report = WriteReport {
            voxels_written,
            voxels_changed: chunks.writes(),
            chunks_persisted,
            access_region,
        };

        let sequence = if record {
            let mut journal = self.journal.lock();
            journal.append(&JournalEntry {
                region: affected,
                operation: *op,
            })?;
            journal.len() as u64
        } else {
            0
        };
        drop(chunks);
        drop(claim);
        log::debug!(
            "{} wrote {} voxels, stored {} chunks",
            op.name(),
            report.voxels_written,
            report.chunks_persisted
        );

        if record {
            self.notify(RegionChanged {
                region: self.voxel_grid.region_for_cells(vlo, vhi),
                access_region,
                sequence,
            });
        }
        Ok(report)
    }

    /// Receiver for one [`RegionChanged`] per committed writer transaction.
    pub fn subscribe(&self) -> Receiver<RegionChanged> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    fn notify(&self, event: RegionChanged) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event).is_ok());
    }

    pub fn flush(&self) -> Result<()> {
        self.store.flush()?;
        Ok(())
    }

    pub fn stats(&self) -> WorldStats {
        WorldStats {
            cache: self.cache.stats(),
            store: self.store.stats(),
            chunks_generated: self.generated.load(Ordering::Relaxed),
            lighting_runs: self.lighting_runs.load(Ordering::Relaxed),
            journal_entries: self.journal.lock().len(),
            active_claims: self.regions.active_claims().len(),
        }
    }
}

impl Drop for VoxelWorld {
    fn drop(&mut self) {
        if let Err(e) = self.store.flush() {
            log::warn!("flushing chunk store on close: {e}");
        }
    }
}
