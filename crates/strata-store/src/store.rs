use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use strata_chunk::{VoxelDataChunk, decode_chunk, encode_chunk};
use strata_geom::IVec3;
use strata_grid::MortonIndex;
use strata_sync::SparseCache;

use crate::backing::MappedFile;
use crate::error::Result;
use crate::region_file::RegionFile;

type SharedRegion = Arc<Mutex<RegionFile<MappedFile>>>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub open_region_files: usize,
    pub loads: u64,
    pub load_hits: u64,
    pub stores: u64,
    pub bytes_stored: u64,
}

/// Persistent chunk storage sharded over region files.
///
/// Each file covers a cube of `region_size³` chunks and is named after the
/// region's coordinates. Open files are kept in an LRU bounded by
/// `region_file_limit`. Every operation runs under one store-wide lock since a
/// zone's free list is shared by everything in that file.
pub struct ChunkStore {
    dir: PathBuf,
    region_size: i32,
    chunk_dim: usize,
    regions: SparseCache<MortonIndex, SharedRegion>,
    op_lock: Mutex<()>,
    loads: AtomicU64,
    load_hits: AtomicU64,
    stores: AtomicU64,
    bytes_stored: AtomicU64,
}

fn has_region_files(dir: &Path) -> Result<bool> {
    if !dir.exists() {
        return Ok(false);
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "zone") {
            return Ok(true);
        }
    }
    Ok(false)
}

impl ChunkStore {
    /// Opens the store under `dir`. The flag is true when no region file existed,
    /// i.e. the store is being built from scratch.
    pub fn open(
        dir: &Path,
        region_size: i32,
        region_file_limit: usize,
        chunk_dim: usize,
    ) -> Result<(Self, bool)> {
        let fresh = !has_region_files(dir)?;
        fs::create_dir_all(dir)?;
        log::info!(
            target: "store",
            "{} chunk store at {}",
            if fresh { "new" } else { "existing" },
            dir.display()
        );
        Ok((
            Self {
                dir: dir.to_path_buf(),
                region_size: region_size.max(1),
                chunk_dim,
                regions: SparseCache::new(region_file_limit.max(1)),
                op_lock: Mutex::new(()),
                loads: AtomicU64::new(0),
                load_hits: AtomicU64::new(0),
                stores: AtomicU64::new(0),
                bytes_stored: AtomicU64::new(0),
            },
            fresh,
        ))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn region_of(&self, chunk: IVec3) -> IVec3 {
        chunk.div_euclid(self.region_size)
    }

    pub fn region_path(&self, region: IVec3) -> PathBuf {
        self.dir
            .join(format!("r.{}.{}.{}.zone", region.x, region.y, region.z))
    }

    fn open_region(&self, key: MortonIndex, region: IVec3) -> Result<SharedRegion> {
        let path = self.region_path(region);
        self.regions.try_get_or_create(key, || {
            RegionFile::open_path(&path).map(|f| Arc::new(Mutex::new(f)))
        })
    }

    /// The region file holding `chunk`, created on demand.
    fn region_file(&self, chunk: IVec3) -> Result<SharedRegion> {
        let region = self.region_of(chunk);
        self.open_region(MortonIndex::encode(region), region)
    }

    /// Like [`region_file`](Self::region_file) but never creates a file.
    fn existing_region_file(&self, chunk: IVec3) -> Result<Option<SharedRegion>> {
        let region = self.region_of(chunk);
        let key = MortonIndex::encode(region);
        if let Some(file) = self.regions.get(&key) {
            return Ok(Some(file));
        }
        if !self.region_path(region).exists() {
            return Ok(None);
        }
        self.open_region(key, region).map(Some)
    }

    #[inline]
    fn chunk_key(chunk: IVec3) -> u64 {
        u64::from(MortonIndex::encode(chunk).raw())
    }

    pub fn store_chunk(&self, chunk: IVec3, data: &VoxelDataChunk) -> Result<()> {
        let bytes = encode_chunk(data)?;
        let _op = self.op_lock.lock();
        let file = self.region_file(chunk)?;
        file.lock().store(Self::chunk_key(chunk), &bytes)?;
        self.stores.fetch_add(1, Ordering::Relaxed);
        self.bytes_stored
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    pub fn load_chunk(&self, chunk: IVec3) -> Result<Option<VoxelDataChunk>> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        let bytes = {
            let _op = self.op_lock.lock();
            let Some(file) = self.existing_region_file(chunk)? else {
                return Ok(None);
            };
            let Some(bytes) = file.lock().load(Self::chunk_key(chunk))? else {
                return Ok(None);
            };
            bytes
        };
        self.load_hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some(decode_chunk(&bytes, self.chunk_dim)?))
    }

    pub fn contains_chunk(&self, chunk: IVec3) -> Result<bool> {
        let _op = self.op_lock.lock();
        match self.existing_region_file(chunk)? {
            Some(file) => Ok(file.lock().contains(Self::chunk_key(chunk))),
            None => Ok(false),
        }
    }

    pub fn flush(&self) -> Result<()> {
        let _op = self.op_lock.lock();
        for file in self.regions.values() {
            file.lock().flush()?;
        }
        Ok(())
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            open_region_files: self.regions.len(),
            loads: self.loads.load(Ordering::Relaxed),
            load_hits: self.load_hits.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            bytes_stored: self.bytes_stored.load(Ordering::Relaxed),
        }
    }
}
