use std::fs;

use strata_chunk::{ChunkVariant, Voxel, VoxelDataChunk};
use strata_geom::IVec3;
use strata_store::{ChunkStore, RegionFile, StoreError};
use tempfile::TempDir;

fn mixed_chunk(dim: usize) -> VoxelDataChunk {
    let mut c = VoxelDataChunk::ground(dim);
    for x in 0..dim {
        c.set(x, dim - 1, x, Voxel::SKY);
    }
    c.set_complete(true);
    c
}

#[test]
fn chunks_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("regions");
    {
        let (store, fresh) = ChunkStore::open(&root, 4, 2, 8).unwrap();
        assert!(fresh);
        store.store_chunk(IVec3::new(0, 0, 0), &mixed_chunk(8)).unwrap();
        store.store_chunk(IVec3::new(5, 1, 0), &VoxelDataChunk::sky(8)).unwrap();
        store.store_chunk(IVec3::new(9, 9, 9), &VoxelDataChunk::ground(8)).unwrap();
        store.flush().unwrap();
        // Three regions touched, two kept open.
        assert_eq!(store.stats().open_region_files, 2);
    }
    let (store, fresh) = ChunkStore::open(&root, 4, 2, 8).unwrap();
    assert!(!fresh);
    let a = store.load_chunk(IVec3::new(0, 0, 0)).unwrap().unwrap();
    assert_eq!(a, mixed_chunk(8));
    assert!(a.is_complete());
    let b = store.load_chunk(IVec3::new(5, 1, 0)).unwrap().unwrap();
    assert_eq!(b.variant(), ChunkVariant::Sky);
    let c = store.load_chunk(IVec3::new(9, 9, 9)).unwrap().unwrap();
    assert_eq!(c.variant(), ChunkVariant::Ground);
    assert!(store.load_chunk(IVec3::new(1, 0, 0)).unwrap().is_none());
}

#[test]
fn missing_region_is_not_created_by_reads() {
    let dir = TempDir::new().unwrap();
    let (store, _) = ChunkStore::open(dir.path(), 4, 4, 8).unwrap();
    assert!(store.load_chunk(IVec3::new(12, 0, 0)).unwrap().is_none());
    assert!(!store.contains_chunk(IVec3::new(12, 0, 0)).unwrap());
    assert!(!store.region_path(IVec3::new(3, 0, 0)).exists());
}

#[test]
fn rewriting_a_chunk_replaces_it() {
    let dir = TempDir::new().unwrap();
    let (store, _) = ChunkStore::open(dir.path(), 4, 4, 8).unwrap();
    let p = IVec3::new(1, 2, 3);
    store.store_chunk(p, &VoxelDataChunk::sky(8)).unwrap();
    store.store_chunk(p, &mixed_chunk(8)).unwrap();
    assert_eq!(store.load_chunk(p).unwrap().unwrap(), mixed_chunk(8));
    let s = store.stats();
    assert_eq!((s.stores, s.loads, s.load_hits), (2, 1, 1));
}

#[test]
fn mapped_region_file_grows_transparently() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("r.0.0.0.zone");
    {
        let mut r = RegionFile::open_path(&path).unwrap();
        for k in 0..64u64 {
            r.store(k, &vec![k as u8; 4000]).unwrap();
        }
        assert!(r.file_len() > 64 * 4000);
        r.flush().unwrap();
    }
    let len = fs::metadata(&path).unwrap().len() as usize;
    assert!(len.is_power_of_two());
    let r = RegionFile::open_path(&path).unwrap();
    assert_eq!(r.len(), 64);
    assert_eq!(r.load(63).unwrap().unwrap(), vec![63u8; 4000]);
}

#[test]
fn damaged_file_is_reported_as_corruption() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("r.0.0.0.zone");
    {
        let mut r = RegionFile::open_path(&path).unwrap();
        r.store(1, b"payload").unwrap();
    }
    let mut bytes = fs::read(&path).unwrap();
    bytes[0] ^= 0x5a;
    fs::write(&path, &bytes).unwrap();
    assert!(matches!(
        RegionFile::open_path(&path),
        Err(StoreError::Corruption(_))
    ));

    // A damaged chunk payload surfaces as a codec error.
    let root = dir.path().join("store");
    let (store, _) = ChunkStore::open(&root, 4, 4, 8).unwrap();
    store.store_chunk(IVec3::ZERO, &mixed_chunk(8)).unwrap();
    drop(store);
    let zone_path = root.join("r.0.0.0.zone");
    let mut bytes = fs::read(&zone_path).unwrap();
    let magic = bytes.windows(4).position(|w| w == b"VXCK").unwrap();
    bytes[magic] = b'X';
    fs::write(&zone_path, &bytes).unwrap();
    let (store, _) = ChunkStore::open(&root, 4, 4, 8).unwrap();
    assert!(matches!(
        store.load_chunk(IVec3::ZERO),
        Err(StoreError::Codec(_))
    ));
}
