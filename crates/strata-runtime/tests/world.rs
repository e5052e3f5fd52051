use std::path::Path;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::TryRecvError;
use strata_chunk::{MAX_LIGHT, VoxelArray};
use strata_edit::TerrainOperation;
use strata_geom::{Aabb, IVec3, Vec3};
use strata_runtime::{VoxelWorld, WorldError};
use strata_world::{FlatGenerator, Generator, GeneratorConfig, GeneratorKind, WorldConfig};

fn small_config(dir: &Path, kind: GeneratorKind) -> WorldConfig {
    WorldConfig {
        bounding_box: Aabb::from_min_max(Vec3::ZERO, Vec3::new(128.0, 64.0, 128.0)),
        grid_resolution: [128, 64, 128],
        chunk_size: 16,
        working_set: 512,
        region_size: 4,
        data_dir: dir.to_path_buf(),
        worker_threads: 2,
        seed: None,
        generator: GeneratorConfig {
            kind,
            ground_level: 20.0,
            amplitude: 6.0,
            frequency: 0.05,
        },
        ..WorldConfig::default()
    }
}

fn all_chunks(world: &VoxelWorld) -> Vec<IVec3> {
    let res = world.chunk_grid().resolution();
    let mut out = Vec::new();
    for y in 0..res.y {
        for z in 0..res.z {
            for x in 0..res.x {
                out.push(IVec3::new(x, y, z));
            }
        }
    }
    out
}

struct Counting {
    inner: FlatGenerator,
    calls: AtomicUsize,
}

impl Generator for Counting {
    fn generate(&self, region: &Aabb, dim: usize) -> VoxelArray {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.generate(region, dim)
    }
}

fn read_voxel(world: &VoxelWorld, p: Vec3) -> strata_chunk::Voxel {
    let cell = world.voxel_grid().cell_coords_at_point(p).unwrap();
    world
        .reader_transaction(&Aabb::point(p), |snap| snap.get(cell).unwrap())
        .unwrap()
}

#[test]
fn reference_world_generates_each_chunk_once_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = WorldConfig {
        data_dir: dir.path().to_path_buf(),
        ..WorldConfig::default()
    };
    let generator = Arc::new(Counting {
        inner: FlatGenerator { ground_level: 500.0 },
        calls: AtomicUsize::new(0),
    });
    let coords = IVec3::new(3, 15, 4);
    {
        let world = VoxelWorld::open(config.clone(), Some(generator.clone())).unwrap();
        assert_eq!(world.chunk_grid().resolution(), IVec3::splat(32));
        let first = world.chunk(coords).unwrap();
        let second = world.chunk(coords).unwrap();
        assert_eq!(first, second);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        world.flush().unwrap();
    }
    let world = VoxelWorld::open(config, Some(generator.clone())).unwrap();
    let again = world.chunk(coords).unwrap();
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(again.dim(), 32);
    assert_eq!(world.stats().store.load_hits, 1);
}

#[test]
fn edits_are_visible_to_readers() {
    let dir = tempfile::tempdir().unwrap();
    let world = VoxelWorld::open(small_config(dir.path(), GeneratorKind::Flat), None).unwrap();
    let above = Vec3::new(10.5, 40.5, 10.5);
    assert_eq!(read_voxel(&world, above).value, 0.0);

    let report = world
        .writer_transaction(TerrainOperation::SetVoxel {
            position: above,
            value: 1.0,
        })
        .unwrap();
    assert_eq!(report.voxels_written, 1);
    assert_eq!(report.voxels_changed, 1);
    assert_eq!(read_voxel(&world, above).value, 1.0);

    world
        .writer_transaction(TerrainOperation::FillBox {
            region: Aabb::from_min_max(Vec3::new(30.0, 10.0, 30.0), Vec3::new(34.0, 20.0, 34.0)),
            value: 0.0,
        })
        .unwrap();
    assert_eq!(read_voxel(&world, Vec3::new(31.5, 12.5, 31.5)).value, 0.0);
    assert_eq!(world.stats().journal_entries, 2);
    assert_eq!(world.stats().active_claims, 0);
}

#[test]
fn readers_light_open_ground_once() {
    let dir = tempfile::tempdir().unwrap();
    let world = VoxelWorld::open(small_config(dir.path(), GeneratorKind::Flat), None).unwrap();
    let surface = Vec3::new(5.5, 20.5, 5.5);
    assert_eq!(read_voxel(&world, surface).sun_light, MAX_LIGHT);
    assert_eq!(read_voxel(&world, Vec3::new(5.5, 19.5, 5.5)).sun_light, 0);
    let runs = world.stats().lighting_runs;
    assert!(runs >= 1);
    read_voxel(&world, surface);
    assert_eq!(world.stats().lighting_runs, runs);
}

#[test]
fn interior_reads_light_their_column_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = WorldConfig {
        chunk_size: 32,
        ..small_config(dir.path(), GeneratorKind::Flat)
    };
    let world = VoxelWorld::open(config, None).unwrap();
    let interior = Vec3::new(48.5, 20.5, 48.5);

    assert_eq!(read_voxel(&world, interior).sun_light, MAX_LIGHT);
    let after_first = world.stats();
    assert_eq!(after_first.lighting_runs, 1);
    for _ in 0..2 {
        assert_eq!(read_voxel(&world, interior).sun_light, MAX_LIGHT);
    }
    let after_repeat = world.stats();
    assert_eq!(after_repeat.lighting_runs, 1);
    assert_eq!(after_repeat.store.stores, after_first.store.stores);

    // An edit in the column clears its light, so the next read relights it.
    world
        .writer_transaction(TerrainOperation::SetVoxel {
            position: Vec3::new(40.5, 30.5, 40.5),
            value: 1.0,
        })
        .unwrap();
    assert_eq!(read_voxel(&world, interior).sun_light, MAX_LIGHT);
    assert_eq!(world.stats().lighting_runs, 2);
}

struct ThreadRecorder {
    inner: FlatGenerator,
    threads: Mutex<Vec<Option<String>>>,
}

impl Generator for ThreadRecorder {
    fn generate(&self, region: &Aabb, dim: usize) -> VoxelArray {
        let name = std::thread::current().name().map(str::to_owned);
        self.threads.lock().unwrap().push(name);
        self.inner.generate(region, dim)
    }
}

#[test]
fn lighting_neighbourhood_is_faulted_on_the_worker_pool() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(ThreadRecorder {
        inner: FlatGenerator { ground_level: 20.0 },
        threads: Mutex::new(Vec::new()),
    });
    let world = VoxelWorld::open(
        small_config(dir.path(), GeneratorKind::Flat),
        Some(recorder.clone() as Arc<dyn Generator>),
    )
    .unwrap();
    read_voxel(&world, Vec3::new(40.5, 20.5, 40.5));

    // 3×3 columns of 4 chunks each, every one generated exactly once.
    let threads = recorder.threads.lock().unwrap();
    assert_eq!(threads.len(), 36);
    let on_workers = threads
        .iter()
        .filter(|n| n.as_deref().is_some_and(|n| n.starts_with("strata-worker-")))
        .count();
    assert!(on_workers >= 32, "only {on_workers} chunks generated on workers");
}

#[test]
fn overhang_shades_the_ground_below() {
    let dir = tempfile::tempdir().unwrap();
    let world = VoxelWorld::open(small_config(dir.path(), GeneratorKind::Flat), None).unwrap();
    world
        .writer_transaction(TerrainOperation::FillBox {
            region: Aabb::from_min_max(Vec3::new(0.0, 30.0, 0.0), Vec3::new(8.0, 31.0, 16.0)),
            value: 1.0,
        })
        .unwrap();
    let shaded = read_voxel(&world, Vec3::new(3.5, 25.5, 8.5)).sun_light;
    let open = read_voxel(&world, Vec3::new(12.5, 25.5, 8.5)).sun_light;
    assert_eq!(open, MAX_LIGHT);
    assert!(shaded < open, "shaded {shaded}");
    assert_eq!(read_voxel(&world, Vec3::new(3.5, 31.5, 8.5)).sun_light, MAX_LIGHT);
}

#[test]
fn each_commit_notifies_each_subscriber_once() {
    let dir = tempfile::tempdir().unwrap();
    let world = VoxelWorld::open(small_config(dir.path(), GeneratorKind::Flat), None).unwrap();
    let a = world.subscribe();
    let b = world.subscribe();
    let position = Vec3::new(70.5, 30.5, 70.5);
    world
        .writer_transaction(TerrainOperation::SetVoxel {
            position,
            value: 1.0,
        })
        .unwrap();
    for rx in [&a, &b] {
        let event = rx.try_recv().unwrap();
        assert_eq!(event.sequence, 1);
        assert_eq!(
            event.region,
            Aabb::from_min_max(Vec3::new(70.0, 30.0, 70.0), Vec3::new(71.0, 31.0, 71.0))
        );
        assert!(event.access_region.contains(&event.region));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    drop(b);
    world
        .writer_transaction(TerrainOperation::SetVoxel {
            position,
            value: 0.0,
        })
        .unwrap();
    assert_eq!(a.try_recv().unwrap().sequence, 2);
}

#[test]
fn journal_replay_rebuilds_identical_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path(), GeneratorKind::Heightfield);
    let ops = [
        TerrainOperation::SetVoxel {
            position: Vec3::new(40.5, 35.5, 40.5),
            value: 1.0,
        },
        TerrainOperation::FillBox {
            region: Aabb::from_min_max(Vec3::new(10.0, 8.0, 60.0), Vec3::new(40.0, 30.0, 70.0)),
            value: 0.0,
        },
        TerrainOperation::Sphere {
            center: Vec3::new(90.0, 20.0, 90.0),
            radius: 9.0,
            value: 0.5,
        },
    ];

    let (seed, before) = {
        let world = VoxelWorld::open(config.clone(), None).unwrap();
        for op in ops {
            world.writer_transaction(op).unwrap();
        }
        let chunks: Vec<_> = all_chunks(&world)
            .into_iter()
            .map(|c| world.chunk(c).unwrap())
            .collect();
        (world.seed(), chunks)
    };

    std::fs::remove_dir_all(config.regions_dir()).unwrap();
    let world = VoxelWorld::open(config, None).unwrap();
    assert_eq!(world.seed(), seed);
    assert_eq!(world.stats().journal_entries, ops.len());
    let after: Vec<_> = all_chunks(&world)
        .into_iter()
        .map(|c| world.chunk(c).unwrap())
        .collect();
    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(&after) {
        assert_eq!(a.variant(), b.variant());
        assert_eq!(a.uncompressed_bytes(), b.uncompressed_bytes());
        assert_eq!(a.is_complete(), b.is_complete());
    }
}

#[test]
fn writes_outside_the_world_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let world = VoxelWorld::open(small_config(dir.path(), GeneratorKind::Flat), None).unwrap();
    let err = world
        .writer_transaction(TerrainOperation::SetVoxel {
            position: Vec3::new(-1.0, 10.0, 10.0),
            value: 1.0,
        })
        .unwrap_err();
    assert!(matches!(err, WorldError::Index(_)));
    assert!(matches!(
        world.reader_transaction(&Aabb::point(Vec3::splat(500.0)), |_| ()),
        Err(WorldError::Index(_))
    ));
    assert_eq!(world.stats().journal_entries, 0);
}

#[test]
fn evicted_chunks_keep_their_edits() {
    let dir = tempfile::tempdir().unwrap();
    let config = WorldConfig {
        working_set: 8,
        ..small_config(dir.path(), GeneratorKind::Flat)
    };
    let world = VoxelWorld::open(config, None).unwrap();
    let position = Vec3::new(100.5, 50.5, 3.5);
    world
        .writer_transaction(TerrainOperation::SetVoxel {
            position,
            value: 1.0,
        })
        .unwrap();
    let coords = all_chunks(&world);
    assert_eq!(world.prefetch(&coords).unwrap(), coords.len());
    let stats = world.stats();
    assert!(stats.cache.entries <= 8);
    assert!(stats.cache.evictions > 0);
    assert_eq!(stats.chunks_generated, coords.len() as u64);
    assert_eq!(read_voxel(&world, position).value, 1.0);
}

#[test]
fn overlapping_writers_all_commit() {
    let dir = tempfile::tempdir().unwrap();
    let world = VoxelWorld::open(small_config(dir.path(), GeneratorKind::Flat), None).unwrap();
    std::thread::scope(|s| {
        for t in 0..4 {
            let world = &world;
            s.spawn(move || {
                for i in 0..5 {
                    world
                        .writer_transaction(TerrainOperation::SetVoxel {
                            position: Vec3::new(20.5 + i as f32, 40.5, 20.5 + t as f32),
                            value: 1.0,
                        })
                        .unwrap();
                }
            });
        }
    });
    let stats = world.stats();
    assert_eq!(stats.journal_entries, 20);
    assert_eq!(stats.active_claims, 0);
    for t in 0..4 {
        for i in 0..5 {
            assert_eq!(read_voxel(&world, Vec3::new(20.5 + i as f32, 40.5, 20.5 + t as f32)).value, 1.0);
        }
    }
}
