use criterion::{Criterion, black_box, criterion_group, criterion_main};

use strata_chunk::{Voxel, VoxelDataChunk};
use strata_geom::IVec3;
use strata_store::{ChunkStore, GrowableZone, Zone};

fn bench_zone_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("zone");
    group.bench_function("alloc_free_1k", |b| {
        b.iter(|| {
            let mut zone = GrowableZone::new(Zone::format(vec![0u8; 64 * 1024]).unwrap());
            let blocks: Vec<_> = (0..1000)
                .map(|i| zone.allocate(16 + (i % 7) * 24).unwrap())
                .collect();
            for b in blocks.into_iter().step_by(2) {
                zone.deallocate(b);
            }
            black_box(zone.zone().blocks().len())
        })
    });
    group.finish();
}

fn bench_chunk_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_store");
    group.sample_size(20);
    let dir = tempfile::tempdir().unwrap();
    let (store, _) = ChunkStore::open(dir.path(), 8, 8, 32).unwrap();
    let mut chunk = VoxelDataChunk::ground(32);
    for x in 0..32 {
        for z in 0..32 {
            chunk.set(x, 31, z, Voxel::SKY);
        }
    }
    group.bench_function("store_load_32", |b| {
        let mut i = 0i32;
        b.iter(|| {
            let p = IVec3::new(i % 16, (i / 16) % 16, 0);
            store.store_chunk(p, &chunk).unwrap();
            black_box(store.load_chunk(p).unwrap());
            i += 1;
        })
    });
    group.finish();
}

criterion_group!(benches, bench_zone_churn, bench_chunk_store);
criterion_main!(benches);
