use fastnoise_lite::{FastNoiseLite, NoiseType};
use std::sync::Arc;
use strata_chunk::{Voxel, VoxelArray};
use strata_geom::Aabb;

use crate::config::{GeneratorConfig, GeneratorKind};

/// Procedural source for chunks that have never been stored.
///
/// `region` is the chunk's world-space box and `dim` its voxel edge length. Output
/// must depend only on the generator's parameters and `region`.
pub trait Generator: Send + Sync {
    fn generate(&self, region: &Aabb, dim: usize) -> VoxelArray;
}

/// Fills each column of the chunk up to the supplied surface height.
fn fill_columns(region: &Aabb, dim: usize, mut height_at: impl FnMut(f32, f32) -> f32) -> VoxelArray {
    let origin = region.min();
    let step = region.size() * (1.0 / dim as f32);
    let mut out = VoxelArray::cube(dim, Voxel::AIR);
    for z in 0..dim {
        let wz = origin.z + step.z * (z as f32 + 0.5);
        for x in 0..dim {
            let wx = origin.x + step.x * (x as f32 + 0.5);
            let h = height_at(wx, wz);
            for y in 0..dim {
                let wy = origin.y + step.y * (y as f32 + 0.5);
                if wy < h {
                    out.set(x, y, z, Voxel::GROUND);
                }
            }
        }
    }
    out
}

#[derive(Clone, Debug)]
pub struct FlatGenerator {
    pub ground_level: f32,
}

impl Generator for FlatGenerator {
    fn generate(&self, region: &Aabb, dim: usize) -> VoxelArray {
        fill_columns(region, dim, |_, _| self.ground_level)
    }
}

#[derive(Clone, Debug)]
pub struct HeightfieldGenerator {
    pub seed: i32,
    pub ground_level: f32,
    pub amplitude: f32,
    pub frequency: f32,
}

impl HeightfieldGenerator {
    fn noise(&self) -> FastNoiseLite {
        let mut n = FastNoiseLite::with_seed(self.seed);
        n.set_noise_type(Some(NoiseType::OpenSimplex2));
        n.set_frequency(Some(self.frequency));
        n
    }
}

impl Generator for HeightfieldGenerator {
    fn generate(&self, region: &Aabb, dim: usize) -> VoxelArray {
        let noise = self.noise();
        fill_columns(region, dim, |x, z| {
            self.ground_level + self.amplitude * noise.get_noise_2d(x, z)
        })
    }
}

pub fn generator_from_config(cfg: &GeneratorConfig, seed: i32) -> Arc<dyn Generator> {
    match cfg.kind {
        GeneratorKind::Flat => Arc::new(FlatGenerator {
            ground_level: cfg.ground_level,
        }),
        GeneratorKind::Heightfield => Arc::new(HeightfieldGenerator {
            seed,
            ground_level: cfg.ground_level,
            amplitude: cfg.amplitude,
            frequency: cfg.frequency,
        }),
    }
}
