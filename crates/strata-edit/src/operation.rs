use serde::{Deserialize, Serialize};
use strata_geom::{Aabb, IVec3, Vec3};
use strata_grid::{GridIndexer, IndexError};

/// Voxel storage an operation writes through.
pub trait VoxelSink {
    /// Grid the sink's voxel cells are laid out on.
    fn voxel_grid(&self) -> &GridIndexer;
    /// Replaces the density of one voxel. Light is recomputed by the owner.
    fn set_value(&mut self, cell: IVec3, value: f32);
}

/// A world-space edit. Every variant is deterministic given the terrain it
/// runs on, so replaying the same sequence reproduces the same world.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TerrainOperation {
    /// Writes the voxel containing `position`.
    SetVoxel { position: Vec3, value: f32 },
    /// Writes every voxel the box touches, clipped to the world.
    FillBox { region: Aabb, value: f32 },
    /// Writes every voxel whose center lies within `radius` of `center`.
    Sphere { center: Vec3, radius: f32, value: f32 },
}

impl TerrainOperation {
    /// World-space box the operation may change.
    pub fn affected_region(&self) -> Aabb {
        match *self {
            TerrainOperation::SetVoxel { position, .. } => Aabb::point(position),
            TerrainOperation::FillBox { region, .. } => region,
            TerrainOperation::Sphere { center, radius, .. } => {
                Aabb::new(center, Vec3::splat(radius))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TerrainOperation::SetVoxel { .. } => "set_voxel",
            TerrainOperation::FillBox { .. } => "fill_box",
            TerrainOperation::Sphere { .. } => "sphere",
        }
    }

    /// Writes the operation into `sink`, returning how many voxels were written.
    ///
    /// `SetVoxel` outside the world is an error; boxes and spheres are clipped.
    pub fn apply<S: VoxelSink + ?Sized>(&self, sink: &mut S) -> Result<usize, IndexError> {
        let grid = *sink.voxel_grid();
        match *self {
            TerrainOperation::SetVoxel { position, value } => {
                let cell = grid.cell_coords_at_point(position)?;
                sink.set_value(cell, value);
                Ok(1)
            }
            TerrainOperation::FillBox { region, value } => {
                let Some((lo, hi)) = grid.clipped_cell_range(&region) else {
                    return Ok(0);
                };
                let mut n = 0;
                for_cells(lo, hi, |c| {
                    sink.set_value(c, value);
                    n += 1;
                });
                Ok(n)
            }
            TerrainOperation::Sphere {
                center,
                radius,
                value,
            } => {
                let Some((lo, hi)) = grid.clipped_cell_range(&self.affected_region()) else {
                    return Ok(0);
                };
                let mut n = 0;
                let mut inside = Vec::new();
                for_cells(lo, hi, |c| inside.push(c));
                for c in inside {
                    let cell = grid.cell_at_cell_coords(c)?;
                    if (cell.center - center).length() <= radius {
                        sink.set_value(c, value);
                        n += 1;
                    }
                }
                Ok(n)
            }
        }
    }
}

fn for_cells(lo: IVec3, hi: IVec3, mut f: impl FnMut(IVec3)) {
    for y in lo.y..hi.y {
        for z in lo.z..hi.z {
            for x in lo.x..hi.x {
                f(IVec3::new(x, y, z));
            }
        }
    }
}
