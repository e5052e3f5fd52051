use proptest::prelude::*;
use std::collections::HashMap;
use strata_edit::{TerrainOperation, VoxelSink};
use strata_geom::{Aabb, IVec3, Vec3};
use strata_grid::GridIndexer;

struct Recorder {
    grid: GridIndexer,
    writes: HashMap<IVec3, usize>,
}

impl VoxelSink for Recorder {
    fn voxel_grid(&self) -> &GridIndexer {
        &self.grid
    }

    fn set_value(&mut self, cell: IVec3, _value: f32) {
        *self.writes.entry(cell).or_default() += 1;
    }
}

fn recorder() -> Recorder {
    Recorder {
        grid: GridIndexer::new(
            Aabb::from_min_max(Vec3::ZERO, Vec3::splat(32.0)),
            IVec3::splat(32),
        ),
        writes: HashMap::new(),
    }
}

fn point() -> impl Strategy<Value = Vec3> {
    (-8.0f32..40.0, -8.0f32..40.0, -8.0f32..40.0).prop_map(|(x, y, z)| Vec3::new(x, y, z))
}

proptest! {
    // Boxes write each in-world cell at most once and report what they wrote
    #[test]
    fn fill_box_writes_in_world_cells_once(a in point(), b in point()) {
        let mut r = recorder();
        let op = TerrainOperation::FillBox { region: Aabb::from_min_max(a, b), value: 1.0 };
        let n = op.apply(&mut r).unwrap();
        prop_assert_eq!(n, r.writes.len());
        for (cell, count) in &r.writes {
            prop_assert_eq!(*count, 1);
            prop_assert!(r.grid.inbounds_cell(*cell));
        }
    }

    // Sphere cells all have their centers within the radius
    #[test]
    fn sphere_cells_lie_within_radius(center in point(), radius in 0.5f32..10.0) {
        let mut r = recorder();
        let op = TerrainOperation::Sphere { center, radius, value: 0.0 };
        let n = op.apply(&mut r).unwrap();
        prop_assert_eq!(n, r.writes.len());
        for cell in r.writes.keys() {
            let c = r.grid.cell_at_cell_coords(*cell).unwrap().center;
            prop_assert!((c - center).length() <= radius);
        }
    }
}
