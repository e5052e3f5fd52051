use strata_chunk::{Voxel, VoxelDataChunk};
use strata_geom::{Aabb, IVec3};

/// Copy of the voxels a reader asked for, addressed by absolute voxel cell.
#[derive(Clone, Debug, PartialEq)]
pub struct VoxelSnapshot {
    origin: IVec3,
    size: IVec3,
    region: Aabb,
    voxels: Vec<Voxel>,
}

impl VoxelSnapshot {
    /// Empty snapshot of the cells `[lo, hi)`; `region` is their world-space box.
    pub(crate) fn new(lo: IVec3, hi: IVec3, region: Aabb) -> Self {
        let size = hi - lo;
        Self {
            origin: lo,
            size,
            region,
            voxels: vec![Voxel::AIR; lo.volume_to(hi)],
        }
    }

    pub fn origin(&self) -> IVec3 {
        self.origin
    }

    pub fn size(&self) -> IVec3 {
        self.size
    }

    /// World-space box covered by the snapshot's cells.
    pub fn region(&self) -> &Aabb {
        &self.region
    }

    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    /// Y-major, like chunk arrays.
    pub fn voxels(&self) -> &[Voxel] {
        &self.voxels
    }

    fn index(&self, cell: IVec3) -> Option<usize> {
        let d = cell - self.origin;
        let inside = d.x >= 0
            && d.y >= 0
            && d.z >= 0
            && d.x < self.size.x
            && d.y < self.size.y
            && d.z < self.size.z;
        inside.then(|| ((d.y * self.size.z + d.z) * self.size.x + d.x) as usize)
    }

    pub fn get(&self, cell: IVec3) -> Option<Voxel> {
        self.index(cell).map(|i| self.voxels[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (IVec3, Voxel)> + '_ {
        let (o, s) = (self.origin, self.size);
        self.voxels.iter().enumerate().map(move |(i, v)| {
            let i = i as i32;
            let x = i % s.x;
            let z = (i / s.x) % s.z;
            let y = i / (s.x * s.z);
            (o + IVec3::new(x, y, z), *v)
        })
    }

    /// Copies the part of chunk `coords` that overlaps the snapshot.
    pub(crate) fn copy_from(&mut self, coords: IVec3, chunk: &VoxelDataChunk) {
        let dim = chunk.dim() as i32;
        let base = coords * dim;
        let lo = base.max(self.origin);
        let hi = (base + IVec3::splat(dim)).min(self.origin + self.size);
        for y in lo.y..hi.y {
            for z in lo.z..hi.z {
                for x in lo.x..hi.x {
                    let cell = IVec3::new(x, y, z);
                    if let Some(i) = self.index(cell) {
                        self.voxels[i] = chunk.get_local(cell - base);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_chunk::VoxelArray;

    #[test]
    fn copies_only_the_overlap() {
        let mut a = VoxelArray::cube(4, Voxel::AIR);
        a.set(3, 0, 3, Voxel::GROUND);
        let chunk = VoxelDataChunk::from_array(a);

        let mut snap = VoxelSnapshot::new(IVec3::new(6, 0, 6), IVec3::new(9, 2, 9), Aabb::default());
        snap.copy_from(IVec3::new(1, 0, 1), &chunk);
        assert_eq!(snap.len(), 18);
        assert_eq!(snap.get(IVec3::new(7, 0, 7)), Some(Voxel::GROUND));
        assert_eq!(snap.get(IVec3::new(6, 0, 6)), Some(Voxel::AIR));
        assert_eq!(snap.get(IVec3::new(9, 0, 9)), None);
    }

    #[test]
    fn iter_yields_absolute_cells_in_storage_order() {
        let snap = VoxelSnapshot::new(IVec3::new(1, 2, 3), IVec3::new(3, 4, 4), Aabb::default());
        let cells: Vec<IVec3> = snap.iter().map(|(c, _)| c).collect();
        assert_eq!(cells.len(), 4);
        assert_eq!(cells[0], IVec3::new(1, 2, 3));
        assert_eq!(cells[1], IVec3::new(2, 2, 3));
        assert_eq!(cells[2], IVec3::new(1, 3, 3));
        for (c, _) in snap.iter() {
            assert!(snap.get(c).is_some());
        }
    }
}
