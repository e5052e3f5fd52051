use strata_geom::{Aabb, IVec3, Vec3};
use thiserror::Error;

use crate::morton::{MORTON_AXIS_LIMIT, MortonIndex};

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum IndexError {
    #[error("region [{min:?}, {max:?}] lies outside the grid")]
    OutOfBounds { min: Vec3, max: Vec3 },
    #[error("cell {0:?} lies outside the grid")]
    CellOutOfBounds(IVec3),
}

impl IndexError {
    fn point(p: Vec3) -> Self {
        IndexError::OutOfBounds { min: p, max: p }
    }

    fn region(r: &Aabb) -> Self {
        IndexError::OutOfBounds {
            min: r.min(),
            max: r.max(),
        }
    }
}

/// Maps a world-space box split into `resolution` cells onto integer cell coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridIndexer {
    bounding_box: Aabb,
    resolution: IVec3,
    cell_dimensions: Vec3,
}

impl GridIndexer {
    pub fn new(bounding_box: Aabb, resolution: IVec3) -> Self {
        debug_assert!(resolution.x > 0 && resolution.y > 0 && resolution.z > 0);
        let cell_dimensions = bounding_box.size().div_elem(resolution.as_vec3());
        Self {
            bounding_box,
            resolution,
            cell_dimensions,
        }
    }

    /// Grid over the same box with `factor` cells merged per axis (e.g. the chunk grid).
    pub fn coarsened(&self, factor: i32) -> Self {
        debug_assert!(factor > 0);
        debug_assert!(
            self.resolution.x % factor == 0
                && self.resolution.y % factor == 0
                && self.resolution.z % factor == 0,
            "resolution {:?} is not divisible by {factor}",
            self.resolution
        );
        Self::new(self.bounding_box, self.resolution.div_euclid(factor))
    }

    #[inline]
    pub fn bounding_box(&self) -> &Aabb {
        &self.bounding_box
    }

    #[inline]
    pub fn resolution(&self) -> IVec3 {
        self.resolution
    }

    #[inline]
    pub fn cell_dimensions(&self) -> Vec3 {
        self.cell_dimensions
    }

    /// True when every cell coordinate fits a [`MortonIndex`].
    pub fn morton_addressable(&self) -> bool {
        self.resolution.x <= MORTON_AXIS_LIMIT
            && self.resolution.y <= MORTON_AXIS_LIMIT
            && self.resolution.z <= MORTON_AXIS_LIMIT
    }

    #[inline]
    pub fn inbounds_point(&self, p: Vec3) -> bool {
        self.bounding_box.contains_point(p)
    }

    #[inline]
    pub fn inbounds_region(&self, r: &Aabb) -> bool {
        self.bounding_box.contains(r)
    }

    #[inline]
    pub fn inbounds_cell(&self, c: IVec3) -> bool {
        c.x >= 0
            && c.y >= 0
            && c.z >= 0
            && c.x < self.resolution.x
            && c.y < self.resolution.y
            && c.z < self.resolution.z
    }

    #[inline]
    fn relative(&self, p: Vec3) -> Vec3 {
        (p - self.bounding_box.min()).div_elem(self.cell_dimensions)
    }

    fn clamp_cell(&self, c: IVec3, upper: IVec3) -> IVec3 {
        c.max(IVec3::ZERO).min(upper)
    }

    pub fn cell_coords_at_point(&self, p: Vec3) -> Result<IVec3, IndexError> {
        if !self.inbounds_point(p) {
            return Err(IndexError::point(p));
        }
        let c = self.relative(p).floor().as_ivec3();
        Ok(self.clamp_cell(c, self.resolution - IVec3::ONE))
    }

    /// Exclusive upper cell bound for a region whose maximum corner is `p`.
    pub fn cell_coords_at_point_round_up(&self, p: Vec3) -> Result<IVec3, IndexError> {
        if !self.bounding_box.contains_point_closed(p) {
            return Err(IndexError::point(p));
        }
        let c = self.relative(p).ceil().as_ivec3();
        Ok(self.clamp_cell(c, self.resolution))
    }

    fn floor_coords_closed(&self, p: Vec3) -> Result<IVec3, IndexError> {
        if !self.bounding_box.contains_point_closed(p) {
            return Err(IndexError::point(p));
        }
        let c = self.relative(p).floor().as_ivec3();
        Ok(self.clamp_cell(c, self.resolution - IVec3::ONE))
    }

    pub fn cell_at_cell_coords(&self, c: IVec3) -> Result<Aabb, IndexError> {
        if !self.inbounds_cell(c) {
            return Err(IndexError::CellOutOfBounds(c));
        }
        let half = self.cell_dimensions * 0.5;
        let center = self.bounding_box.min()
            + self.cell_dimensions.mul_elem(c.as_vec3())
            + half;
        Ok(Aabb::new(center, half))
    }

    pub fn cell_at_point(&self, p: Vec3) -> Result<Aabb, IndexError> {
        self.cell_at_cell_coords(self.cell_coords_at_point(p)?)
    }

    pub fn index_at_cell_coords(&self, c: IVec3) -> Result<MortonIndex, IndexError> {
        if !self.inbounds_cell(c) || !self.morton_addressable() {
            return Err(IndexError::CellOutOfBounds(c));
        }
        Ok(MortonIndex::encode(c))
    }

    pub fn index_at_point(&self, p: Vec3) -> Result<MortonIndex, IndexError> {
        self.index_at_cell_coords(self.cell_coords_at_point(p)?)
    }

    /// Cells touched by `region` as `[min, max)`, never empty on any axis.
    pub fn cell_range(&self, region: &Aabb) -> Result<(IVec3, IVec3), IndexError> {
        if !self.inbounds_region(region) {
            return Err(IndexError::region(region));
        }
        let lo = self.floor_coords_closed(region.min())?;
        let hi = self.cell_coords_at_point_round_up(region.max())?;
        Ok((lo, hi.max(lo + IVec3::ONE)))
    }

    /// Cells of `region` clipped to the grid, or `None` when no cell overlaps it.
    ///
    /// Works on corner points directly, so clipping cannot push a corner out of
    /// bounds by rounding. A region touching only the far faces holds no cells.
    pub fn clipped_cell_range(&self, region: &Aabb) -> Option<(IVec3, IVec3)> {
        let (b0, b1) = (self.bounding_box.min(), self.bounding_box.max());
        let (r0, r1) = (region.min(), region.max());
        if r1.x < b0.x || r1.y < b0.y || r1.z < b0.z || r0.x >= b1.x || r0.y >= b1.y || r0.z >= b1.z {
            return None;
        }
        let lo = self.relative(r0.max(b0)).floor().as_ivec3();
        let hi = self.relative(r1.min(b1)).ceil().as_ivec3();
        let lo = self.clamp_cell(lo, self.resolution - IVec3::ONE);
        let hi = self.clamp_cell(hi, self.resolution).max(lo + IVec3::ONE);
        Some((lo, hi))
    }

    /// Grow `region` outward to whole cells. A point snaps to the center of its cell.
    pub fn snap_region_to_cell_boundaries(&self, region: &Aabb) -> Result<Aabb, IndexError> {
        if region.is_point() {
            let cell = self.cell_at_cell_coords(self.floor_coords_closed(region.center)?)?;
            return Ok(Aabb::point(cell.center));
        }
        let (lo, hi) = self.cell_range(region)?;
        let origin = self.bounding_box.min();
        Ok(Aabb::from_min_max(
            origin + self.cell_dimensions.mul_elem(lo.as_vec3()),
            origin + self.cell_dimensions.mul_elem(hi.as_vec3()),
        ))
    }

    /// Box covering the half-open cell range `[lo, hi)`.
    pub fn region_for_cells(&self, lo: IVec3, hi: IVec3) -> Aabb {
        let origin = self.bounding_box.min();
        Aabb::from_min_max(
            origin + self.cell_dimensions.mul_elem(lo.as_vec3()),
            origin + self.cell_dimensions.mul_elem(hi.as_vec3()),
        )
    }
}
