//! Minimal geometry types shared by the storage crates.
#![forbid(unsafe_code)]

use core::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::splat(0.0);
    pub const ONE: Vec3 = Vec3::splat(1.0);

    #[inline]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub const fn splat(v: f32) -> Self {
        Self { x: v, y: v, z: v }
    }

    #[inline]
    pub fn abs(self) -> Vec3 {
        Vec3::new(self.x.abs(), self.y.abs(), self.z.abs())
    }

    #[inline]
    pub fn min(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x.min(rhs.x), self.y.min(rhs.y), self.z.min(rhs.z))
    }

    #[inline]
    pub fn max(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x.max(rhs.x), self.y.max(rhs.y), self.z.max(rhs.z))
    }

    #[inline]
    pub fn floor(self) -> Vec3 {
        Vec3::new(self.x.floor(), self.y.floor(), self.z.floor())
    }

    #[inline]
    pub fn ceil(self) -> Vec3 {
        Vec3::new(self.x.ceil(), self.y.ceil(), self.z.ceil())
    }

    /// Component-wise product.
    #[inline]
    pub fn mul_elem(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x * rhs.x, self.y * rhs.y, self.z * rhs.z)
    }

    /// Component-wise quotient.
    #[inline]
    pub fn div_elem(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x / rhs.x, self.y / rhs.y, self.z / rhs.z)
    }

    #[inline]
    pub fn dot(self, rhs: Vec3) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    #[inline]
    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    #[inline]
    pub fn as_ivec3(self) -> IVec3 {
        IVec3::new(self.x as i32, self.y as i32, self.z as i32)
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    #[inline]
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    #[inline]
    fn add_assign(&mut self, rhs: Vec3) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    #[inline]
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl SubAssign for Vec3 {
    #[inline]
    fn sub_assign(&mut self, rhs: Vec3) {
        self.x -= rhs.x;
        self.y -= rhs.y;
        self.z -= rhs.z;
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;
    #[inline]
    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Div<f32> for Vec3 {
    type Output = Vec3;
    #[inline]
    fn div(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl Neg for Vec3 {
    type Output = Vec3;
    #[inline]
    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

/// Integer cell / chunk coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct IVec3 {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl IVec3 {
    pub const ZERO: IVec3 = IVec3::splat(0);
    pub const ONE: IVec3 = IVec3::splat(1);

    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub const fn splat(v: i32) -> Self {
        Self { x: v, y: v, z: v }
    }

    #[inline]
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    #[inline]
    pub fn min(self, rhs: IVec3) -> IVec3 {
        IVec3::new(self.x.min(rhs.x), self.y.min(rhs.y), self.z.min(rhs.z))
    }

    #[inline]
    pub fn max(self, rhs: IVec3) -> IVec3 {
        IVec3::new(self.x.max(rhs.x), self.y.max(rhs.y), self.z.max(rhs.z))
    }

    #[inline]
    pub fn div_euclid(self, d: i32) -> IVec3 {
        IVec3::new(self.x.div_euclid(d), self.y.div_euclid(d), self.z.div_euclid(d))
    }

    #[inline]
    pub fn rem_euclid(self, d: i32) -> IVec3 {
        IVec3::new(self.x.rem_euclid(d), self.y.rem_euclid(d), self.z.rem_euclid(d))
    }

    #[inline]
    pub fn as_vec3(self) -> Vec3 {
        Vec3::new(self.x as f32, self.y as f32, self.z as f32)
    }

    /// Number of cells in the half-open box `[self, end)`; zero if empty on any axis.
    #[inline]
    pub fn volume_to(self, end: IVec3) -> usize {
        let d = end - self;
        if d.x <= 0 || d.y <= 0 || d.z <= 0 {
            return 0;
        }
        d.x as usize * d.y as usize * d.z as usize
    }
}

impl Add for IVec3 {
    type Output = IVec3;
    #[inline]
    fn add(self, rhs: IVec3) -> IVec3 {
        IVec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for IVec3 {
    type Output = IVec3;
    #[inline]
    fn sub(self, rhs: IVec3) -> IVec3 {
        IVec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<i32> for IVec3 {
    type Output = IVec3;
    #[inline]
    fn mul(self, rhs: i32) -> IVec3 {
        IVec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl From<(i32, i32, i32)> for IVec3 {
    fn from(value: (i32, i32, i32)) -> Self {
        Self::new(value.0, value.1, value.2)
    }
}

impl From<IVec3> for (i32, i32, i32) {
    fn from(value: IVec3) -> Self {
        (value.x, value.y, value.z)
    }
}

/// Axis-aligned region stored as center and half extents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub center: Vec3,
    pub extent: Vec3,
}

impl Aabb {
    /// Negative extents are folded to their magnitude.
    #[inline]
    pub fn new(center: Vec3, extent: Vec3) -> Self {
        Self {
            center,
            extent: extent.abs(),
        }
    }

    #[inline]
    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        let lo = min.min(max);
        let hi = min.max(max);
        Self {
            center: (lo + hi) * 0.5,
            extent: (hi - lo) * 0.5,
        }
    }

    #[inline]
    pub fn point(p: Vec3) -> Self {
        Self {
            center: p,
            extent: Vec3::ZERO,
        }
    }

    #[inline]
    pub fn min(&self) -> Vec3 {
        self.center - self.extent
    }

    #[inline]
    pub fn max(&self) -> Vec3 {
        self.center + self.extent
    }

    #[inline]
    pub fn size(&self) -> Vec3 {
        self.extent * 2.0
    }

    #[inline]
    pub fn is_point(&self) -> bool {
        self.extent == Vec3::ZERO
    }

    /// Overlap test used for lock conflicts. Boxes that merely share a face do not
    /// intersect; a box that is flat on an axis intersects anything it touches there.
    pub fn intersects(&self, other: &Aabb) -> bool {
        let (a0, a1) = (self.min(), self.max());
        let (b0, b1) = (other.min(), other.max());
        axis_overlaps(a0.x, a1.x, self.extent.x, b0.x, b1.x, other.extent.x)
            && axis_overlaps(a0.y, a1.y, self.extent.y, b0.y, b1.y, other.extent.y)
            && axis_overlaps(a0.z, a1.z, self.extent.z, b0.z, b1.z, other.extent.z)
    }

    /// Clip against `other`. Touching boxes yield a flat region.
    pub fn intersect(&self, other: &Aabb) -> Option<Aabb> {
        let lo = self.min().max(other.min());
        let hi = self.max().min(other.max());
        if hi.x < lo.x || hi.y < lo.y || hi.z < lo.z {
            return None;
        }
        Some(Aabb::from_min_max(lo, hi))
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb::from_min_max(self.min().min(other.min()), self.max().max(other.max()))
    }

    #[inline]
    pub fn expanded(&self, by: Vec3) -> Aabb {
        Aabb::new(self.center, self.extent + by.abs())
    }

    /// Half-open containment: `min <= p < max`.
    #[inline]
    pub fn contains_point(&self, p: Vec3) -> bool {
        let (lo, hi) = (self.min(), self.max());
        p.x >= lo.x && p.y >= lo.y && p.z >= lo.z && p.x < hi.x && p.y < hi.y && p.z < hi.z
    }

    #[inline]
    pub fn contains_point_closed(&self, p: Vec3) -> bool {
        let (lo, hi) = (self.min(), self.max());
        p.x >= lo.x && p.y >= lo.y && p.z >= lo.z && p.x <= hi.x && p.y <= hi.y && p.z <= hi.z
    }

    #[inline]
    pub fn contains(&self, other: &Aabb) -> bool {
        self.contains_point_closed(other.min()) && self.contains_point_closed(other.max())
    }
}

#[inline]
fn axis_overlaps(a0: f32, a1: f32, ae: f32, b0: f32, b1: f32, be: f32) -> bool {
    let lo = a0.max(b0);
    let hi = a1.min(b1);
    hi > lo || (hi == lo && (ae == 0.0 || be == 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(min: f32, max: f32) -> Aabb {
        Aabb::from_min_max(Vec3::splat(min), Vec3::splat(max))
    }

    #[test]
    fn face_sharing_boxes_do_not_intersect() {
        assert!(!cube(0.0, 32.0).intersects(&cube(32.0, 64.0)));
        assert!(cube(0.0, 33.0).intersects(&cube(32.0, 64.0)));
    }

    #[test]
    fn points_intersect_containing_boxes_and_themselves() {
        let p = Aabb::point(Vec3::splat(16.5));
        assert!(p.intersects(&p));
        assert!(p.intersects(&cube(0.0, 32.0)));
        assert!(!p.intersects(&cube(17.0, 32.0)));
        let face = Aabb::point(Vec3::new(32.0, 5.0, 5.0));
        assert!(face.intersects(&cube(0.0, 32.0)));
    }

    #[test]
    fn intersect_clips() {
        let a = cube(0.0, 10.0);
        let b = cube(5.0, 20.0);
        let c = a.intersect(&b).unwrap();
        assert_eq!(c.min(), Vec3::splat(5.0));
        assert_eq!(c.max(), Vec3::splat(10.0));
        assert!(a.intersect(&cube(11.0, 12.0)).is_none());
    }

    #[test]
    fn half_open_containment() {
        let a = cube(0.0, 8.0);
        assert!(a.contains_point(Vec3::ZERO));
        assert!(!a.contains_point(Vec3::splat(8.0)));
        assert!(a.contains_point_closed(Vec3::splat(8.0)));
    }
}
