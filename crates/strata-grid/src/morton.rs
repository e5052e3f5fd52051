use serde::{Deserialize, Serialize};
use strata_geom::IVec3;

pub const MORTON_AXIS_BITS: u32 = 10;
/// Exclusive upper bound for each encoded coordinate.
pub const MORTON_AXIS_LIMIT: i32 = 1 << MORTON_AXIS_BITS;

const X_MASK: u32 = 0x0924_9249;
const Y_MASK: u32 = X_MASK << 1;
const Z_MASK: u32 = X_MASK << 2;

/// 32-bit Z-order key over three 10-bit coordinates (x in bit 0 of each triple).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MortonIndex(pub u32);

#[inline]
fn spread(v: u32) -> u32 {
    let mut x = v & 0x3ff;
    x = (x | (x << 16)) & 0x0300_00ff;
    x = (x | (x << 8)) & 0x0300_f00f;
    x = (x | (x << 4)) & 0x030c_30c3;
    x = (x | (x << 2)) & X_MASK;
    x
}

#[inline]
fn compact(v: u32) -> u32 {
    let mut x = v & X_MASK;
    x = (x ^ (x >> 2)) & 0x030c_30c3;
    x = (x ^ (x >> 4)) & 0x0300_f00f;
    x = (x ^ (x >> 8)) & 0x0300_00ff;
    x = (x ^ (x >> 16)) & 0x0000_03ff;
    x
}

#[inline]
fn step_up(code: u32, axis: u32, unit: u32) -> u32 {
    let others = !axis;
    (((code | others).wrapping_add(unit)) & axis) | (code & others)
}

#[inline]
fn step_down(code: u32, axis: u32, unit: u32) -> u32 {
    let others = !axis;
    (((code & axis).wrapping_sub(unit)) & axis) | (code & others)
}

impl MortonIndex {
    #[inline]
    pub fn encode(p: IVec3) -> Self {
        debug_assert!(
            (0..MORTON_AXIS_LIMIT).contains(&p.x)
                && (0..MORTON_AXIS_LIMIT).contains(&p.y)
                && (0..MORTON_AXIS_LIMIT).contains(&p.z),
            "morton coordinate out of range: {p:?}"
        );
        MortonIndex(spread(p.x as u32) | (spread(p.y as u32) << 1) | (spread(p.z as u32) << 2))
    }

    #[inline]
    pub fn decode(self) -> IVec3 {
        IVec3::new(
            compact(self.0) as i32,
            compact(self.0 >> 1) as i32,
            compact(self.0 >> 2) as i32,
        )
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn inc_x(self) -> Self {
        MortonIndex(step_up(self.0, X_MASK, 1))
    }

    #[inline]
    pub fn inc_y(self) -> Self {
        MortonIndex(step_up(self.0, Y_MASK, 2))
    }

    #[inline]
    pub fn inc_z(self) -> Self {
        MortonIndex(step_up(self.0, Z_MASK, 4))
    }

    #[inline]
    pub fn dec_x(self) -> Self {
        MortonIndex(step_down(self.0, X_MASK, 1))
    }

    #[inline]
    pub fn dec_y(self) -> Self {
        MortonIndex(step_down(self.0, Y_MASK, 2))
    }

    #[inline]
    pub fn dec_z(self) -> Self {
        MortonIndex(step_down(self.0, Z_MASK, 4))
    }
}

impl From<IVec3> for MortonIndex {
    fn from(p: IVec3) -> Self {
        MortonIndex::encode(p)
    }
}
