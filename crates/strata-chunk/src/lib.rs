//! Voxel chunk representation: uniform Sky/Ground chunks and dense arrays.
#![forbid(unsafe_code)]

mod codec;

pub use codec::{CHUNK_FORMAT_VERSION, CHUNK_HEADER_LEN, CHUNK_MAGIC, CodecError, decode_chunk, encode_chunk};

use strata_geom::IVec3;

pub const MAX_LIGHT: u8 = 15;

/// Bytes per voxel in the uncompressed wire form.
pub const VOXEL_BYTES: usize = 6;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Voxel {
    pub value: f32,
    pub sun_light: u8,
    pub torch_light: u8,
}

impl Voxel {
    /// Empty space that has not been lit yet.
    pub const AIR: Voxel = Voxel {
        value: 0.0,
        sun_light: 0,
        torch_light: 0,
    };
    /// Open sky: empty and fully sunlit.
    pub const SKY: Voxel = Voxel {
        value: 0.0,
        sun_light: MAX_LIGHT,
        torch_light: 0,
    };
    pub const GROUND: Voxel = Voxel {
        value: 1.0,
        sun_light: 0,
        torch_light: 0,
    };

    #[inline]
    pub const fn solid(value: f32) -> Self {
        Voxel {
            value,
            sun_light: 0,
            torch_light: 0,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.value == 0.0
    }

    #[inline]
    pub fn write_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.value.to_le_bytes());
        out.push(self.sun_light);
        out.push(self.torch_light);
    }

    #[inline]
    pub fn from_bytes(b: &[u8]) -> Self {
        Voxel {
            value: f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            sun_light: b[4].min(MAX_LIGHT),
            torch_light: b[5],
        }
    }
}

/// Dense voxel grid, Y-major like the rest of the engine: `(y * sz + z) * sx + x`.
#[derive(Clone, Debug, PartialEq)]
pub struct VoxelArray {
    pub sx: usize,
    pub sy: usize,
    pub sz: usize,
    pub voxels: Vec<Voxel>,
}

impl VoxelArray {
    pub fn filled(sx: usize, sy: usize, sz: usize, v: Voxel) -> Self {
        VoxelArray {
            sx,
            sy,
            sz,
            voxels: vec![v; sx * sy * sz],
        }
    }

    #[inline]
    pub fn cube(dim: usize, v: Voxel) -> Self {
        Self::filled(dim, dim, dim, v)
    }

    /// Builds from a linear buffer, padding or truncating to the expected length.
    pub fn from_voxels(sx: usize, sy: usize, sz: usize, voxels: Vec<Voxel>) -> Self {
        let mut v = voxels;
        let expect = sx * sy * sz;
        if v.len() != expect {
            v.resize(expect, Voxel::AIR);
        }
        VoxelArray {
            sx,
            sy,
            sz,
            voxels: v,
        }
    }

    #[inline]
    pub fn idx(&self, x: usize, y: usize, z: usize) -> usize {
        (y * self.sz + z) * self.sx + x
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> Voxel {
        self.voxels[self.idx(x, y, z)]
    }

    #[inline]
    pub fn get_mut(&mut self, x: usize, y: usize, z: usize) -> &mut Voxel {
        let i = self.idx(x, y, z);
        &mut self.voxels[i]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, z: usize, v: Voxel) {
        let i = self.idx(x, y, z);
        self.voxels[i] = v;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.voxels.len() * VOXEL_BYTES);
        for v in &self.voxels {
            v.write_bytes(&mut out);
        }
        out
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkVariant {
    Array = 0,
    Sky = 1,
    Ground = 2,
}

impl ChunkVariant {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ChunkVariant::Array),
            1 => Some(ChunkVariant::Sky),
            2 => Some(ChunkVariant::Ground),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ChunkVoxels {
    Array(VoxelArray),
    Sky,
    Ground,
}

/// A cubic chunk of `dim³` voxels plus its lighting-equilibrium flag.
#[derive(Clone, Debug, PartialEq)]
pub struct VoxelDataChunk {
    dim: usize,
    voxels: ChunkVoxels,
    complete: bool,
}

impl VoxelDataChunk {
    pub fn sky(dim: usize) -> Self {
        Self {
            dim,
            voxels: ChunkVoxels::Sky,
            complete: false,
        }
    }

    pub fn ground(dim: usize) -> Self {
        Self {
            dim,
            voxels: ChunkVoxels::Ground,
            complete: false,
        }
    }

    pub fn from_array(array: VoxelArray) -> Self {
        debug_assert!(array.sx == array.sy && array.sy == array.sz);
        Self {
            dim: array.sx,
            voxels: ChunkVoxels::Array(array),
            complete: false,
        }
    }

    /// Classifies generator output: all-empty becomes Sky, all-ground becomes Ground.
    pub fn from_generated(array: VoxelArray) -> Self {
        let dim = array.sx;
        if array.voxels.iter().all(Voxel::is_empty) {
            return Self::sky(dim);
        }
        if array.voxels.iter().all(|v| *v == Voxel::GROUND) {
            return Self::ground(dim);
        }
        Self::from_array(array)
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    pub fn variant(&self) -> ChunkVariant {
        match self.voxels {
            ChunkVoxels::Array(_) => ChunkVariant::Array,
            ChunkVoxels::Sky => ChunkVariant::Sky,
            ChunkVoxels::Ground => ChunkVariant::Ground,
        }
    }

    #[inline]
    pub fn voxels(&self) -> &ChunkVoxels {
        &self.voxels
    }

    #[inline]
    pub fn is_sky(&self) -> bool {
        matches!(self.voxels, ChunkVoxels::Sky)
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    #[inline]
    pub fn set_complete(&mut self, complete: bool) {
        self.complete = complete;
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> Voxel {
        match &self.voxels {
            ChunkVoxels::Array(a) => a.get(x, y, z),
            ChunkVoxels::Sky => Voxel::SKY,
            ChunkVoxels::Ground => Voxel::GROUND,
        }
    }

    #[inline]
    pub fn get_local(&self, p: IVec3) -> Voxel {
        self.get(p.x as usize, p.y as usize, p.z as usize)
    }

    /// Writes one voxel. A uniform chunk is promoted to an array only when the
    /// stored value would change. Returns whether anything changed.
    pub fn set(&mut self, x: usize, y: usize, z: usize, v: Voxel) -> bool {
        let uniform = match &mut self.voxels {
            ChunkVoxels::Array(a) => {
                let slot = a.get_mut(x, y, z);
                if *slot == v {
                    return false;
                }
                *slot = v;
                return true;
            }
            ChunkVoxels::Sky => Voxel::SKY,
            ChunkVoxels::Ground => Voxel::GROUND,
        };
        if uniform == v {
            return false;
        }
        let mut a = VoxelArray::cube(self.dim, uniform);
        a.set(x, y, z, v);
        self.voxels = ChunkVoxels::Array(a);
        true
    }

    #[inline]
    pub fn set_local(&mut self, p: IVec3, v: Voxel) -> bool {
        self.set(p.x as usize, p.y as usize, p.z as usize, v)
    }

    /// Mutable access to the dense grid, if there is one.
    #[inline]
    pub fn array_mut(&mut self) -> Option<&mut VoxelArray> {
        match &mut self.voxels {
            ChunkVoxels::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Empty for uniform chunks.
    pub fn uncompressed_bytes(&self) -> Vec<u8> {
        match &self.voxels {
            ChunkVoxels::Array(a) => a.to_bytes(),
            ChunkVoxels::Sky | ChunkVoxels::Ground => Vec::new(),
        }
    }

    /// Drops accumulated sunlight and marks the chunk as needing propagation.
    pub fn clear_sunlight(&mut self) {
        self.complete = false;
        if let ChunkVoxels::Array(a) = &mut self.voxels {
            for v in a.voxels.iter_mut() {
                v.sun_light = 0;
            }
        }
    }
}
