use std::io::{self, Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use thiserror::Error;

use crate::{ChunkVariant, ChunkVoxels, VOXEL_BYTES, Voxel, VoxelArray, VoxelDataChunk};

pub const CHUNK_MAGIC: [u8; 4] = *b"VXCK";
pub const CHUNK_FORMAT_VERSION: u16 = 1;
pub const CHUNK_HEADER_LEN: usize = 20;

const FLAG_COMPLETE: u8 = 1;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("chunk payload truncated ({0} bytes)")]
    Truncated(usize),
    #[error("bad chunk magic {0:02x?}")]
    BadMagic([u8; 4]),
    #[error("unsupported chunk format version {0}")]
    UnsupportedVersion(u16),
    #[error("unknown chunk variant tag {0}")]
    UnknownVariant(u8),
    #[error("chunk length mismatch: expected {expected}, found {found}")]
    LengthMismatch { expected: usize, found: usize },
    #[error("chunk checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },
    #[error("chunk compression failed: {0}")]
    Compress(#[source] io::Error),
    #[error("chunk decompression failed: {0}")]
    Decompress(#[source] io::Error),
}

/// Serializes a chunk: fixed header followed by the zlib-compressed voxel bytes.
/// Uniform chunks carry no payload.
pub fn encode_chunk(chunk: &VoxelDataChunk) -> Result<Vec<u8>, CodecError> {
    let raw = chunk.uncompressed_bytes();
    let compressed = if raw.is_empty() {
        Vec::new()
    } else {
        let mut enc = ZlibEncoder::new(Vec::with_capacity(raw.len() / 4), Compression::fast());
        enc.write_all(&raw).map_err(CodecError::Compress)?;
        enc.finish().map_err(CodecError::Compress)?
    };
    let crc = crc32fast::hash(&raw);
    let mut out = Vec::with_capacity(CHUNK_HEADER_LEN + compressed.len());
    out.extend_from_slice(&CHUNK_MAGIC);
    out.extend_from_slice(&CHUNK_FORMAT_VERSION.to_le_bytes());
    out.push(chunk.variant() as u8);
    out.push(if chunk.is_complete() { FLAG_COMPLETE } else { 0 });
    out.extend_from_slice(&(raw.len() as u32).to_le_bytes());
    out.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(&compressed);
    Ok(out)
}

#[inline]
fn le_u32(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

/// Inverse of [`encode_chunk`]. Trailing bytes past the payload are ignored.
pub fn decode_chunk(bytes: &[u8], dim: usize) -> Result<VoxelDataChunk, CodecError> {
    if bytes.len() < CHUNK_HEADER_LEN {
        return Err(CodecError::Truncated(bytes.len()));
    }
    let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if magic != CHUNK_MAGIC {
        return Err(CodecError::BadMagic(magic));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != CHUNK_FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let variant = ChunkVariant::from_tag(bytes[6]).ok_or(CodecError::UnknownVariant(bytes[6]))?;
    let complete = bytes[7] & FLAG_COMPLETE != 0;
    let raw_len = le_u32(bytes, 8) as usize;
    let packed_len = le_u32(bytes, 12) as usize;
    let stored_crc = le_u32(bytes, 16);
    let end = CHUNK_HEADER_LEN + packed_len;
    if bytes.len() < end {
        return Err(CodecError::Truncated(bytes.len()));
    }
    let expected = match variant {
        ChunkVariant::Array => dim * dim * dim * VOXEL_BYTES,
        ChunkVariant::Sky | ChunkVariant::Ground => 0,
    };
    if raw_len != expected {
        return Err(CodecError::LengthMismatch {
            expected,
            found: raw_len,
        });
    }

    let raw = if packed_len == 0 {
        Vec::new()
    } else {
        let mut raw = Vec::with_capacity(raw_len);
        // One byte past the declared length is enough to detect an overlong payload.
        ZlibDecoder::new(&bytes[CHUNK_HEADER_LEN..end])
            .take(raw_len as u64 + 1)
            .read_to_end(&mut raw)
            .map_err(CodecError::Decompress)?;
        raw
    };
    if raw.len() != raw_len {
        return Err(CodecError::LengthMismatch {
            expected: raw_len,
            found: raw.len(),
        });
    }
    let computed = crc32fast::hash(&raw);
    if computed != stored_crc {
        return Err(CodecError::ChecksumMismatch {
            stored: stored_crc,
            computed,
        });
    }

    let voxels = match variant {
        ChunkVariant::Sky => ChunkVoxels::Sky,
        ChunkVariant::Ground => ChunkVoxels::Ground,
        ChunkVariant::Array => {
            let voxels = raw.chunks_exact(VOXEL_BYTES).map(Voxel::from_bytes).collect();
            ChunkVoxels::Array(VoxelArray::from_voxels(dim, dim, dim, voxels))
        }
    };
    let mut chunk = match voxels {
        ChunkVoxels::Array(a) => VoxelDataChunk::from_array(a),
        ChunkVoxels::Sky => VoxelDataChunk::sky(dim),
        ChunkVoxels::Ground => VoxelDataChunk::ground(dim),
    };
    chunk.set_complete(complete);
    Ok(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_array(dim: usize) -> VoxelDataChunk {
        let mut c = VoxelDataChunk::ground(dim);
        for x in 0..dim {
            for z in 0..dim {
                c.set(x, dim - 1, z, Voxel { value: 0.0, sun_light: 7, torch_light: 2 });
            }
        }
        c
    }

    #[test]
    fn roundtrip_all_variants() {
        for chunk in [VoxelDataChunk::sky(8), VoxelDataChunk::ground(8), sample_array(8)] {
            let bytes = encode_chunk(&chunk).unwrap();
            let back = decode_chunk(&bytes, 8).unwrap();
            assert_eq!(back.uncompressed_bytes(), chunk.uncompressed_bytes());
            assert_eq!(back.variant(), chunk.variant());
        }
    }

    #[test]
    fn uniform_chunks_have_header_only() {
        let bytes = encode_chunk(&VoxelDataChunk::sky(32)).unwrap();
        assert_eq!(bytes.len(), CHUNK_HEADER_LEN);
    }

    #[test]
    fn padding_is_tolerated_and_flag_kept() {
        let mut chunk = sample_array(4);
        chunk.set_complete(true);
        let mut bytes = encode_chunk(&chunk).unwrap();
        bytes.extend_from_slice(&[0; 13]);
        let back = decode_chunk(&bytes, 4).unwrap();
        assert!(back.is_complete());
        assert_eq!(back, chunk);
    }

    #[test]
    fn corruption_is_detected() {
        let bytes = encode_chunk(&sample_array(4)).unwrap();

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(matches!(decode_chunk(&bad_magic, 4), Err(CodecError::BadMagic(_))));

        let mut bad_version = bytes.clone();
        bad_version[4] = 9;
        assert!(matches!(decode_chunk(&bad_version, 4), Err(CodecError::UnsupportedVersion(9))));

        let mut bad_crc = bytes.clone();
        bad_crc[16] ^= 0xff;
        assert!(matches!(decode_chunk(&bad_crc, 4), Err(CodecError::ChecksumMismatch { .. })));

        assert!(matches!(decode_chunk(&bytes[..10], 4), Err(CodecError::Truncated(10))));
    }

    #[test]
    fn declared_length_is_checked_before_inflating() {
        let mut huge = encode_chunk(&sample_array(4)).unwrap();
        huge[8..12].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            decode_chunk(&huge, 4),
            Err(CodecError::LengthMismatch { expected: 384, .. })
        ));

        let mut sky = encode_chunk(&VoxelDataChunk::sky(4)).unwrap();
        sky[8..12].copy_from_slice(&64u32.to_le_bytes());
        assert!(matches!(decode_chunk(&sky, 4), Err(CodecError::LengthMismatch { .. })));
    }

    #[test]
    fn overlong_payload_stops_one_byte_past_the_declared_length() {
        let raw_len = 4 * 4 * 4 * VOXEL_BYTES;
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::fast());
        enc.write_all(&vec![0u8; raw_len * 1000]).unwrap();
        let packed = enc.finish().unwrap();

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&CHUNK_MAGIC);
        bytes.extend_from_slice(&CHUNK_FORMAT_VERSION.to_le_bytes());
        bytes.push(ChunkVariant::Array as u8);
        bytes.push(0);
        bytes.extend_from_slice(&(raw_len as u32).to_le_bytes());
        bytes.extend_from_slice(&(packed.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&packed);
        match decode_chunk(&bytes, 4) {
            Err(CodecError::LengthMismatch { expected, found }) => {
                assert_eq!(expected, raw_len);
                assert_eq!(found, raw_len + 1);
            }
            other => panic!("expected a length mismatch, got {other:?}"),
        }
    }
}
