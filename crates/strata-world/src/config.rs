use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use strata_chunk::MAX_LIGHT;
use strata_geom::{Aabb, IVec3, Vec3};
use strata_grid::{GridIndexer, MORTON_AXIS_LIMIT};
use thiserror::Error;

/// Smallest chunk edge for which sunlight never crosses more than one chunk
/// boundary, so a 3×3 column neighbourhood covers every voxel an edit can relight.
pub const MIN_CHUNK_SIZE: usize = MAX_LIGHT as usize - 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing world config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid world config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Deserialize)]
pub struct WorldConfig {
    #[serde(default = "default_bounding_box")]
    pub bounding_box: Aabb,
    #[serde(default = "default_grid_resolution")]
    pub grid_resolution: [i32; 3],
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Resident chunk budget for the cache.
    #[serde(default = "default_working_set")]
    pub working_set: usize,
    /// Chunks per region file along each axis.
    #[serde(default = "default_region_size")]
    pub region_size: i32,
    #[serde(default = "default_region_file_limit")]
    pub region_file_limit: usize,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// 0 lets the pool pick.
    #[serde(default)]
    pub worker_threads: usize,
    /// Fixed generation seed for a fresh journal; random when unset.
    #[serde(default)]
    pub seed: Option<i32>,
    #[serde(default)]
    pub generator: GeneratorConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            bounding_box: default_bounding_box(),
            grid_resolution: default_grid_resolution(),
            chunk_size: default_chunk_size(),
            working_set: default_working_set(),
            region_size: default_region_size(),
            region_file_limit: default_region_file_limit(),
            data_dir: default_data_dir(),
            worker_threads: 0,
            seed: None,
            generator: GeneratorConfig::default(),
        }
    }
}

fn default_bounding_box() -> Aabb {
    Aabb::new(Vec3::splat(512.0), Vec3::splat(512.0))
}
fn default_grid_resolution() -> [i32; 3] {
    [1024, 1024, 1024]
}
fn default_chunk_size() -> usize {
    32
}
fn default_working_set() -> usize {
    4096
}
fn default_region_size() -> i32 {
    8
}
fn default_region_file_limit() -> usize {
    32
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("world")
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorKind {
    Flat,
    Heightfield,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_kind")]
    pub kind: GeneratorKind,
    /// World-space height of the surface (mean surface for heightfields).
    #[serde(default = "default_ground_level")]
    pub ground_level: f32,
    #[serde(default = "default_amplitude")]
    pub amplitude: f32,
    #[serde(default = "default_frequency")]
    pub frequency: f32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            ground_level: default_ground_level(),
            amplitude: default_amplitude(),
            frequency: default_frequency(),
        }
    }
}

fn default_kind() -> GeneratorKind {
    GeneratorKind::Heightfield
}
fn default_ground_level() -> f32 {
    496.0
}
fn default_amplitude() -> f32 {
    24.0
}
fn default_frequency() -> f32 {
    0.008
}

impl WorldConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: WorldConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let s = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&s)
    }

    pub fn resolution(&self) -> IVec3 {
        IVec3::new(
            self.grid_resolution[0],
            self.grid_resolution[1],
            self.grid_resolution[2],
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        let e = self.bounding_box.extent;
        if !(e.x > 0.0 && e.y > 0.0 && e.z > 0.0) {
            return invalid(format!("bounding box extent {e:?} must be positive"));
        }
        let res = self.resolution();
        if res.x <= 0 || res.y <= 0 || res.z <= 0 {
            return invalid(format!("grid resolution {res:?} must be positive"));
        }
        if self.chunk_size < MIN_CHUNK_SIZE {
            return invalid(format!(
                "chunk_size {} is below the minimum of {MIN_CHUNK_SIZE}",
                self.chunk_size
            ));
        }
        let cs = self.chunk_size as i32;
        if res.x % cs != 0 || res.y % cs != 0 || res.z % cs != 0 {
            return invalid(format!(
                "grid resolution {res:?} is not a multiple of chunk_size {cs}"
            ));
        }
        let chunks = res.div_euclid(cs);
        if chunks.x > MORTON_AXIS_LIMIT || chunks.y > MORTON_AXIS_LIMIT || chunks.z > MORTON_AXIS_LIMIT
        {
            return invalid(format!(
                "chunk grid {chunks:?} exceeds {MORTON_AXIS_LIMIT} chunks per axis"
            ));
        }
        if self.region_size <= 0 {
            return invalid("region_size must be positive".into());
        }
        if self.working_set == 0 || self.region_file_limit == 0 {
            return invalid("working_set and region_file_limit must be positive".into());
        }
        Ok(())
    }

    pub fn voxel_grid(&self) -> GridIndexer {
        GridIndexer::new(self.bounding_box, self.resolution())
    }

    pub fn chunk_grid(&self) -> GridIndexer {
        self.voxel_grid().coarsened(self.chunk_size as i32)
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join("journal.jsonl")
    }

    pub fn regions_dir(&self) -> PathBuf {
        self.data_dir.join("regions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_reference_world() {
        let cfg = WorldConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.grid_resolution, [1024, 1024, 1024]);
        assert_eq!(cfg.chunk_grid().resolution(), IVec3::splat(32));
        assert_eq!(cfg.generator.kind, GeneratorKind::Heightfield);
    }

    #[test]
    fn overrides_are_read() {
        let cfg = WorldConfig::from_toml_str(
            r#"
            grid_resolution = [256, 128, 256]
            chunk_size = 16
            data_dir = "/tmp/w"
            seed = 7

            [bounding_box]
            center = { x = 128.0, y = 64.0, z = 128.0 }
            extent = { x = 128.0, y = 64.0, z = 128.0 }

            [generator]
            kind = "flat"
            ground_level = 40.0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.chunk_grid().resolution(), IVec3::new(16, 8, 16));
        assert_eq!(cfg.seed, Some(7));
        assert_eq!(cfg.generator.kind, GeneratorKind::Flat);
        assert_eq!(cfg.generator.ground_level, 40.0);
        assert_eq!(cfg.journal_path(), PathBuf::from("/tmp/w/journal.jsonl"));
    }

    #[test]
    fn rejects_indivisible_chunk_size() {
        let err = WorldConfig::from_toml_str("chunk_size = 30").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unaddressable_chunk_grid() {
        let err = WorldConfig::from_toml_str(
            "grid_resolution = [32768, 32, 32]\nchunk_size = 16",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(m) if m.contains("chunks per axis")));
    }

    #[test]
    fn rejects_chunks_narrower_than_light_reach() {
        let err = WorldConfig::from_toml_str("grid_resolution = [64, 64, 64]\nchunk_size = 8")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(m) if m.contains("minimum")));
        assert!(WorldConfig::from_toml_str("grid_resolution = [56, 56, 56]\nchunk_size = 14").is_ok());
    }

    #[test]
    fn load_from_missing_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = WorldConfig::load_from_path(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
