use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use strata_edit::TerrainOperation;
use strata_geom::{Aabb, IVec3, Vec3};
use strata_runtime::VoxelWorld;
use strata_world::WorldConfig;

#[derive(Parser, Debug)]
#[command(name = "strata", about = "Inspect and edit a chunked voxel world")]
struct Cli {
    /// World configuration (TOML). Built-in defaults are used when the file is missing.
    #[arg(short, long, default_value = "world.toml")]
    config: PathBuf,

    /// Overrides `data_dir` from the configuration.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print grid sizes, the seed and cache/store counters
    Info,
    /// Set the voxel containing a world-space point
    Set {
        #[arg(allow_hyphen_values = true)]
        x: f32,
        #[arg(allow_hyphen_values = true)]
        y: f32,
        #[arg(allow_hyphen_values = true)]
        z: f32,
        value: f32,
    },
    /// Write every voxel whose center lies inside a sphere
    Sphere {
        #[arg(allow_hyphen_values = true)]
        x: f32,
        #[arg(allow_hyphen_values = true)]
        y: f32,
        #[arg(allow_hyphen_values = true)]
        z: f32,
        radius: f32,
        value: f32,
    },
    /// Write every voxel touched by the box between two corners
    Fill {
        #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"], allow_hyphen_values = true)]
        min: Vec<f32>,
        #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"], allow_hyphen_values = true)]
        max: Vec<f32>,
        #[arg(long)]
        value: f32,
    },
    /// Print the lit voxel at a world-space point
    Probe {
        #[arg(allow_hyphen_values = true)]
        x: f32,
        #[arg(allow_hyphen_values = true)]
        y: f32,
        #[arg(allow_hyphen_values = true)]
        z: f32,
    },
    /// Fault in every chunk within RADIUS chunks of the world's center column
    Prefetch { radius: i32 },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        WorldConfig::load_from_path(&cli.config)
            .with_context(|| format!("loading {}", cli.config.display()))?
    } else {
        log::info!("{} not found; using defaults", cli.config.display());
        WorldConfig::default()
    };
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    let world = VoxelWorld::open(config, None).context("opening world")?;
    match cli.command {
        Command::Info => info(&world),
        Command::Set { x, y, z, value } => write(
            &world,
            TerrainOperation::SetVoxel {
                position: Vec3::new(x, y, z),
                value,
            },
        )?,
        Command::Sphere {
            x,
            y,
            z,
            radius,
            value,
        } => {
            if radius.is_nan() || radius <= 0.0 {
                bail!("sphere radius must be positive, got {radius}");
            }
            write(
                &world,
                TerrainOperation::Sphere {
                    center: Vec3::new(x, y, z),
                    radius,
                    value,
                },
            )?
        }
        Command::Fill { min, max, value } => write(
            &world,
            TerrainOperation::FillBox {
                region: Aabb::from_min_max(vec3(&min), vec3(&max)),
                value,
            },
        )?,
        Command::Probe { x, y, z } => {
            let p = Vec3::new(x, y, z);
            let cell = world.voxel_grid().cell_coords_at_point(p)?;
            let voxel = world
                .reader_transaction(&Aabb::point(p), |snap| snap.get(cell))
                .with_context(|| format!("reading {p:?}"))?
                .context("probed cell missing from snapshot")?;
            println!(
                "cell {:?}: value {} sun {} torch {}",
                cell, voxel.value, voxel.sun_light, voxel.torch_light
            );
        }
        Command::Prefetch { radius } => {
            let res = world.chunk_grid().resolution();
            let (cx, cz) = (res.x / 2, res.z / 2);
            let r = radius.max(0);
            let mut coords = Vec::new();
            for y in 0..res.y {
                for z in (cz - r).max(0)..(cz + r + 1).min(res.z) {
                    for x in (cx - r).max(0)..(cx + r + 1).min(res.x) {
                        coords.push(IVec3::new(x, y, z));
                    }
                }
            }
            let started = std::time::Instant::now();
            let n = world.prefetch(&coords)?;
            println!("prefetched {n} chunks in {:.2?}", started.elapsed());
        }
    }

    world.flush().context("flushing chunk store")?;
    Ok(())
}

fn vec3(v: &[f32]) -> Vec3 {
    Vec3::new(v[0], v[1], v[2])
}

fn write(world: &VoxelWorld, op: TerrainOperation) -> Result<()> {
    let name = op.name();
    let report = world
        .writer_transaction(op)
        .with_context(|| format!("applying {name}"))?;
    println!(
        "{name}: {} voxels written, {} changed, {} chunks stored",
        report.voxels_written, report.voxels_changed, report.chunks_persisted
    );
    Ok(())
}

fn info(world: &VoxelWorld) {
    let config = world.config();
    let stats = world.stats();
    println!("data dir        {}", config.data_dir.display());
    println!("seed            {}", world.seed());
    println!("bounding box    {:?}", world.voxel_grid().bounding_box());
    println!("voxel grid      {:?}", world.voxel_grid().resolution());
    println!("chunk grid      {:?}", world.chunk_grid().resolution());
    println!("chunk size      {}", config.chunk_size);
    println!(
        "cache           {} entries, {} hits, {} misses, {} evictions",
        stats.cache.entries, stats.cache.hits, stats.cache.misses, stats.cache.evictions
    );
    println!(
        "store           {} open region files, {} loads ({} hits), {} stores, {} bytes",
        stats.store.open_region_files,
        stats.store.loads,
        stats.store.load_hits,
        stats.store.stores,
        stats.store.bytes_stored
    );
    println!("generated       {}", stats.chunks_generated);
    println!("lighting runs   {}", stats.lighting_runs);
    println!("journal entries {}", stats.journal_entries);
}
