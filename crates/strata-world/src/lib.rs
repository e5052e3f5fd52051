//! World configuration and procedural chunk generators.
#![forbid(unsafe_code)]

pub mod config;
pub mod generator;

pub use config::{ConfigError, GeneratorConfig, GeneratorKind, MIN_CHUNK_SIZE, WorldConfig};
pub use generator::{FlatGenerator, Generator, HeightfieldGenerator, generator_from_config};
