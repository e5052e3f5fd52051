use strata_chunk::CodecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt zone: {0}")]
    Corruption(String),
    #[error("zone capacity exhausted: {0}")]
    CapacityExhausted(String),
    #[error("chunk payload: {0}")]
    Codec(#[from] CodecError),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
