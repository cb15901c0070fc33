use thiserror::Error;

/// Convenience alias used throughout the crate for fallible cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("null argument: {0}")]
    NullArgument(String),

    #[error("cache is closed")]
    Closed,

    #[error("read-through loader failed: {0}")]
    Loader(String),

    #[error("write-through writer failed: {0}")]
    Writer(String),

    #[error("write-through writer rejected {} key(s)", failed_keys.len())]
    WriterBatch { failed_keys: Vec<String> },

    #[error("entry processor failed: {0}")]
    Processor(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::error::EncodeError),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] bincode::error::DecodeError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("listener already registered")]
    DuplicateListener,

    #[error("not stored: cache is over-full under the drop jam policy")]
    NotStored,
}
