use tapedeck_cache::CacheError;
use thiserror::Error;

pub type SourceResult<T> = Result<T, SourceError>;

/// Centralized error type for tapedeck-source.
#[derive(Debug, Error, Clone)]
pub enum SourceError {
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("not a tape recording (bad magic)")]
    BadMagic,

    #[error("malformed recording: {0}")]
    Malformed(String),

    #[error("unknown topic {0:?}")]
    UnknownTopic(String),

    #[error("operation aborted")]
    Aborted,

    #[error("source is not initialized")]
    NotInitialized,

    #[error("source is terminated")]
    Terminated,
}
