use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

/// Centralized error type for tapedeck-storage.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("range {start}..{end} is out of bounds for buffer of {size} bytes")]
    OutOfBounds { start: u64, end: u64, size: u64 },

    #[error("invalid range {start}..{end}")]
    InvalidRange { start: u64, end: u64 },

    #[error("range {start}..{end} is not fully buffered")]
    NotBuffered { start: u64, end: u64 },
}
