use tapedeck_net::NetError;
use tapedeck_storage::StorageError;
use thiserror::Error;

pub type CacheResult<T> = Result<T, CacheError>;

/// Centralized error type for tapedeck-cache.
#[derive(Debug, Error, Clone)]
pub enum CacheError {
    #[error("cache is not open")]
    NotOpen,

    #[error("cache is closed")]
    Closed,

    #[error("read of {length} bytes at offset {offset} exceeds file size {size}")]
    ReadPastEnd { offset: u64, length: u64, size: u64 },

    #[error("read of {length} bytes exceeds cache budget of {budget}")]
    BudgetExceeded { length: u64, budget: u64 },

    #[error("network error: {0}")]
    Net(#[from] NetError),

    #[error("fatal network failure: {0}")]
    Fatal(NetError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
