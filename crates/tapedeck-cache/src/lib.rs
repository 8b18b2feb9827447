#![forbid(unsafe_code)]

//! `tapedeck-cache`
//!
//! [`CachedFile`] presents a `read(offset, length) -> Bytes` view over a
//! remote recording by coordinating one long-running ranged download stream
//! with a block-addressed LRU buffer, a pending-read queue, and a
//! connection-decision policy.

mod cached_file;
mod error;
mod options;
mod policy;

pub use cached_file::{CachedFile, ReconnectCallback};
pub use error::{CacheError, CacheResult};
pub use options::CacheOptions;
pub use policy::{ConnectionDecision, PolicyInputs, decide_connection};
