#![forbid(unsafe_code)]

//! `tapedeck-storage`
//!
//! Storage primitives for the tapedeck playback stack.
//!
//! - [`ByteRanges`]: canonical interval arithmetic over `[start, end)` byte
//!   ranges (union, subtract, coverage, complement).
//! - [`BlockBuffer`]: a fixed-logical-size byte buffer backed by on-demand
//!   blocks with LRU eviction, tracking which byte ranges hold valid data.

mod block_buffer;
mod error;
mod ranges;

pub use block_buffer::BlockBuffer;
pub use error::{StorageError, StorageResult};
pub use ranges::ByteRanges;
