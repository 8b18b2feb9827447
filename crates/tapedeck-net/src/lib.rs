#![forbid(unsafe_code)]

//! `tapedeck-net`
//!
//! Ranged fetching for remote recording files.
//!
//! [`RangedFetch`] is the transport seam the cache layer consumes:
//! [`HttpFetcher`] implements it over HTTP ranged GET, [`MemoryFetcher`]
//! serves an in-memory byte blob for tests.

mod error;
mod http;
mod memory;
mod traits;
mod types;

pub use error::{NetError, NetResult};
pub use http::HttpFetcher;
pub use memory::{FetchScript, MemoryFetcher};
pub use traits::{ByteStream, RangedFetch};
pub use types::{FileIdentifier, NetOptions, RangeSpec, RemoteFile};
