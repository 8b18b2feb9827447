use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::error::NetError;
use crate::types::RemoteFile;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, NetError>> + Send>>;

/// Random-access fetch contract over a remote recording file.
///
/// # Contract (normative)
/// - `open` probes the remote and fails unless it supports byte-granular
///   ranged reads and reports a usable size. It is side-effect free and may
///   be called more than once.
/// - `fetch(offset, length)` returns a stream over exactly the bytes of
///   `[offset, offset + length)`, emitting zero or more chunks followed by
///   stream end or an error item.
/// - Dropping the returned stream cancels the transfer; no further network
///   traffic may occur for it.
#[async_trait]
pub trait RangedFetch: Send + Sync + 'static {
    /// Probe the remote file, returning its size and change identifier.
    async fn open(&self) -> Result<RemoteFile, NetError>;

    /// Stream the bytes of `[offset, offset + length)`.
    async fn fetch(&self, offset: u64, length: u64) -> Result<ByteStream, NetError>;
}
