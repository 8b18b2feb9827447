//! In-memory [`RangedFetch`] implementation for tests and demos.

use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;

use async_stream::stream;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::{
    error::{NetError, NetResult},
    traits::{ByteStream, RangedFetch},
    types::{FileIdentifier, RemoteFile},
};

/// Behavior of one `fetch` call on a [`MemoryFetcher`].
#[derive(Clone, Copy, Debug)]
pub enum FetchScript {
    /// Serve the requested range to completion.
    Serve,
    /// Emit at most this many bytes, then fail the stream.
    ErrorAfter(usize),
    /// Emit nothing and never finish; the consumer must drop the stream.
    Stall,
}

/// Serves a byte blob through the [`RangedFetch`] contract.
///
/// Records every fetched range and optionally follows a script of per-fetch
/// behaviors, which is how the cache tests inject stream failures.
#[derive(Clone, Debug)]
pub struct MemoryFetcher {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    data: Bytes,
    identifier: FileIdentifier,
    chunk_size: usize,
    fetches: Mutex<Vec<Range<u64>>>,
    scripts: Mutex<VecDeque<FetchScript>>,
}

impl MemoryFetcher {
    #[must_use]
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self::with_chunk_size(data, 64 * 1024)
    }

    /// Like [`MemoryFetcher::new`], emitting stream chunks of at most
    /// `chunk_size` bytes.
    #[must_use]
    pub fn with_chunk_size(data: impl Into<Bytes>, chunk_size: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                data: data.into(),
                identifier: FileIdentifier::ETag("\"memory\"".to_owned()),
                chunk_size: chunk_size.max(1),
                fetches: Mutex::new(Vec::new()),
                scripts: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Queue a behavior for the next un-scripted `fetch` call. Calls beyond
    /// the queue serve normally.
    pub fn push_script(&self, script: FetchScript) {
        self.inner.scripts.lock().push_back(script);
    }

    /// Ranges requested so far, in call order.
    #[must_use]
    pub fn fetched_ranges(&self) -> Vec<Range<u64>> {
        self.inner.fetches.lock().clone()
    }

    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.inner.fetches.lock().len()
    }
}

#[async_trait::async_trait]
impl RangedFetch for MemoryFetcher {
    async fn open(&self) -> NetResult<RemoteFile> {
        Ok(RemoteFile {
            size: self.inner.data.len() as u64,
            identifier: self.inner.identifier.clone(),
        })
    }

    async fn fetch(&self, offset: u64, length: u64) -> NetResult<ByteStream> {
        let size = self.inner.data.len() as u64;
        let end = offset.checked_add(length).filter(|&end| end <= size);
        let Some(end) = end else {
            return Err(NetError::InvalidFetchRange { offset, length });
        };
        if length == 0 {
            return Err(NetError::InvalidFetchRange { offset, length });
        }

        self.inner.fetches.lock().push(offset..end);
        let script = self
            .inner
            .scripts
            .lock()
            .pop_front()
            .unwrap_or(FetchScript::Serve);

        let data = self.inner.data.slice(offset as usize..end as usize);
        let chunk_size = self.inner.chunk_size;
        let stream = stream! {
            let budget = match script {
                FetchScript::Serve => data.len(),
                FetchScript::ErrorAfter(n) => n.min(data.len()),
                FetchScript::Stall => {
                    std::future::pending::<()>().await;
                    unreachable!("pending future resolved");
                }
            };
            let mut sent = 0usize;
            while sent < budget {
                let next = (sent + chunk_size).min(budget);
                yield Ok(data.slice(sent..next));
                sent = next;
            }
            if matches!(script, FetchScript::ErrorAfter(_)) {
                yield Err(NetError::Http("injected stream failure".to_owned()));
            }
        };
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    async fn collect(mut stream: ByteStream) -> (Vec<u8>, Option<NetError>) {
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => out.extend_from_slice(&chunk),
                Err(e) => return (out, Some(e)),
            }
        }
        (out, None)
    }

    #[tokio::test]
    async fn serves_exact_range() {
        let fetcher = MemoryFetcher::with_chunk_size(vec![7u8; 100], 16);
        let stream = fetcher.fetch(10, 50).await.unwrap();
        let (bytes, err) = collect(stream).await;
        assert!(err.is_none());
        assert_eq!(bytes, vec![7u8; 50]);
        assert_eq!(fetcher.fetched_ranges(), vec![10..60]);
    }

    #[tokio::test]
    async fn open_reports_size_and_identifier() {
        let fetcher = MemoryFetcher::new(vec![0u8; 42]);
        let remote = fetcher.open().await.unwrap();
        assert_eq!(remote.size, 42);
        assert!(matches!(remote.identifier, FileIdentifier::ETag(_)));
    }

    #[tokio::test]
    async fn scripted_error_fires_after_bytes() {
        let fetcher = MemoryFetcher::with_chunk_size(vec![1u8; 100], 10);
        fetcher.push_script(FetchScript::ErrorAfter(25));

        let stream = fetcher.fetch(0, 100).await.unwrap();
        let (bytes, err) = collect(stream).await;
        assert_eq!(bytes.len(), 25);
        assert!(matches!(err, Some(NetError::Http(_))));
    }

    #[tokio::test]
    async fn out_of_bounds_fetch_is_rejected() {
        let fetcher = MemoryFetcher::new(vec![0u8; 10]);
        assert!(matches!(
            fetcher.fetch(5, 10).await,
            Err(NetError::InvalidFetchRange { .. })
        ));
    }
}
