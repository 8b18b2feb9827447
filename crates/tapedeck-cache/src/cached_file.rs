use std::{
    collections::VecDeque,
    fmt,
    ops::Range,
    sync::Arc,
    time::Instant,
};

use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use tapedeck_net::{FileIdentifier, NetError, RangedFetch};
use tapedeck_storage::{BlockBuffer, ByteRanges};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    CacheError, CacheOptions, CacheResult, ConnectionDecision, PolicyInputs, decide_connection,
};

/// Called with `true` when the cache starts silently reconnecting after a
/// stream error, and `false` once data flows again.
pub type ReconnectCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Random-access byte view over a remote recording.
///
/// Clone is cheap; all clones refer to the same underlying cache.
///
/// # Contract (normative)
/// - `read` suspends until its range is fully buffered or the cache closes.
/// - At most one download stream is in flight; the connection-decision
///   policy governs when it is kept versus replaced.
/// - Without a reconnect callback, two stream errors within the hard-failure
///   window latch the cache closed and reject all pending reads. With one,
///   stream errors are recovered silently and the callback observes the
///   reconnecting state.
#[derive(Clone)]
pub struct CachedFile {
    inner: Arc<Inner>,
}

struct Inner {
    fetcher: Arc<dyn RangedFetch>,
    options: CacheOptions,
    reconnect: Option<ReconnectCallback>,
    state: Mutex<State>,
}

struct State {
    opened: Option<Opened>,
    pending: VecDeque<PendingRead>,
    connection: Option<Connection>,
    last_resolved_end: Option<u64>,
    last_error_at: Option<Instant>,
    reconnecting: bool,
    closed: bool,
    next_generation: u64,
}

struct Opened {
    file_size: u64,
    identifier: FileIdentifier,
    buffer: BlockBuffer,
}

struct PendingRead {
    range: Range<u64>,
    tx: oneshot::Sender<CacheResult<Bytes>>,
}

struct Connection {
    remaining: Range<u64>,
    cancel: CancellationToken,
    generation: u64,
}

impl fmt::Debug for CachedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("CachedFile")
            .field("open", &state.opened.is_some())
            .field("closed", &state.closed)
            .field("pending", &state.pending.len())
            .finish_non_exhaustive()
    }
}

impl CachedFile {
    #[must_use]
    pub fn new(fetcher: Arc<dyn RangedFetch>, options: CacheOptions) -> Self {
        Self::build(fetcher, options, None)
    }

    /// Like [`CachedFile::new`], recovering stream errors silently and
    /// reporting the reconnecting state through `callback`.
    #[must_use]
    pub fn with_reconnect_callback(
        fetcher: Arc<dyn RangedFetch>,
        options: CacheOptions,
        callback: ReconnectCallback,
    ) -> Self {
        Self::build(fetcher, options, Some(callback))
    }

    fn build(
        fetcher: Arc<dyn RangedFetch>,
        options: CacheOptions,
        reconnect: Option<ReconnectCallback>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                options,
                reconnect,
                state: Mutex::new(State {
                    opened: None,
                    pending: VecDeque::new(),
                    connection: None,
                    last_resolved_end: None,
                    last_error_at: None,
                    reconnecting: false,
                    closed: false,
                    next_generation: 0,
                }),
            }),
        }
    }

    /// Probe the remote and size the buffer. Idempotent.
    pub async fn open(&self) -> CacheResult<()> {
        {
            let state = self.inner.state.lock();
            if state.closed {
                return Err(CacheError::Closed);
            }
            if state.opened.is_some() {
                return Ok(());
            }
        }

        let remote = self.inner.fetcher.open().await?;

        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(CacheError::Closed);
        }
        if state.opened.is_some() {
            return Ok(());
        }

        let options = &self.inner.options;
        let buffer = if remote.size <= options.cache_budget {
            BlockBuffer::contiguous(remote.size)
        } else {
            BlockBuffer::with_blocks(remote.size, options.block_size, options.max_blocks())
        };
        debug!(
            size = remote.size,
            budget = options.cache_budget,
            identifier = ?remote.identifier,
            "opened cached file"
        );
        state.opened = Some(Opened {
            file_size: remote.size,
            identifier: remote.identifier,
            buffer,
        });
        Ok(())
    }

    /// Size of the remote file. Fails if the cache is not open.
    pub fn size(&self) -> CacheResult<u64> {
        let state = self.inner.state.lock();
        if state.closed {
            return Err(CacheError::Closed);
        }
        state
            .opened
            .as_ref()
            .map(|o| o.file_size)
            .ok_or(CacheError::NotOpen)
    }

    /// Strongest change identifier the remote advertised at open time.
    pub fn remote_identifier(&self) -> CacheResult<FileIdentifier> {
        let state = self.inner.state.lock();
        state
            .opened
            .as_ref()
            .map(|o| o.identifier.clone())
            .ok_or(CacheError::NotOpen)
    }

    /// Byte ranges currently buffered.
    #[must_use]
    pub fn loaded_ranges(&self) -> ByteRanges {
        let state = self.inner.state.lock();
        state
            .opened
            .as_ref()
            .map(|o| o.buffer.filled().clone())
            .unwrap_or_default()
    }

    /// Read `[offset, offset + length)`, suspending until the bytes are
    /// buffered.
    pub async fn read(&self, offset: u64, length: u64) -> CacheResult<Bytes> {
        let rx = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(CacheError::Closed);
            }
            let opened = state.opened.as_ref().ok_or(CacheError::NotOpen)?;
            let file_size = opened.file_size;

            if length > self.inner.options.cache_budget {
                return Err(CacheError::BudgetExceeded {
                    length,
                    budget: self.inner.options.cache_budget,
                });
            }
            let end = offset.checked_add(length).filter(|&end| end <= file_size);
            let Some(end) = end else {
                return Err(CacheError::ReadPastEnd {
                    offset,
                    length,
                    size: file_size,
                });
            };
            if length == 0 {
                return Ok(Bytes::new());
            }

            let (tx, rx) = oneshot::channel();
            state.pending.push_back(PendingRead {
                range: offset..end,
                tx,
            });
            Inner::update_state(&self.inner, &mut state);
            rx
        };

        rx.await.map_err(|_| CacheError::Closed)?
    }

    /// Close the cache: reject pending and future reads, stop the stream,
    /// drop the buffer.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        if state.closed {
            return;
        }
        debug!(pending = state.pending.len(), "closing cached file");
        state.closed = true;
        if let Some(connection) = state.connection.take() {
            connection.cancel.cancel();
        }
        for read in state.pending.drain(..) {
            let _ = read.tx.send(Err(CacheError::Closed));
        }
        state.opened = None;
    }
}

impl Inner {
    /// Re-evaluate the cache after pending reads, buffer contents, or the
    /// connection changed: resolve cache hits in queue order, then apply the
    /// connection-decision policy.
    fn update_state(this: &Arc<Self>, state: &mut State) {
        if state.closed {
            return;
        }
        // Taken out so the buffer can be borrowed alongside the queue; put
        // back before any early return below.
        let Some(mut opened) = state.opened.take() else {
            return;
        };

        // Readers that gave up (dropped futures) must not keep steering the
        // connection policy.
        state.pending.retain(|read| !read.tx.is_closed());

        // Cache-hit pass: greedy in-order drain of every covered read.
        let mut index = 0;
        while index < state.pending.len() {
            let range = state.pending[index].range.clone();
            if !opened.buffer.filled().contains(range.clone()) {
                index += 1;
                continue;
            }
            let read = state
                .pending
                .remove(index)
                .unwrap_or_else(|| unreachable!("index bounded by len"));
            match opened.buffer.slice(range.start, range.end) {
                Ok(bytes) => {
                    state.last_resolved_end = Some(range.end);
                    trace!(start = range.start, end = range.end, "read resolved from cache");
                    let _ = read.tx.send(Ok(bytes));
                }
                Err(e) => {
                    warn!(err = %e, "buffered range vanished before slice");
                    let _ = read.tx.send(Err(e.into()));
                }
            }
        }

        let decision = decide_connection(&PolicyInputs {
            connection_remaining: state.connection.as_ref().map(|c| c.remaining.clone()),
            request: state.pending.front().map(|r| r.range.clone()),
            have: opened.buffer.filled(),
            last_resolved_end: state.last_resolved_end,
            cache_budget: this.options.cache_budget,
            file_size: opened.file_size,
            close_enough: this.options.close_enough,
        });
        state.opened = Some(opened);

        if let ConnectionDecision::Open(range) = decision {
            if let Some(old) = state.connection.take() {
                old.cancel.cancel();
            }
            let cancel = CancellationToken::new();
            let generation = state.next_generation;
            state.next_generation += 1;
            state.connection = Some(Connection {
                remaining: range.clone(),
                cancel: cancel.clone(),
                generation,
            });
            debug!(start = range.start, end = range.end, generation, "starting download stream");
            tokio::spawn(Self::pump(Arc::clone(this), range, generation, cancel));
        }
    }

    /// Drive one download stream, feeding chunks into the buffer until the
    /// stream ends, errors, or a newer connection supersedes this one.
    async fn pump(
        inner: Arc<Self>,
        range: Range<u64>,
        generation: u64,
        cancel: CancellationToken,
    ) {
        let fetch = inner.fetcher.fetch(range.start, range.end - range.start);
        let mut stream = tokio::select! {
            () = cancel.cancelled() => return,
            result = fetch => match result {
                Ok(stream) => stream,
                Err(e) => {
                    Self::on_stream_error(&inner, generation, e);
                    return;
                }
            },
        };

        loop {
            let item = tokio::select! {
                () = cancel.cancelled() => return,
                item = stream.next() => item,
            };
            match item {
                Some(Ok(chunk)) => {
                    if !Self::on_data(&inner, generation, &chunk) {
                        return;
                    }
                }
                Some(Err(e)) => {
                    Self::on_stream_error(&inner, generation, e);
                    return;
                }
                None => {
                    Self::on_stream_end(&inner, generation);
                    return;
                }
            }
        }
    }

    /// Returns `false` once this connection is no longer current and the
    /// pump should stop.
    fn on_data(this: &Arc<Self>, generation: u64, chunk: &[u8]) -> bool {
        let mut state = this.state.lock();
        if !state.is_current(generation) {
            return false;
        }
        let Some(offset) = state.connection.as_ref().map(|c| c.remaining.start) else {
            return false;
        };

        let write_result = match state.opened.as_mut() {
            Some(opened) => opened.buffer.write(chunk, offset),
            None => return false,
        };
        if let Err(e) = write_result {
            // The remote delivered bytes outside the requested range.
            drop(state);
            Self::on_stream_error(this, generation, NetError::Http(e.to_string()));
            return false;
        }
        if let Some(connection) = state.connection.as_mut() {
            connection.remaining.start += chunk.len() as u64;
        }
        state.last_error_at = None;
        let recovered = std::mem::take(&mut state.reconnecting);

        // Once the oldest read is covered the stream has done its job; the
        // follow-up update decides whether another range is worth a fresh
        // connection.
        let head = state.pending.front().map(|r| r.range.clone());
        let head_covered = match (head, state.opened.as_ref()) {
            (Some(range), Some(opened)) => opened.buffer.filled().contains(range),
            _ => false,
        };
        if head_covered {
            if let Some(connection) = state.connection.take() {
                connection.cancel.cancel();
            }
        }

        Self::update_state(this, &mut state);
        let still_current = !head_covered && state.is_current(generation);
        drop(state);

        // Callback runs outside the lock; it may call back into the cache.
        if recovered && let Some(callback) = &this.reconnect {
            callback(false);
        }
        still_current
    }

    fn on_stream_end(this: &Arc<Self>, generation: u64) {
        let mut state = this.state.lock();
        if !state.is_current(generation) {
            return;
        }
        trace!(generation, "download stream ended");
        state.connection = None;
        Self::update_state(this, &mut state);
    }

    fn on_stream_error(this: &Arc<Self>, generation: u64, error: NetError) {
        let mut state = this.state.lock();
        if !state.is_current(generation) {
            return;
        }
        state.connection = None;

        if let Some(callback) = &this.reconnect {
            warn!(err = %error, "stream error, reconnecting");
            let first_error = !state.reconnecting;
            state.reconnecting = true;
            Self::update_state(this, &mut state);
            drop(state);
            if first_error {
                callback(true);
            }
            return;
        }

        let now = Instant::now();
        let rapid_repeat = state
            .last_error_at
            .is_some_and(|prev| now.duration_since(prev) < this.options.hard_failure_window);
        if rapid_repeat {
            warn!(err = %error, "repeated stream error, closing cache");
            state.closed = true;
            for read in state.pending.drain(..) {
                let _ = read.tx.send(Err(CacheError::Fatal(error.clone())));
            }
            state.opened = None;
            return;
        }

        warn!(err = %error, "stream error, retrying");
        state.last_error_at = Some(now);
        Self::update_state(this, &mut state);
    }
}

impl State {
    fn is_current(&self, generation: u64) -> bool {
        !self.closed
            && self
                .connection
                .as_ref()
                .is_some_and(|c| c.generation == generation)
    }
}
