use std::ops::Range;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::{
    error::SourceResult,
    types::{BackfillArgs, Initialization, IterItem, IterateArgs, Message},
};

pub type MessageStream = Pin<Box<dyn Stream<Item = IterItem> + Send>>;

/// Asynchronous, time-indexed message access over a recording.
///
/// # Contract (normative)
/// - `initialize` must be called (and succeed) before `iterate` or
///   `backfill`; it is idempotent.
/// - `iterate` is lazy: records are decoded as the stream is polled, and a
///   stream is restarted only by creating a new one. Dropping the stream
///   releases its cache references.
/// - Iteration order is non-decreasing receive time forward, non-increasing
///   in reverse. Ties are stable but otherwise unspecified.
/// - `backfill` returns at most one message per requested topic: the latest
///   with `receive_time <= time`, sorted ascending by receive time.
/// - `terminate` releases the underlying file; everything afterwards fails.
#[async_trait]
pub trait MessageSource: Send + Sync + 'static {
    /// Open the recording and report its time bounds and topics.
    async fn initialize(&self) -> SourceResult<Initialization>;

    /// Stream messages for the subscribed topics over a time range.
    fn iterate(&self, args: IterateArgs) -> MessageStream;

    /// Latest message at or before `time`, per topic.
    async fn backfill(&self, args: BackfillArgs) -> SourceResult<Vec<Message>>;

    /// Fractions of the underlying file that are loaded, in `[0, 1]`.
    fn progress(&self) -> Vec<Range<f64>>;

    /// Release the underlying file.
    async fn terminate(&self);
}
