//! In-memory [`MessageSource`] for tests and demos.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tapedeck_core::Time;

use crate::{
    error::{SourceError, SourceResult},
    source::{MessageSource, MessageStream},
    types::{
        BackfillArgs, Initialization, IterItem, IterateArgs, Message, Problem, Severity, TopicInfo,
    },
};

/// Serves a fixed message list through the [`MessageSource`] contract.
pub struct MemorySource {
    start: Time,
    end: Time,
    topics: Vec<TopicInfo>,
    /// Sorted by receive time.
    messages: Vec<Message>,
    fail_initialize: bool,
    terminated: AtomicBool,
    next_connection_id: AtomicU64,
}

impl MemorySource {
    /// Build a source over `messages`, which are sorted internally.
    #[must_use]
    pub fn new(start: Time, end: Time, topics: Vec<TopicInfo>, mut messages: Vec<Message>) -> Self {
        messages.sort_by_key(|m| m.receive_time);
        Self {
            start,
            end,
            topics,
            messages,
            fail_initialize: false,
            terminated: AtomicBool::new(false),
            next_connection_id: AtomicU64::new(0),
        }
    }

    /// A source whose `initialize` always fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_initialize: true,
            ..Self::new(Time::ZERO, Time::ZERO, Vec::new(), Vec::new())
        }
    }

    fn check_live(&self) -> SourceResult<()> {
        if self.terminated.load(Ordering::Relaxed) {
            return Err(SourceError::Terminated);
        }
        Ok(())
    }
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn initialize(&self) -> SourceResult<Initialization> {
        self.check_live()?;
        if self.fail_initialize {
            return Err(SourceError::Malformed("synthetic initialize failure".into()));
        }
        Ok(Initialization {
            start: self.start,
            end: self.end,
            topics: self.topics.clone(),
        })
    }

    fn iterate(&self, args: IterateArgs) -> MessageStream {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        if self.check_live().is_err() {
            return Box::pin(futures::stream::once(async move {
                IterItem::Problem(Problem {
                    connection_id,
                    severity: Severity::Error,
                    message: SourceError::Terminated.to_string(),
                })
            }));
        }

        let lo = self
            .messages
            .partition_point(|m| args.start.is_some_and(|start| m.receive_time < start));
        let hi = self
            .messages
            .partition_point(|m| args.end.is_none_or(|end| m.receive_time <= end));

        let mut items: Vec<IterItem> = self.messages[lo..hi]
            .iter()
            .map(|m| {
                if args.topics.contains(&m.topic) {
                    IterItem::Message(m.clone())
                } else {
                    IterItem::Stamp(m.receive_time)
                }
            })
            .collect();
        if args.reverse {
            items.reverse();
        }
        Box::pin(futures::stream::iter(items))
    }

    async fn backfill(&self, args: BackfillArgs) -> SourceResult<Vec<Message>> {
        self.check_live()?;

        let mut out = Vec::new();
        for topic in &args.topics {
            if args.cancel.is_cancelled() {
                return Err(SourceError::Aborted);
            }
            let found = self
                .messages
                .iter()
                .rev()
                .find(|m| &m.topic == topic && m.receive_time <= args.time);
            if let Some(message) = found {
                out.push(message.clone());
            }
        }

        out.sort_by_key(|m| m.receive_time);
        Ok(out)
    }

    fn progress(&self) -> Vec<Range<f64>> {
        vec![0.0..1.0]
    }

    async fn terminate(&self) {
        self.terminated.store(true, Ordering::Relaxed);
    }
}
