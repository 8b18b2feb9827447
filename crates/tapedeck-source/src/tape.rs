use std::{
    collections::HashMap,
    ops::Range,
    sync::Arc,
    sync::atomic::{AtomicU64, Ordering},
};

use async_stream::stream;
use async_trait::async_trait;
use parking_lot::Mutex;
use tapedeck_cache::CachedFile;
use tapedeck_core::Time;
use tracing::{debug, warn};

use crate::{
    error::{SourceError, SourceResult},
    format::{self, RecordMeta, TapeIndex},
    source::{MessageSource, MessageStream},
    types::{
        BackfillArgs, Initialization, IterItem, IterateArgs, Message, Problem, Severity, TopicInfo,
    },
};

/// [`MessageSource`] over a tape recording behind a [`CachedFile`].
///
/// The index is read once at `initialize`; payloads are read lazily as
/// iteration or backfill touches them, so network traffic tracks what the
/// player actually consumes.
pub struct TapeSource {
    cache: CachedFile,
    loaded: Mutex<Option<Arc<Loaded>>>,
    next_connection_id: AtomicU64,
}

struct Loaded {
    topics: Vec<TopicInfo>,
    records: Vec<RecordMeta>,
    /// Record indices per topic id, in time order.
    by_topic: HashMap<u32, Vec<usize>>,
    topic_ids: HashMap<String, u32>,
    start: Time,
    end: Time,
}

impl TapeSource {
    #[must_use]
    pub fn new(cache: CachedFile) -> Self {
        Self {
            cache,
            loaded: Mutex::new(None),
            next_connection_id: AtomicU64::new(0),
        }
    }

    fn loaded(&self) -> SourceResult<Arc<Loaded>> {
        self.loaded
            .lock()
            .clone()
            .ok_or(SourceError::NotInitialized)
    }
}

async fn read_message(
    cache: &CachedFile,
    loaded: &Loaded,
    record: &RecordMeta,
) -> SourceResult<Message> {
    let payload = cache.read(record.offset, u64::from(record.len)).await?;
    let topic = &loaded.topics[record.topic_id as usize];
    Ok(Message {
        topic: topic.name.clone(),
        receive_time: record.time,
        size_bytes: u64::from(record.len),
        payload,
        schema: topic.schema.clone(),
    })
}

#[async_trait]
impl MessageSource for TapeSource {
    async fn initialize(&self) -> SourceResult<Initialization> {
        if let Some(loaded) = self.loaded.lock().clone() {
            return Ok(loaded.initialization());
        }

        self.cache.open().await?;
        let size = self.cache.size()?;

        let header = self.cache.read(0, format::HEADER_LEN.min(size)).await?;
        let index_offset = format::parse_header(&header, size)?;
        let index_bytes = self.cache.read(index_offset, size - index_offset).await?;
        let index = format::parse_index(&index_bytes, index_offset)?;
        debug!(
            topics = index.topics.len(),
            records = index.records.len(),
            "loaded tape index"
        );

        let loaded = Arc::new(Loaded::from_index(index));
        let init = loaded.initialization();
        *self.loaded.lock() = Some(loaded);
        Ok(init)
    }

    fn iterate(&self, args: IterateArgs) -> MessageStream {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let loaded = match self.loaded() {
            Ok(loaded) => loaded,
            Err(e) => {
                return Box::pin(futures::stream::once(async move {
                    IterItem::Problem(Problem {
                        connection_id,
                        severity: Severity::Error,
                        message: e.to_string(),
                    })
                }));
            }
        };
        let cache = self.cache.clone();

        let stream = stream! {
            let lo = loaded
                .records
                .partition_point(|r| args.start.is_some_and(|start| r.time < start));
            let hi = loaded
                .records
                .partition_point(|r| args.end.is_none_or(|end| r.time <= end));
            let indices: Vec<usize> = if args.reverse {
                (lo..hi).rev().collect()
            } else {
                (lo..hi).collect()
            };

            for idx in indices {
                let record = loaded.records[idx];
                let topic_name = &loaded.topics[record.topic_id as usize].name;
                if !args.topics.contains(topic_name) {
                    yield IterItem::Stamp(record.time);
                    continue;
                }
                match read_message(&cache, &loaded, &record).await {
                    Ok(message) => yield IterItem::Message(message),
                    Err(e) => {
                        warn!(err = %e, offset = record.offset, "record read failed");
                        yield IterItem::Problem(Problem {
                            connection_id,
                            severity: Severity::Error,
                            message: e.to_string(),
                        });
                        // Cache failures are not survivable within one pass.
                        break;
                    }
                }
            }
        };
        Box::pin(stream)
    }

    async fn backfill(&self, args: BackfillArgs) -> SourceResult<Vec<Message>> {
        let loaded = self.loaded()?;

        let mut out = Vec::new();
        for topic in &args.topics {
            if args.cancel.is_cancelled() {
                return Err(SourceError::Aborted);
            }
            let Some(topic_id) = loaded.topic_ids.get(topic) else {
                continue;
            };
            let Some(indices) = loaded.by_topic.get(topic_id) else {
                continue;
            };
            // Latest record at or before the target time.
            let at = indices.partition_point(|&idx| loaded.records[idx].time <= args.time);
            if at == 0 {
                continue;
            }
            let record = loaded.records[indices[at - 1]];
            out.push(read_message(&self.cache, &loaded, &record).await?);
        }

        out.sort_by_key(|m| m.receive_time);
        Ok(out)
    }

    #[expect(clippy::cast_precision_loss)]
    fn progress(&self) -> Vec<Range<f64>> {
        let Ok(size) = self.cache.size() else {
            return Vec::new();
        };
        if size == 0 {
            return Vec::new();
        }
        self.cache
            .loaded_ranges()
            .iter()
            .map(|r| (r.start as f64 / size as f64)..(r.end as f64 / size as f64))
            .collect()
    }

    async fn terminate(&self) {
        self.cache.close();
    }
}

impl Loaded {
    fn from_index(index: TapeIndex) -> Self {
        let TapeIndex { topics, records } = index;

        let mut by_topic: HashMap<u32, Vec<usize>> = HashMap::new();
        for (idx, record) in records.iter().enumerate() {
            by_topic.entry(record.topic_id).or_default().push(idx);
        }
        let topic_ids = topics
            .iter()
            .enumerate()
            .map(|(id, t)| (t.name.clone(), id as u32))
            .collect();

        let start = records.first().map(|r| r.time).unwrap_or_default();
        let end = records.last().map(|r| r.time).unwrap_or(start);

        Self {
            topics,
            records,
            by_topic,
            topic_ids,
            start,
            end,
        }
    }

    fn initialization(&self) -> Initialization {
        Initialization {
            start: self.start,
            end: self.end,
            topics: self.topics.clone(),
        }
    }
}
