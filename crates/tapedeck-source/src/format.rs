//! The tape container format.
//!
//! A tape is a single file: an eight-byte magic, a pointer to the index,
//! raw payload bytes, and a trailing index that names every topic and every
//! record. The index is small enough to hold in memory, which is what makes
//! time-addressed iteration and per-topic backfill cheap: only payloads are
//! read lazily.
//!
//! ```text
//! [0..8)    magic "TAPEDECK"
//! [8..16)   u64 LE: index offset
//! [16..idx) payload bytes
//! [idx..)   u32 LE topic count
//!           per topic:  u16 LE name len, name, u16 LE schema len, schema
//!           u64 LE record count
//!           per record: u32 LE topic id, i64 LE sec, u32 LE nsec,
//!                       u64 LE payload offset, u32 LE payload len
//! ```
//!
//! Records are sorted by receive time (stable on ties); the parser rejects
//! an unsorted index.

use bytes::{BufMut, Bytes, BytesMut};
use tapedeck_core::Time;

use crate::{
    error::{SourceError, SourceResult},
    types::TopicInfo,
};

pub const MAGIC: [u8; 8] = *b"TAPEDECK";
pub const HEADER_LEN: u64 = 16;

/// Index entry for one message record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordMeta {
    pub topic_id: u32,
    pub time: Time,
    /// Absolute payload offset in the file.
    pub offset: u64,
    pub len: u32,
}

/// Fully parsed tape index.
#[derive(Clone, Debug, Default)]
pub struct TapeIndex {
    pub topics: Vec<TopicInfo>,
    /// Sorted by `time`, stable on ties.
    pub records: Vec<RecordMeta>,
}

/// Parse the fixed-size file header, returning the index offset.
pub fn parse_header(bytes: &[u8], file_size: u64) -> SourceResult<u64> {
    if bytes.len() < HEADER_LEN as usize {
        return Err(SourceError::Malformed("file shorter than header".into()));
    }
    if bytes[..8] != MAGIC {
        return Err(SourceError::BadMagic);
    }
    let index_offset = u64::from_le_bytes(
        bytes[8..16]
            .try_into()
            .unwrap_or_else(|_| unreachable!("slice is eight bytes")),
    );
    if index_offset < HEADER_LEN || index_offset > file_size {
        return Err(SourceError::Malformed(format!(
            "index offset {index_offset} outside file of {file_size} bytes"
        )));
    }
    Ok(index_offset)
}

/// Parse the trailing index. `index_offset` and `file_size` bound payload
/// offsets; every record must point into `[HEADER_LEN, index_offset)`.
pub fn parse_index(bytes: &[u8], index_offset: u64) -> SourceResult<TapeIndex> {
    let mut cursor = Cursor::new(bytes);

    let topic_count = cursor.read_u32()?;
    let mut topics = Vec::with_capacity(topic_count.min(4096) as usize);
    for _ in 0..topic_count {
        let name = cursor.read_string()?;
        let schema = cursor.read_string()?;
        topics.push(TopicInfo { name, schema });
    }

    let record_count = cursor.read_u64()?;
    let mut records = Vec::with_capacity(record_count.min(1 << 20) as usize);
    let mut previous = Time::MIN;
    for _ in 0..record_count {
        let topic_id = cursor.read_u32()?;
        let sec = cursor.read_i64()?;
        let nsec = cursor.read_u32()?;
        let offset = cursor.read_u64()?;
        let len = cursor.read_u32()?;

        if topic_id as usize >= topics.len() {
            return Err(SourceError::Malformed(format!(
                "record references topic {topic_id} of {}",
                topics.len()
            )));
        }
        let end = offset
            .checked_add(u64::from(len))
            .filter(|&end| offset >= HEADER_LEN && end <= index_offset);
        if end.is_none() {
            return Err(SourceError::Malformed(format!(
                "record payload {offset}+{len} outside data section"
            )));
        }
        let time = Time::new(sec, nsec);
        if time < previous {
            return Err(SourceError::Malformed("index is not time-sorted".into()));
        }
        previous = time;

        records.push(RecordMeta {
            topic_id,
            time,
            offset,
            len,
        });
    }

    Ok(TapeIndex { topics, records })
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> SourceResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| SourceError::Malformed("truncated index".into()))?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn read_u16(&mut self) -> SourceResult<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap_or_else(
            |_| unreachable!("take returned two bytes"),
        )))
    }

    fn read_u32(&mut self) -> SourceResult<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap_or_else(
            |_| unreachable!("take returned four bytes"),
        )))
    }

    fn read_u64(&mut self) -> SourceResult<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap_or_else(
            |_| unreachable!("take returned eight bytes"),
        )))
    }

    fn read_i64(&mut self) -> SourceResult<i64> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap_or_else(
            |_| unreachable!("take returned eight bytes"),
        )))
    }

    fn read_string(&mut self) -> SourceResult<String> {
        let len = self.read_u16()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| SourceError::Malformed("non-UTF-8 string in index".into()))
    }
}

/// Assembles a tape in memory. Used by tests, demos, and recording export.
#[derive(Debug, Default)]
pub struct TapeBuilder {
    topics: Vec<TopicInfo>,
    messages: Vec<(u32, Time, Bytes)>,
}

impl TapeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a topic, returning its id for [`TapeBuilder::message`].
    pub fn topic(&mut self, name: impl Into<String>, schema: impl Into<String>) -> u32 {
        self.topics.push(TopicInfo {
            name: name.into(),
            schema: schema.into(),
        });
        (self.topics.len() - 1) as u32
    }

    /// Append a message. Messages may be added in any order; `build` sorts
    /// them by time, stably.
    pub fn message(&mut self, topic_id: u32, time: Time, payload: impl Into<Bytes>) {
        debug_assert!((topic_id as usize) < self.topics.len(), "unknown topic id");
        self.messages.push((topic_id, time, payload.into()));
    }

    /// Serialize the tape.
    #[must_use]
    pub fn build(mut self) -> Bytes {
        self.messages.sort_by_key(|(_, time, _)| *time);

        let data_len: usize = self.messages.iter().map(|(_, _, p)| p.len()).sum();
        let index_offset = HEADER_LEN + data_len as u64;

        let mut out = BytesMut::with_capacity(HEADER_LEN as usize + data_len + 1024);
        out.put_slice(&MAGIC);
        out.put_u64_le(index_offset);

        let mut offsets = Vec::with_capacity(self.messages.len());
        for (_, _, payload) in &self.messages {
            offsets.push(out.len() as u64);
            out.put_slice(payload);
        }

        out.put_u32_le(self.topics.len() as u32);
        for topic in &self.topics {
            out.put_u16_le(topic.name.len() as u16);
            out.put_slice(topic.name.as_bytes());
            out.put_u16_le(topic.schema.len() as u16);
            out.put_slice(topic.schema.as_bytes());
        }

        out.put_u64_le(self.messages.len() as u64);
        for ((topic_id, time, payload), offset) in self.messages.iter().zip(offsets) {
            out.put_u32_le(*topic_id);
            out.put_i64_le(time.sec());
            out.put_u32_le(time.nsec());
            out.put_u64_le(offset);
            out.put_u32_le(payload.len() as u32);
        }

        out.freeze()
    }
}
