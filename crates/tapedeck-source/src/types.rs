use std::collections::BTreeSet;

use bytes::Bytes;
use tapedeck_core::Time;
use tokio_util::sync::CancellationToken;

/// A topic advertised by a recording.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicInfo {
    pub name: String,
    /// Name of the message schema, opaque to the playback engine.
    pub schema: String,
}

/// One decoded message record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub receive_time: Time,
    pub size_bytes: u64,
    pub payload: Bytes,
    pub schema: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// A decoder problem surfaced inline with the message stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Problem {
    /// Identifies the iterator instance the problem belongs to.
    pub connection_id: u64,
    pub severity: Severity,
    pub message: String,
}

/// One item of a message iteration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IterItem {
    Message(Message),
    Problem(Problem),
    /// Time progress marker for spans without subscribed messages.
    Stamp(Time),
}

/// Result of [`crate::MessageSource::initialize`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Initialization {
    pub start: Time,
    pub end: Time,
    pub topics: Vec<TopicInfo>,
}

/// Parameters of a message iteration.
#[derive(Clone, Debug, Default)]
pub struct IterateArgs {
    /// Topics to surface; everything else yields [`IterItem::Stamp`].
    pub topics: BTreeSet<String>,
    /// First receive time to include. Recording start if unset.
    pub start: Option<Time>,
    /// Last receive time to include. Recording end if unset.
    pub end: Option<Time>,
    pub reverse: bool,
}

/// Parameters of a backfill lookup.
#[derive(Clone, Debug, Default)]
pub struct BackfillArgs {
    pub topics: BTreeSet<String>,
    pub time: Time,
    /// Aborts the lookup between topics.
    pub cancel: CancellationToken,
}
