use std::collections::HashMap;
use std::ops::Range;

use tapedeck_core::Time;
use tapedeck_source::{Message, TopicInfo};

/// Position of the playback state machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    #[default]
    Preinit,
    Initialize,
    StartPlay,
    Idle,
    SeekBackfill,
    Play,
    ResetIterator,
    Close,
}

/// Coarse health indicator surfaced to the listener.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Presence {
    #[default]
    Initializing,
    Present,
    Buffering,
    Error,
}

/// How eagerly a subscribed topic should be prefetched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PreloadPolicy {
    #[default]
    Full,
    Partial,
}

/// Topic subscriptions. Replacement is atomic: a new mapping fully
/// supersedes the old.
pub type Subscriptions = HashMap<String, PreloadPolicy>;

/// Snapshot emitted to the listener.
///
/// `messages` is moved out at emission time, so a batch is never delivered
/// twice.
#[derive(Clone, Debug, Default)]
pub struct PlayerState {
    pub phase: Phase,
    pub presence: Presence,
    pub current_time: Option<Time>,
    pub start_time: Option<Time>,
    pub end_time: Option<Time>,
    pub is_playing: bool,
    pub speed: f64,
    pub topics: Vec<TopicInfo>,
    pub messages: Vec<Message>,
    /// Fractions of the underlying file that are fully loaded.
    pub progress: Vec<Range<f64>>,
}
