#![forbid(unsafe_code)]

//! `tapedeck-source`
//!
//! Turns the byte-oriented cached file into an asynchronous iterator of
//! typed, time-ordered message events.
//!
//! [`MessageSource`] is the contract the playback engine consumes.
//! [`TapeSource`] implements it over a [`tapedeck_cache::CachedFile`] holding
//! a tape-format recording; [`MemorySource`] implements it over an in-memory
//! message list for tests and demos.

pub mod format;

mod error;
mod memory_source;
mod source;
mod tape;
mod types;

pub use error::{SourceError, SourceResult};
pub use memory_source::MemorySource;
pub use source::{MessageSource, MessageStream};
pub use tape::TapeSource;
pub use types::{
    BackfillArgs, Initialization, IterItem, IterateArgs, Message, Problem, Severity, TopicInfo,
};
