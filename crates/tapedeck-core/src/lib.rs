#![forbid(unsafe_code)]

//! `tapedeck-core`
//!
//! Core value types shared across the tapedeck playback stack.
//!
//! [`Time`] is a recording timestamp: a `(sec, nsec)` pair with normalizing
//! arithmetic, used for message receive times and playback positions.

mod time;

pub use time::{NANOS_PER_SEC, Time};
