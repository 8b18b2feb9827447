#![forbid(unsafe_code)]

//! `tapedeck`
//!
//! Streaming playback of large remote recordings.
//!
//! A recording is a binary log of indexed, timestamped, per-topic message
//! records. Tapedeck streams it over ranged HTTP through a block-addressed
//! LRU cache, decodes records lazily, and drives a time-addressed playback
//! engine that emits message batches to a listener.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tapedeck::{TapedeckConfig, open_remote};
//!
//! # async fn run(listener: Arc<dyn tapedeck::PlayerListener>) {
//! let url = url::Url::parse("https://recordings.example.com/drive-042.tape").unwrap();
//! let player = open_remote(url, TapedeckConfig::default());
//! player.set_listener(listener).unwrap();
//! player.start_playback();
//! # }
//! ```

mod config;

use std::sync::Arc;

use tapedeck_cache::{CachedFile, ReconnectCallback};
use tapedeck_net::{HttpFetcher, RangedFetch};
use tapedeck_play::Player;
use tapedeck_source::{MessageSource, TapeSource};
use url::Url;

pub use config::TapedeckConfig;
pub use tapedeck_cache::{CacheError, CacheOptions};
pub use tapedeck_core::Time;
pub use tapedeck_net::{FileIdentifier, MemoryFetcher, NetError, NetOptions};
pub use tapedeck_play::{
    Phase, PlayError, PlayOptions, PlayerListener, PlayerState, PreloadPolicy, Presence,
    Subscriptions,
};
pub use tapedeck_source::{
    IterItem, MemorySource, Message, SourceError, TopicInfo, format::TapeBuilder,
};
pub use tapedeck_storage::ByteRanges;

/// Open a remote tape recording for playback.
///
/// The returned player is inert until [`Player::set_listener`] installs the
/// state callback.
#[must_use]
pub fn open_remote(url: Url, config: TapedeckConfig) -> Player {
    let fetcher: Arc<dyn RangedFetch> = Arc::new(HttpFetcher::new(url, config.net));
    let cache = CachedFile::new(fetcher, config.cache);
    open_source(Arc::new(TapeSource::new(cache)), config.play)
}

/// Like [`open_remote`], recovering stream errors silently and reporting the
/// reconnecting state through `callback`.
#[must_use]
pub fn open_remote_with_reconnect(
    url: Url,
    config: TapedeckConfig,
    callback: ReconnectCallback,
) -> Player {
    let fetcher: Arc<dyn RangedFetch> = Arc::new(HttpFetcher::new(url, config.net));
    let cache = CachedFile::with_reconnect_callback(fetcher, config.cache, callback);
    open_source(Arc::new(TapeSource::new(cache)), config.play)
}

/// Drive playback over an already-constructed message source.
#[must_use]
pub fn open_source(
    source: Arc<dyn MessageSource>,
    options: tapedeck_play::PlayOptions,
) -> Player {
    Player::new(source, options)
}
