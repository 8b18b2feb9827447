use tapedeck_cache::CacheOptions;
use tapedeck_net::NetOptions;
use tapedeck_play::PlayOptions;

/// Aggregate configuration for [`crate::open_remote`].
#[derive(Clone, Debug, Default)]
pub struct TapedeckConfig {
    pub net: NetOptions,
    pub cache: CacheOptions,
    pub play: PlayOptions,
}
