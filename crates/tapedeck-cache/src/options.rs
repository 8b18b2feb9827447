use std::time::Duration;

const MIB: u64 = 1024 * 1024;

/// Tuning knobs for [`crate::CachedFile`].
#[derive(Clone, Debug)]
pub struct CacheOptions {
    /// Upper bound on buffered bytes. Also the largest single read.
    pub cache_budget: u64,

    /// Slab granularity of the backing buffer.
    pub block_size: u64,

    /// An in-flight connection positioned at most this far before a
    /// requested range is kept instead of replaced.
    pub close_enough: u64,

    /// Two stream errors within this window count as a hard failure when no
    /// reconnect callback is installed.
    pub hard_failure_window: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            cache_budget: 200 * MIB,
            block_size: 100 * MIB,
            close_enough: 5 * MIB,
            hard_failure_window: Duration::from_millis(100),
        }
    }
}

impl CacheOptions {
    /// Resident block budget when the buffer runs in block mode.
    ///
    /// The two extra blocks keep a read that straddles the last cached block
    /// from evicting a block the same read still needs.
    #[must_use]
    pub fn max_blocks(&self) -> usize {
        usize::try_from(self.cache_budget.div_ceil(self.block_size)).unwrap_or(usize::MAX) + 2
    }
}
