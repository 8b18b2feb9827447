use std::time::Duration;

/// Timing and clamping knobs for [`crate::Player`].
#[derive(Clone, Debug)]
pub struct PlayOptions {
    /// A seek backfill slower than this surfaces as `Buffering`.
    pub seek_buffering_delay: Duration,

    /// A play tick slower than this surfaces as `Buffering`.
    pub tick_buffering_delay: Duration,

    /// Wallclock pacing of the play loop; also the source-time a tick
    /// advances at speed 1.0.
    pub frame_pace: Duration,

    /// How far past the recording start the first frame reaches when
    /// collecting its initial messages.
    pub start_skip: Duration,

    /// Pause between a finished initialization and the first playback work.
    pub start_play_delay: Duration,

    pub min_speed: f64,
    pub max_speed: f64,
}

impl Default for PlayOptions {
    fn default() -> Self {
        Self {
            seek_buffering_delay: Duration::from_millis(100),
            tick_buffering_delay: Duration::from_millis(500),
            frame_pace: Duration::from_millis(16),
            start_skip: Duration::from_millis(99),
            start_play_delay: Duration::from_millis(100),
            min_speed: 0.1,
            max_speed: 10.0,
        }
    }
}

impl PlayOptions {
    #[must_use]
    pub fn clamp_speed(&self, speed: f64) -> f64 {
        speed.clamp(self.min_speed, self.max_speed)
    }
}
