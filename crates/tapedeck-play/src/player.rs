use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use parking_lot::Mutex;
use tapedeck_core::Time;
use tapedeck_source::{
    BackfillArgs, IterItem, IterateArgs, Message, MessageSource, MessageStream, SourceError,
    TopicInfo,
};
use tokio::sync::Notify;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::{
    config::PlayOptions,
    error::{PlayError, PlayResult},
    listener::PlayerListener,
    state::{Phase, PlayerState, Presence, Subscriptions},
};

/// Playback engine over a [`MessageSource`].
///
/// All inputs are non-blocking: they mutate shared intent, queue the next
/// phase, cancel whatever the driver is waiting on, and wake it. A single
/// driver task owns all playback state and is the only emitter, so listener
/// notifications are totally ordered.
pub struct Player {
    shared: Arc<Shared>,
}

struct Shared {
    options: PlayOptions,
    intent: Mutex<Intent>,
    wake: Notify,
}

/// Input-side state. The driver keeps the `phase`, `bounds`, and
/// `current_time` mirrors fresh so input handlers can act on them without
/// reaching into the driver.
struct Intent {
    pending: Option<Phase>,
    cancel: CancellationToken,
    listener: Option<Arc<dyn PlayerListener>>,
    subscriptions: Subscriptions,
    subscription_epoch: u64,
    is_playing: bool,
    speed: f64,
    seek_target: Option<Time>,
    until_time: Option<Time>,
    emit_requested: bool,
    closed: bool,
    phase: Phase,
    bounds: Option<(Time, Time)>,
    current_time: Option<Time>,
}

impl Player {
    /// Build a player over `source` and start its driver task.
    ///
    /// Must be called from within a Tokio runtime context.
    #[must_use]
    pub fn new(source: Arc<dyn MessageSource>, options: PlayOptions) -> Self {
        let shared = Arc::new(Shared {
            options,
            intent: Mutex::new(Intent {
                pending: None,
                cancel: CancellationToken::new(),
                listener: None,
                subscriptions: Subscriptions::new(),
                subscription_epoch: 0,
                is_playing: false,
                speed: 1.0,
                seek_target: None,
                until_time: None,
                emit_requested: false,
                closed: false,
                phase: Phase::Preinit,
                bounds: None,
                current_time: None,
            }),
            wake: Notify::new(),
        });

        let driver = Driver {
            shared: Arc::clone(&shared),
            source,
            initialized: false,
            start_time: Time::ZERO,
            end_time: Time::ZERO,
            topics: Vec::new(),
            current_time: Time::ZERO,
            presence: Presence::Initializing,
            messages: Vec::new(),
            iterator: None,
            lookahead: None,
        };
        tokio::spawn(driver.run());

        Self { shared }
    }

    /// Install the single listener and kick off initialization.
    pub fn set_listener(&self, listener: Arc<dyn PlayerListener>) -> PlayResult<()> {
        let mut intent = self.shared.intent.lock();
        if intent.closed {
            return Err(PlayError::Closed);
        }
        if intent.listener.is_some() {
            return Err(PlayError::ListenerAlreadySet);
        }
        intent.listener = Some(listener);
        self.shared.set_state(&mut intent, Phase::Initialize);
        Ok(())
    }

    /// Atomically replace the subscription set.
    ///
    /// When paused in a steady phase, re-issues a seek at the current time so
    /// the listener sees messages for newly subscribed topics. An unchanged
    /// set is a no-op.
    pub fn set_subscriptions(&self, subscriptions: Subscriptions) {
        let mut intent = self.shared.intent.lock();
        if intent.closed || intent.subscriptions == subscriptions {
            return;
        }
        intent.subscriptions = subscriptions;
        intent.subscription_epoch += 1;

        let steady = matches!(
            intent.phase,
            Phase::Idle | Phase::SeekBackfill | Phase::Play | Phase::StartPlay
        );
        if steady && !intent.is_playing {
            if let Some(current) = intent.current_time {
                intent.seek_target = Some(current);
                self.shared.set_state(&mut intent, Phase::SeekBackfill);
            }
        }
    }

    pub fn start_playback(&self) {
        let mut intent = self.shared.intent.lock();
        if intent.closed {
            return;
        }
        intent.is_playing = true;
        intent.emit_requested = true;
        if intent.phase == Phase::Idle {
            self.shared.set_state(&mut intent, Phase::Play);
        } else {
            self.shared.wake.notify_one();
        }
    }

    pub fn pause_playback(&self) {
        let mut intent = self.shared.intent.lock();
        if intent.closed {
            return;
        }
        intent.is_playing = false;
        intent.until_time = None;
        intent.emit_requested = true;
        if intent.phase == Phase::Play {
            self.shared.set_state(&mut intent, Phase::Idle);
        } else {
            self.shared.wake.notify_one();
        }
    }

    /// Seek to `time`, clamped to the recording bounds. Seeking to the
    /// current position is a no-op.
    pub fn seek_playback(&self, time: Time) {
        let mut intent = self.shared.intent.lock();
        if intent.closed {
            return;
        }
        let Some((start, end)) = intent.bounds else {
            // Recorded before initialization; clamped when bounds are known.
            intent.seek_target = Some(time);
            return;
        };
        let clamped = time.clamp_to(start, end);
        if intent.current_time == Some(clamped) {
            return;
        }
        intent.seek_target = Some(clamped);
        self.shared.set_state(&mut intent, Phase::SeekBackfill);
    }

    /// Play from the current position and pause upon reaching `time`.
    pub fn play_until(&self, time: Time) {
        let mut intent = self.shared.intent.lock();
        if intent.closed {
            return;
        }
        let target = match intent.bounds {
            Some((start, end)) => time.clamp_to(start, end),
            None => time,
        };
        intent.until_time = Some(target);
        intent.is_playing = true;
        if intent.phase == Phase::Idle {
            self.shared.set_state(&mut intent, Phase::Play);
        } else {
            self.shared.wake.notify_one();
        }
    }

    /// Set the playback speed, clamped to the configured bounds.
    pub fn set_playback_speed(&self, speed: f64) {
        let mut intent = self.shared.intent.lock();
        if intent.closed {
            return;
        }
        intent.speed = self.shared.options.clamp_speed(speed);
        intent.emit_requested = true;
        self.shared.wake.notify_one();
    }

    /// Shut the player down. Final and absorbing; all later inputs are
    /// ignored.
    pub fn close(&self) {
        let mut intent = self.shared.intent.lock();
        if intent.closed {
            return;
        }
        intent.closed = true;
        intent.pending = Some(Phase::Close);
        let superseded = std::mem::replace(&mut intent.cancel, CancellationToken::new());
        superseded.cancel();
        self.shared.wake.notify_one();
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.close();
    }
}

impl Shared {
    /// Queue `phase`, cancel the in-flight wait, and wake the driver.
    fn set_state(&self, intent: &mut Intent, phase: Phase) {
        if intent.closed || intent.phase == Phase::Close {
            return;
        }
        trace!(?phase, "queueing phase");
        intent.pending = Some(phase);
        let superseded = std::mem::replace(&mut intent.cancel, CancellationToken::new());
        superseded.cancel();
        self.wake.notify_one();
    }
}

/// Owns all playback state; the only task that touches the source or the
/// listener.
struct Driver {
    shared: Arc<Shared>,
    source: Arc<dyn MessageSource>,
    initialized: bool,
    start_time: Time,
    end_time: Time,
    topics: Vec<TopicInfo>,
    current_time: Time,
    presence: Presence,
    messages: Vec<Message>,
    iterator: Option<MessageStream>,
    /// Message pulled from the iterator but past the current tick's end.
    lookahead: Option<Message>,
}

enum DrainEvent {
    Cancelled,
    Buffering,
    Item(Option<IterItem>),
}

impl Driver {
    async fn run(mut self) {
        let mut phase = Phase::Preinit;
        loop {
            self.shared.intent.lock().phase = phase;
            trace!(?phase, "entering phase");
            phase = match phase {
                Phase::Preinit => self.run_preinit().await,
                Phase::Initialize => self.run_initialize().await,
                Phase::StartPlay => self.run_start_play().await,
                Phase::Idle => self.run_idle().await,
                Phase::SeekBackfill => self.run_seek_backfill().await,
                Phase::Play => self.run_play().await,
                Phase::ResetIterator => self.run_reset_iterator(),
                Phase::Close => {
                    self.run_close().await;
                    return;
                }
            };
        }
    }

    // -- phase bodies --

    async fn run_preinit(&mut self) -> Phase {
        self.emit(Phase::Preinit).await;
        self.park(Phase::Preinit).await
    }

    async fn run_initialize(&mut self) -> Phase {
        let cancel = self.current_token();
        let source = Arc::clone(&self.source);
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return self.next_or(Phase::Idle),
            result = source.initialize() => result,
        };

        match result {
            Ok(init) => {
                debug!(
                    start = %init.start,
                    end = %init.end,
                    topics = init.topics.len(),
                    "source initialized"
                );
                self.initialized = true;
                self.start_time = init.start;
                self.end_time = init.end;
                self.topics = init.topics;

                let seek_target = {
                    let mut intent = self.shared.intent.lock();
                    intent.bounds = Some((init.start, init.end));
                    if let Some(target) = intent.seek_target {
                        intent.seek_target = Some(target.clamp_to(init.start, init.end));
                    }
                    intent.seek_target
                };
                self.set_current_time(seek_target.unwrap_or(self.start_time));
                self.presence = Presence::Present;
                self.emit(Phase::Initialize).await;

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {}
                    () = sleep(self.shared.options.start_play_delay) => {}
                }
                self.next_or(Phase::StartPlay)
            }
            Err(e) => {
                // The machine stays usable; inputs are no-ops until a retry.
                error!(err = %e, "source initialization failed");
                self.presence = Presence::Error;
                self.emit(Phase::Initialize).await;
                self.next_or(Phase::Idle)
            }
        }
    }

    /// Collect the messages of the first frame so the UI is never empty,
    /// even for sources with sparse early messages.
    async fn run_start_play(&mut self) -> Phase {
        if self.shared.intent.lock().seek_target.is_some() {
            return self.next_or(Phase::SeekBackfill);
        }
        if !self.initialized {
            return self.next_or(Phase::Idle);
        }

        let cancel = self.current_token();
        let bound = (self.start_time + self.shared.options.start_skip)
            .clamp_to(self.start_time, self.end_time);
        let mut iterator = self.source.iterate(IterateArgs {
            topics: self.subscribed_topics(),
            start: Some(self.start_time),
            end: None,
            reverse: false,
        });

        let mut collected: Vec<Message> = Vec::new();
        let mut lookahead = None;
        loop {
            let item = tokio::select! {
                biased;
                () = cancel.cancelled() => return self.next_or(Phase::Idle),
                item = iterator.next() => item,
            };
            match item {
                Some(IterItem::Message(message)) => {
                    if message.receive_time > bound {
                        lookahead = Some(message);
                        break;
                    }
                    collected.push(message);
                }
                Some(IterItem::Stamp(time)) if time > bound => break,
                Some(IterItem::Stamp(_)) => {}
                Some(IterItem::Problem(problem)) => {
                    warn!(?problem, "problem while filling first frame");
                }
                None => break,
            }
        }

        let first_frame_time = collected
            .last()
            .map_or(self.start_time, |m| m.receive_time)
            .clamp_to(self.start_time, self.end_time);
        self.set_current_time(first_frame_time);
        self.messages = collected;
        self.iterator = Some(iterator);
        self.lookahead = lookahead;
        self.presence = Presence::Present;
        self.emit(Phase::StartPlay).await;

        let fallback = if self.is_playing() {
            Phase::Play
        } else {
            Phase::Idle
        };
        self.next_or(fallback)
    }

    async fn run_idle(&mut self) -> Phase {
        if self.is_playing() {
            return self.next_or(Phase::Play);
        }
        self.park(Phase::Idle).await
    }

    async fn run_seek_backfill(&mut self) -> Phase {
        let cancel = self.current_token();
        let target = {
            let mut intent = self.shared.intent.lock();
            match intent.seek_target {
                Some(target) if self.initialized => {
                    let clamped = target.clamp_to(self.start_time, self.end_time);
                    intent.seek_target = Some(clamped);
                    Some(clamped)
                }
                _ => None,
            }
        };
        let Some(target) = target else {
            return self.next_or(Phase::Idle);
        };
        debug!(target = %target, "seeking");

        let source = Arc::clone(&self.source);
        let args = BackfillArgs {
            topics: self.subscribed_topics(),
            time: target,
            cancel: cancel.clone(),
        };
        let mut backfill = Box::pin(async move { source.backfill(args).await });
        let buffering_timer = sleep(self.shared.options.seek_buffering_delay);
        tokio::pin!(buffering_timer);
        let mut timer_armed = true;

        let result = loop {
            enum SeekEvent {
                Cancelled,
                Buffering,
                Done(Result<Vec<Message>, SourceError>),
            }
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => SeekEvent::Cancelled,
                () = &mut buffering_timer, if timer_armed => SeekEvent::Buffering,
                result = &mut backfill => SeekEvent::Done(result),
            };
            match event {
                // A newer seek superseded this one: discard silently and let
                // it deliver the authoritative state.
                SeekEvent::Cancelled => return self.next_or(Phase::Idle),
                SeekEvent::Buffering => {
                    timer_armed = false;
                    self.presence = Presence::Buffering;
                    self.messages.clear();
                    self.set_current_time(target);
                    self.emit(Phase::SeekBackfill).await;
                }
                SeekEvent::Done(result) => break result,
            }
        };

        match result {
            Ok(messages) => {
                {
                    let mut intent = self.shared.intent.lock();
                    if intent.seek_target == Some(target) {
                        intent.seek_target = None;
                    }
                }
                self.set_current_time(target);
                self.messages = messages;
                self.presence = Presence::Present;
                self.emit(Phase::SeekBackfill).await;
                self.reset_iterator_from(target.add_nanos(1));

                let fallback = if self.is_playing() {
                    Phase::Play
                } else {
                    Phase::Idle
                };
                self.next_or(fallback)
            }
            Err(SourceError::Aborted) => self.next_or(Phase::Idle),
            Err(e) => {
                warn!(err = %e, "seek backfill failed");
                self.next_or(Phase::Idle)
            }
        }
    }

    async fn run_play(&mut self) -> Phase {
        loop {
            if let Some(pending) = self.take_pending() {
                return pending;
            }
            if !self.is_playing() {
                return Phase::Idle;
            }
            if self.current_time >= self.end_time {
                self.shared.intent.lock().is_playing = false;
                self.emit(Phase::Play).await;
                return self.next_or(Phase::Idle);
            }

            let tick_started = Instant::now();
            let epoch_before = self.subscription_epoch();
            let cancel = self.current_token();
            if !self.tick(&cancel).await {
                return self.next_or(Phase::Idle);
            }
            if self.subscription_epoch() != epoch_before {
                return self.next_or(Phase::ResetIterator);
            }

            let pace = self.shared.options.frame_pace;
            let elapsed = tick_started.elapsed();
            if elapsed < pace {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return self.next_or(Phase::Idle),
                    () = sleep(pace - elapsed) => {}
                }
            }
        }
    }

    /// One play tick: advance source time by `frame_pace * speed` and drain
    /// the iterator up to the new position. Returns `false` when aborted.
    async fn tick(&mut self, cancel: &CancellationToken) -> bool {
        let options = &self.shared.options;
        let (speed, until_time) = {
            let intent = self.shared.intent.lock();
            (intent.speed, intent.until_time)
        };
        #[expect(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        let advance = (options.frame_pace.as_nanos() as f64 * speed) as i128;
        let limit = until_time.unwrap_or(self.end_time).min(self.end_time);
        let tick_end = self
            .current_time
            .add_nanos(advance)
            .clamp_to(self.start_time, limit);

        let mut collected: Vec<Message> = Vec::new();
        let drain = match self.lookahead.take() {
            Some(message) if message.receive_time > tick_end => {
                self.lookahead = Some(message);
                false
            }
            Some(message) => {
                collected.push(message);
                true
            }
            None => true,
        };

        if drain {
            let mut iterator = match self.iterator.take() {
                Some(iterator) => iterator,
                None => self.make_iterator(self.current_time.add_nanos(1)),
            };
            let buffering_timer = sleep(self.shared.options.tick_buffering_delay);
            tokio::pin!(buffering_timer);
            let mut timer_armed = true;
            let mut aborted = false;

            loop {
                let event = tokio::select! {
                    biased;
                    () = cancel.cancelled() => DrainEvent::Cancelled,
                    () = &mut buffering_timer, if timer_armed => DrainEvent::Buffering,
                    item = iterator.next() => DrainEvent::Item(item),
                };
                match event {
                    DrainEvent::Cancelled => {
                        aborted = true;
                        break;
                    }
                    DrainEvent::Buffering => {
                        timer_armed = false;
                        self.presence = Presence::Buffering;
                        self.emit(Phase::Play).await;
                    }
                    DrainEvent::Item(Some(IterItem::Message(message))) => {
                        if message.receive_time > tick_end {
                            self.lookahead = Some(message);
                            break;
                        }
                        collected.push(message);
                    }
                    DrainEvent::Item(Some(IterItem::Stamp(time))) if time > tick_end => break,
                    DrainEvent::Item(Some(IterItem::Stamp(_))) => {}
                    DrainEvent::Item(Some(IterItem::Problem(problem))) => {
                        warn!(?problem, "problem during play");
                    }
                    DrainEvent::Item(None) => break,
                }
            }
            self.iterator = Some(iterator);
            if aborted {
                // Superseding work delivers the authoritative state.
                return false;
            }
        }

        self.set_current_time(tick_end);
        self.messages.extend(collected);
        self.presence = Presence::Present;
        if until_time.is_some_and(|until| tick_end >= until) {
            let mut intent = self.shared.intent.lock();
            intent.is_playing = false;
            intent.until_time = None;
        }
        self.emit(Phase::Play).await;
        true
    }

    fn run_reset_iterator(&mut self) -> Phase {
        self.reset_iterator_from(self.current_time.add_nanos(1));
        let fallback = if self.is_playing() {
            Phase::Play
        } else {
            Phase::Idle
        };
        self.next_or(fallback)
    }

    async fn run_close(&mut self) {
        self.iterator = None;
        self.lookahead = None;
        self.source.terminate().await;
        debug!("player closed");
    }

    // -- shared-state helpers --

    /// Park until a phase is queued, emitting on request.
    async fn park(&mut self, phase: Phase) -> Phase {
        loop {
            let emit_now = {
                let mut intent = self.shared.intent.lock();
                if let Some(pending) = intent.pending.take() {
                    return pending;
                }
                std::mem::take(&mut intent.emit_requested)
            };
            if emit_now {
                self.emit(phase).await;
                continue;
            }
            self.shared.wake.notified().await;
        }
    }

    fn take_pending(&self) -> Option<Phase> {
        self.shared.intent.lock().pending.take()
    }

    fn next_or(&self, fallback: Phase) -> Phase {
        self.take_pending().unwrap_or(fallback)
    }

    fn current_token(&self) -> CancellationToken {
        self.shared.intent.lock().cancel.clone()
    }

    fn is_playing(&self) -> bool {
        self.shared.intent.lock().is_playing
    }

    fn subscription_epoch(&self) -> u64 {
        self.shared.intent.lock().subscription_epoch
    }

    fn subscribed_topics(&self) -> BTreeSet<String> {
        self.shared
            .intent
            .lock()
            .subscriptions
            .keys()
            .cloned()
            .collect()
    }

    fn set_current_time(&mut self, time: Time) {
        self.current_time = time;
        self.shared.intent.lock().current_time = Some(time);
    }

    fn make_iterator(&self, start: Time) -> MessageStream {
        self.source.iterate(IterateArgs {
            topics: self.subscribed_topics(),
            start: Some(start),
            end: None,
            reverse: false,
        })
    }

    fn reset_iterator_from(&mut self, start: Time) {
        self.iterator = Some(self.make_iterator(start));
        self.lookahead = None;
    }

    /// Build and deliver a snapshot. Messages are drained so a batch is
    /// never delivered twice; emissions are serialized by virtue of the
    /// driver being the only emitter.
    async fn emit(&mut self, phase: Phase) {
        let (listener, is_playing, speed) = {
            let intent = self.shared.intent.lock();
            (intent.listener.clone(), intent.is_playing, intent.speed)
        };
        let state = PlayerState {
            phase,
            presence: self.presence,
            current_time: self.initialized.then_some(self.current_time),
            start_time: self.initialized.then_some(self.start_time),
            end_time: self.initialized.then_some(self.end_time),
            is_playing,
            speed,
            topics: self.topics.clone(),
            messages: std::mem::take(&mut self.messages),
            progress: self.source.progress(),
        };
        if let Some(listener) = listener {
            listener.on_state(state).await;
        }
    }
}
