use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tapedeck_core::Time;
use tapedeck_play::{
    Phase, PlayError, PlayOptions, Player, PlayerListener, PlayerState, PreloadPolicy, Presence,
    Subscriptions,
};
use tapedeck_source::{
    BackfillArgs, Initialization, IterateArgs, MemorySource, Message, MessageSource, MessageStream,
    SourceResult, TopicInfo,
};
use tokio::sync::Notify;

fn message(topic: &str, time: Time) -> Message {
    Message {
        topic: topic.to_owned(),
        receive_time: time,
        size_bytes: 1,
        payload: Bytes::from_static(b"x"),
        schema: "Test".to_owned(),
    }
}

fn topic(name: &str) -> TopicInfo {
    TopicInfo {
        name: name.to_owned(),
        schema: "Test".to_owned(),
    }
}

fn standard_source() -> MemorySource {
    MemorySource::new(
        Time::ZERO,
        Time::from_secs(100),
        vec![topic("/t1"), topic("/t2")],
        vec![
            message("/t1", Time::from_secs(10)),
            message("/t2", Time::from_secs(20)),
            message("/t1", Time::from_secs(42)),
            message("/t1", Time::from_secs(60)),
            message("/t2", Time::from_secs(80)),
        ],
    )
}

fn subscriptions(names: &[&str]) -> Subscriptions {
    names
        .iter()
        .map(|&n| (n.to_owned(), PreloadPolicy::Full))
        .collect()
}

#[derive(Default)]
struct RecordingListener {
    states: Mutex<Vec<PlayerState>>,
    notify: Notify,
}

#[async_trait]
impl PlayerListener for RecordingListener {
    async fn on_state(&self, state: PlayerState) {
        self.states.lock().push(state);
        self.notify.notify_waiters();
    }
}

impl RecordingListener {
    fn snapshot(&self) -> Vec<PlayerState> {
        self.states.lock().clone()
    }

    async fn wait_for(&self, pred: impl Fn(&PlayerState) -> bool) -> PlayerState {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let notified = self.notify.notified();
                if let Some(state) = self.states.lock().iter().rev().find(|s| pred(s)) {
                    return state.clone();
                }
                notified.await;
            }
        })
        .await
        .expect("timed out waiting for player state")
    }
}

fn player_over(source: impl MessageSource) -> (Player, Arc<RecordingListener>) {
    let options = PlayOptions {
        start_play_delay: Duration::from_millis(10),
        ..PlayOptions::default()
    };
    let player = Player::new(Arc::new(source), options);
    let listener = Arc::new(RecordingListener::default());
    player
        .set_listener(Arc::clone(&listener) as Arc<dyn PlayerListener>)
        .unwrap();
    (player, listener)
}

async fn settled(listener: &RecordingListener) -> PlayerState {
    listener
        .wait_for(|s| s.phase == Phase::StartPlay && s.presence == Presence::Present)
        .await
}

#[tokio::test]
async fn initialization_snapshot() {
    let source = MemorySource::new(
        Time::ZERO,
        Time::from_secs(100),
        vec![topic("/a"), topic("/b")],
        Vec::new(),
    );
    let (_player, listener) = player_over(source);

    let state = settled(&listener).await;
    assert_eq!(state.start_time, Some(Time::ZERO));
    assert_eq!(state.end_time, Some(Time::from_secs(100)));
    assert_eq!(state.current_time, Some(Time::ZERO));
    assert!(!state.is_playing);
    assert!((state.speed - 1.0).abs() < f64::EPSILON);
    assert_eq!(state.topics.len(), 2);
}

#[tokio::test]
async fn seek_is_clamped_to_recording_bounds() {
    let (player, listener) = player_over(standard_source());
    settled(&listener).await;

    player.seek_playback(Time::from_secs(150));
    listener
        .wait_for(|s| {
            s.phase == Phase::SeekBackfill
                && s.presence == Presence::Present
                && s.current_time == Some(Time::from_secs(100))
        })
        .await;

    player.seek_playback(Time::from_secs(-10));
    listener
        .wait_for(|s| {
            s.phase == Phase::SeekBackfill
                && s.presence == Presence::Present
                && s.current_time == Some(Time::ZERO)
        })
        .await;
}

#[tokio::test]
async fn speed_is_clamped_and_emitted() {
    let (player, listener) = player_over(standard_source());
    settled(&listener).await;

    player.set_playback_speed(0.05);
    let state = listener
        .wait_for(|s| (s.speed - 0.1).abs() < f64::EPSILON)
        .await;
    assert!((state.speed - 0.1).abs() < f64::EPSILON);

    player.set_playback_speed(15.0);
    listener
        .wait_for(|s| (s.speed - 10.0).abs() < f64::EPSILON)
        .await;
}

#[tokio::test]
async fn seek_backfills_subscribed_messages() {
    let (player, listener) = player_over(standard_source());
    settled(&listener).await;

    player.set_subscriptions(subscriptions(&["/t1"]));
    player.seek_playback(Time::from_secs(42));

    let state = listener
        .wait_for(|s| s.current_time == Some(Time::from_secs(42)) && !s.messages.is_empty())
        .await;
    assert_eq!(state.messages.len(), 1);
    assert_eq!(state.messages[0].topic, "/t1");
    assert_eq!(state.messages[0].receive_time, Time::from_secs(42));
}

#[tokio::test]
async fn play_to_end_auto_pauses() {
    let (player, listener) = player_over(standard_source());
    settled(&listener).await;

    player.seek_playback(Time::new(99, 900_000_000));
    listener
        .wait_for(|s| {
            s.current_time == Some(Time::new(99, 900_000_000)) && s.presence == Presence::Present
        })
        .await;

    player.start_playback();
    let state = listener
        .wait_for(|s| !s.is_playing && s.current_time == Some(Time::from_secs(100)))
        .await;
    assert_eq!(state.current_time, Some(Time::from_secs(100)));
}

#[tokio::test]
async fn play_advances_time_and_delivers_messages() {
    let (player, listener) = player_over(standard_source());
    settled(&listener).await;

    player.set_subscriptions(subscriptions(&["/t1", "/t2"]));
    player.seek_playback(Time::new(9, 500_000_000));
    listener
        .wait_for(|s| s.current_time == Some(Time::new(9, 500_000_000)))
        .await;

    // At 10x speed a tick covers 160 ms of source time; the message at t=10
    // arrives within the first few ticks.
    player.set_playback_speed(10.0);
    player.start_playback();
    let state = listener
        .wait_for(|s| s.messages.iter().any(|m| m.receive_time == Time::from_secs(10)))
        .await;
    assert!(state.is_playing);
    assert!(state.current_time >= Some(Time::from_secs(10)));

    player.pause_playback();
    listener.wait_for(|s| !s.is_playing).await;
}

#[tokio::test]
async fn play_until_pauses_at_target() {
    let (player, listener) = player_over(standard_source());
    settled(&listener).await;

    player.seek_playback(Time::from_secs(99));
    listener
        .wait_for(|s| s.current_time == Some(Time::from_secs(99)) && s.presence == Presence::Present)
        .await;

    player.set_playback_speed(10.0);
    player.play_until(Time::new(99, 500_000_000));
    listener
        .wait_for(|s| !s.is_playing && s.current_time == Some(Time::new(99, 500_000_000)))
        .await;
}

#[tokio::test]
async fn unchanged_subscriptions_do_not_reseek() {
    let (player, listener) = player_over(standard_source());
    settled(&listener).await;

    player.set_subscriptions(subscriptions(&["/t1"]));
    listener
        .wait_for(|s| s.phase == Phase::SeekBackfill && s.presence == Presence::Present)
        .await;

    let before = listener.snapshot().len();
    player.set_subscriptions(subscriptions(&["/t1"]));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(listener.snapshot().len(), before);
}

#[tokio::test]
async fn seek_before_listener_is_honored_at_initialize() {
    let source = standard_source();
    let options = PlayOptions {
        start_play_delay: Duration::from_millis(10),
        ..PlayOptions::default()
    };
    let player = Player::new(Arc::new(source), options);
    player.seek_playback(Time::from_secs(30));

    let listener = Arc::new(RecordingListener::default());
    player
        .set_listener(Arc::clone(&listener) as Arc<dyn PlayerListener>)
        .unwrap();

    listener
        .wait_for(|s| {
            s.phase == Phase::SeekBackfill
                && s.presence == Presence::Present
                && s.current_time == Some(Time::from_secs(30))
        })
        .await;
}

#[tokio::test]
async fn listener_is_single_assignment() {
    let (player, _listener) = player_over(standard_source());
    let second = Arc::new(RecordingListener::default());
    assert!(matches!(
        player.set_listener(second as Arc<dyn PlayerListener>),
        Err(PlayError::ListenerAlreadySet)
    ));
}

#[tokio::test]
async fn failed_initialize_leaves_machine_usable() {
    let (player, listener) = player_over(MemorySource::failing());
    let state = listener
        .wait_for(|s| s.presence == Presence::Error)
        .await;
    assert_eq!(state.start_time, None);

    // Inputs are absorbed without panicking or emitting garbage.
    player.seek_playback(Time::from_secs(10));
    player.start_playback();
    player.pause_playback();
}

#[tokio::test]
async fn close_stops_emissions_and_inputs() {
    let (player, listener) = player_over(standard_source());
    settled(&listener).await;

    player.close();
    tokio::time::sleep(Duration::from_millis(30)).await;
    let count = listener.snapshot().len();

    player.seek_playback(Time::from_secs(50));
    player.start_playback();
    player.set_playback_speed(2.0);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(listener.snapshot().len(), count);
}

/// Delegates to [`MemorySource`], delaying backfill so seeks stay in flight
/// long enough to be superseded.
struct SlowBackfillSource {
    inner: MemorySource,
    delay: Duration,
}

#[async_trait]
impl MessageSource for SlowBackfillSource {
    async fn initialize(&self) -> SourceResult<Initialization> {
        self.inner.initialize().await
    }

    fn iterate(&self, args: IterateArgs) -> MessageStream {
        self.inner.iterate(args)
    }

    async fn backfill(&self, args: BackfillArgs) -> SourceResult<Vec<Message>> {
        tokio::time::sleep(self.delay).await;
        self.inner.backfill(args).await
    }

    fn progress(&self) -> Vec<Range<f64>> {
        self.inner.progress()
    }

    async fn terminate(&self) {
        self.inner.terminate().await;
    }
}

#[tokio::test]
async fn newer_seek_supersedes_older_seek() {
    let source = SlowBackfillSource {
        inner: standard_source(),
        delay: Duration::from_millis(60),
    };
    let (player, listener) = player_over(source);
    settled(&listener).await;
    let t1 = Time::from_secs(10);
    let t2 = Time::from_secs(20);

    player.seek_playback(t1);
    tokio::time::sleep(Duration::from_millis(20)).await;
    player.seek_playback(t2);

    listener
        .wait_for(|s| s.presence == Presence::Present && s.current_time == Some(t2))
        .await;

    // The superseded pass never emitted: no state settled at t1.
    let settled_at_t1 = listener
        .snapshot()
        .iter()
        .any(|s| s.phase == Phase::SeekBackfill && s.current_time == Some(t1));
    assert!(!settled_at_t1);
}

#[tokio::test]
async fn subscription_change_while_paused_refreshes_messages() {
    let (player, listener) = player_over(standard_source());
    settled(&listener).await;

    player.seek_playback(Time::from_secs(50));
    listener
        .wait_for(|s| s.current_time == Some(Time::from_secs(50)) && s.presence == Presence::Present)
        .await;

    // Subscribing while paused re-issues a backfill at the current time.
    player.set_subscriptions(subscriptions(&["/t2"]));
    let state = listener
        .wait_for(|s| {
            s.current_time == Some(Time::from_secs(50))
                && s.messages.iter().any(|m| m.topic == "/t2")
        })
        .await;
    assert_eq!(state.messages.len(), 1);
    assert_eq!(state.messages[0].receive_time, Time::from_secs(20));
}
