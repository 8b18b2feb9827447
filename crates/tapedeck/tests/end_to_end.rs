use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tapedeck::{
    Phase, PlayOptions, PlayerListener, PlayerState, PreloadPolicy, Presence, Subscriptions,
    TapeBuilder, TapedeckConfig, Time, open_remote,
};
use tapedeck_test_utils::{TestHttpServer, range_router};
use tokio::sync::Notify;

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
    async fn wait_for(&self, pred: impl Fn(&PlayerState) -> bool) -> PlayerState {
        tokio::time::timeout(Duration::from_secs(10), async {
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

fn drive_tape() -> bytes::Bytes {
    let mut builder = TapeBuilder::new();
    let scans = builder.topic("/lidar/scans", "LaserScan");
    let poses = builder.topic("/pose", "Pose");
    for sec in 0..60i64 {
        builder.message(scans, Time::from_secs(sec), vec![0xAB; 256]);
        builder.message(poses, Time::new(sec, 500_000_000), vec![0xCD; 64]);
    }
    builder.build()
}

#[tokio::test]
async fn plays_a_recording_served_over_http() {
    let server = TestHttpServer::new(range_router(drive_tape())).await;
    let config = TapedeckConfig {
        play: PlayOptions {
            start_play_delay: Duration::from_millis(10),
            ..PlayOptions::default()
        },
        ..TapedeckConfig::default()
    };
    let player = open_remote(server.url("/file"), config);

    let listener = Arc::new(RecordingListener::default());
    player
        .set_listener(Arc::clone(&listener) as Arc<dyn PlayerListener>)
        .unwrap();

    // Initialization reads only the header and index off the wire.
    let state = listener
        .wait_for(|s| s.phase == Phase::StartPlay && s.presence == Presence::Present)
        .await;
    assert_eq!(state.start_time, Some(Time::ZERO));
    assert_eq!(state.end_time, Some(Time::new(59, 500_000_000)));
    assert_eq!(state.topics.len(), 2);
    assert!(!state.progress.is_empty());

    // A seek backfills the latest message per subscribed topic.
    let subscriptions: Subscriptions = [
        ("/lidar/scans".to_owned(), PreloadPolicy::Full),
        ("/pose".to_owned(), PreloadPolicy::Full),
    ]
    .into_iter()
    .collect();
    player.set_subscriptions(subscriptions);
    player.seek_playback(Time::new(30, 250_000_000));

    let state = listener
        .wait_for(|s| {
            s.current_time == Some(Time::new(30, 250_000_000)) && s.messages.len() == 2
        })
        .await;
    assert_eq!(state.messages[0].receive_time, Time::new(29, 500_000_000));
    assert_eq!(state.messages[0].topic, "/pose");
    assert_eq!(state.messages[1].receive_time, Time::from_secs(30));
    assert_eq!(state.messages[1].topic, "/lidar/scans");
    assert_eq!(state.messages[1].payload.as_ref(), &[0xAB; 256]);

    // Playing delivers the next records in receive-time order.
    player.set_playback_speed(10.0);
    player.start_playback();
    let state = listener
        .wait_for(|s| {
            s.messages
                .iter()
                .any(|m| m.receive_time == Time::new(30, 500_000_000) && m.topic == "/pose")
        })
        .await;
    assert!(state.is_playing);

    player.close();
}
