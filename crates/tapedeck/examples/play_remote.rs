//! Serve a generated recording over local HTTP and play it back.
//!
//! ```sh
//! cargo run --example play_remote
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tapedeck::{
    PlayerListener, PlayerState, PreloadPolicy, Subscriptions, TapeBuilder, TapedeckConfig, Time,
    open_remote,
};
use tapedeck_test_utils::{TestHttpServer, range_router};

struct PrintListener;

#[async_trait]
impl PlayerListener for PrintListener {
    async fn on_state(&self, state: PlayerState) {
        let current = state
            .current_time
            .map_or_else(|| "-".to_owned(), |t| t.to_string());
        println!(
            "{:?} {:?} t={} playing={} messages={}",
            state.phase,
            state.presence,
            current,
            state.is_playing,
            state.messages.len(),
        );
        for message in &state.messages {
            println!("  {} {} ({} bytes)", message.receive_time, message.topic, message.size_bytes);
        }
    }
}

fn build_demo_tape() -> bytes::Bytes {
    let mut builder = TapeBuilder::new();
    let scans = builder.topic("/lidar/scans", "LaserScan");
    let poses = builder.topic("/pose", "Pose");
    for sec in 0..30i64 {
        builder.message(scans, Time::from_secs(sec), vec![0u8; 512]);
        builder.message(poses, Time::new(sec, 500_000_000), vec![0u8; 48]);
    }
    builder.build()
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let server = TestHttpServer::new(range_router(build_demo_tape())).await;
    println!("serving demo tape at {}", server.url("/file"));

    let player = open_remote(server.url("/file"), TapedeckConfig::default());
    player.set_listener(Arc::new(PrintListener)).unwrap();

    let subscriptions: Subscriptions = [
        ("/lidar/scans".to_owned(), PreloadPolicy::Full),
        ("/pose".to_owned(), PreloadPolicy::Full),
    ]
    .into_iter()
    .collect();
    player.set_subscriptions(subscriptions);

    player.seek_playback(Time::from_secs(10));
    player.set_playback_speed(4.0);
    player.start_playback();

    tokio::time::sleep(Duration::from_secs(3)).await;
    player.close();
}
