//! # Playback Engine Usage Example
//!
//! Drives the engine against a simulated host player so the queue, preload
//! and history flow can be watched in the logs.
//!
//! Run with: `cargo run --example playback_demo --package core-playback`

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    LogLevel, PlayHistory, PlayerFactory, PlayerOptions, PlayerResource, PlayerStatus,
    StatusCallback,
};
use core_playback::{CatalogTrack, PlaybackConfig, PlaybackEngine};
use core_runtime::config::CoreConfig;
use core_runtime::events::EventBus;
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Simulated host player (for demonstration)
// ============================================================================

struct SimulatedPlayer {
    uri: String,
    state: Mutex<(bool, u64)>,
    callback: Mutex<Option<StatusCallback>>,
}

impl SimulatedPlayer {
    fn status_now(&self) -> PlayerStatus {
        let (playing, position_ms) = *self.state.lock();
        PlayerStatus::loaded(playing, position_ms, Some(30_000))
    }

    fn notify(&self) {
        let status = self.status_now();
        if let Some(callback) = self.callback.lock().clone() {
            callback(status);
        }
    }
}

#[async_trait]
impl PlayerResource for SimulatedPlayer {
    async fn play(&self) -> BridgeResult<()> {
        self.state.lock().0 = true;
        self.notify();
        Ok(())
    }

    async fn pause(&self) -> BridgeResult<()> {
        self.state.lock().0 = false;
        self.notify();
        Ok(())
    }

    async fn seek(&self, position_ms: u64) -> BridgeResult<()> {
        self.state.lock().1 = position_ms;
        Ok(())
    }

    async fn status(&self) -> BridgeResult<PlayerStatus> {
        Ok(self.status_now())
    }

    async fn release(&self) -> BridgeResult<()> {
        println!("  [host] released {}", self.uri);
        Ok(())
    }

    fn set_status_callback(&self, callback: Option<StatusCallback>) {
        *self.callback.lock() = callback;
    }
}

struct SimulatedFactory;

#[async_trait]
impl PlayerFactory for SimulatedFactory {
    async fn create(
        &self,
        audio_uri: &str,
        options: PlayerOptions,
    ) -> BridgeResult<Arc<dyn PlayerResource>> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        println!(
            "  [host] created {} ({})",
            audio_uri,
            if options.autoplay { "foreground" } else { "preload" }
        );
        Ok(Arc::new(SimulatedPlayer {
            uri: audio_uri.to_string(),
            state: Mutex::new((options.autoplay, 0)),
            callback: Mutex::new(None),
        }))
    }
}

struct PrintingHistory;

#[async_trait]
impl PlayHistory for PrintingHistory {
    async fn record_play(&self, track_id: &str, listened_ms: u64) -> BridgeResult<()> {
        println!("  [history] {} played for {} ms", track_id, listened_ms);
        Ok(())
    }
}

// ============================================================================
// Main
// ============================================================================

const CATALOG: &str = r#"[
    {"_id":"t1","title":"Morning","artist":{"_id":"a1","name":"The Lanterns"},
     "audioUrl":"https://cdn.example.com/t1.mp3?sig=abc","duration":184.2},
    {"_id":"t2","title":"Harbour","artist":"a2",
     "audioUrl":"https://cdn.example.com/t2.mp3?sig=def"},
    {"_id":"t3","title":"Static","artist":{"_id":"a1","name":"The Lanterns"},
     "album":{"_id":"al1","title":"Signals","coverUrl":"https://img.example.com/al1.jpg"},
     "audioUrl":"https://cdn.example.com/t3.mp3?sig=ghi"}
]"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(
        LoggingConfig::default()
            .with_format(LogFormat::Compact)
            .with_level(LogLevel::Debug),
    )?;

    let core = CoreConfig::builder()
        .player_factory(Arc::new(SimulatedFactory))
        .play_history(Arc::new(PrintingHistory))
        .build()?;
    let events = EventBus::new(core.event_buffer_size);
    let engine = PlaybackEngine::new(&core, PlaybackConfig::default(), events.clone())?;

    let mut stream = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = stream.recv().await {
            println!("  [event] {}", event.description());
        }
    });

    let records: Vec<CatalogTrack> = serde_json::from_str(CATALOG)?;

    println!("== Start queue");
    engine.play_records(&records, 0).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    println!("== Next (served from the preload cache)");
    engine.next().await;

    println!("== Pause and resume");
    engine.toggle_play_pause().await;
    engine.toggle_play_pause().await;

    println!("== Reorder without interrupting");
    let mut reordered = engine.snapshot().queue;
    reordered.reverse();
    engine.update_queue_preserving_playback(reordered).await;

    let snapshot = engine.snapshot();
    println!(
        "== Now playing {:?} at index {:?} ({:?})",
        snapshot.current_track.map(|track| track.title),
        snapshot.current_index,
        snapshot.phase
    );

    engine.dispose().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
