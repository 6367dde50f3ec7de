//! Shared fakes for the playback engine integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    BridgeError, ManualClock, PlayHistory, PlayerFactory, PlayerOptions, PlayerResource,
    PlayerStatus, StatusCallback,
};
use chrono::{TimeZone, Utc};
use core_playback::{PlaybackConfig, PlaybackEngine, TrackDescriptor};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

pub const TRACK_DURATION_MS: u64 = 180_000;

pub fn uri(id: &str) -> String {
    format!("https://cdn.test/audio/{}.mp3", id)
}

pub fn track(id: &str) -> TrackDescriptor {
    TrackDescriptor::new(id, format!("Song {}", id), uri(id))
}

pub fn tracks(ids: &[&str]) -> Vec<TrackDescriptor> {
    ids.iter().map(|id| track(id)).collect()
}

// ============================================================================
// Fake player resource
// ============================================================================

#[derive(Debug, Default)]
struct FakeState {
    playing: bool,
    position_ms: u64,
    released: bool,
}

pub struct FakeResource {
    pub uri: String,
    pub autoplay: bool,
    state: Mutex<FakeState>,
    callback: Mutex<Option<StatusCallback>>,
    seeks: Mutex<Vec<u64>>,
    releases: AtomicUsize,
    release_gate: Option<Arc<Semaphore>>,
}

impl FakeResource {
    fn new(uri: &str, options: PlayerOptions, release_gate: Option<Arc<Semaphore>>) -> Self {
        Self {
            uri: uri.to_string(),
            autoplay: options.autoplay,
            state: Mutex::new(FakeState {
                playing: options.autoplay,
                ..Default::default()
            }),
            callback: Mutex::new(None),
            seeks: Mutex::new(Vec::new()),
            releases: AtomicUsize::new(0),
            release_gate,
        }
    }

    fn current_status(&self) -> PlayerStatus {
        let state = self.state.lock();
        if state.released {
            return PlayerStatus::unloaded();
        }
        PlayerStatus::loaded(state.playing, state.position_ms, Some(TRACK_DURATION_MS))
    }

    /// Deliver a status update the way the host would.
    pub fn emit(&self, status: PlayerStatus) {
        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            callback(status);
        }
    }

    /// Report playback progress.
    pub fn progress(&self, position_ms: u64) {
        self.state.lock().position_ms = position_ms;
        let status = self.current_status();
        self.emit(status);
    }

    /// Report a natural finish.
    pub fn finish(&self) {
        {
            let mut state = self.state.lock();
            state.playing = false;
            state.position_ms = TRACK_DURATION_MS;
        }
        self.emit(PlayerStatus::finished(TRACK_DURATION_MS));
    }

    /// Simulate the host dropping the media underneath us.
    pub fn unload(&self) {
        self.state.lock().released = true;
    }

    pub fn has_callback(&self) -> bool {
        self.callback.lock().is_some()
    }

    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    pub fn seeks(&self) -> Vec<u64> {
        self.seeks.lock().clone()
    }
}

#[async_trait]
impl PlayerResource for FakeResource {
    async fn play(&self) -> BridgeResult<()> {
        let mut state = self.state.lock();
        if state.released {
            return Err(BridgeError::Released);
        }
        state.playing = true;
        Ok(())
    }

    async fn pause(&self) -> BridgeResult<()> {
        let mut state = self.state.lock();
        if state.released {
            return Err(BridgeError::Released);
        }
        state.playing = false;
        Ok(())
    }

    async fn seek(&self, position_ms: u64) -> BridgeResult<()> {
        let mut state = self.state.lock();
        if state.released {
            return Err(BridgeError::Released);
        }
        state.position_ms = position_ms;
        self.seeks.lock().push(position_ms);
        Ok(())
    }

    async fn status(&self) -> BridgeResult<PlayerStatus> {
        Ok(self.current_status())
    }

    async fn release(&self) -> BridgeResult<()> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.release_gate {
            gate.acquire()
                .await
                .map_err(|err| BridgeError::OperationFailed(err.to_string()))?
                .forget();
        }
        let mut state = self.state.lock();
        state.released = true;
        state.playing = false;
        Ok(())
    }

    fn set_status_callback(&self, callback: Option<StatusCallback>) {
        *self.callback.lock() = callback;
    }
}

// ============================================================================
// Fake player factory
// ============================================================================

/// Factory that records every call and can hold or fail loads per URI.
#[derive(Default)]
pub struct FakeFactory {
    calls: Mutex<Vec<(String, bool)>>,
    created: Mutex<Vec<Arc<FakeResource>>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    failing: Mutex<HashSet<String>>,
    release_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Hold every subsequent load of `uri` until [`FakeFactory::open`].
    pub fn gate(&self, uri: &str) {
        self.gates
            .lock()
            .insert(uri.to_string(), Arc::new(Semaphore::new(0)));
    }

    /// Let one held load of `uri` complete.
    pub fn open(&self, uri: &str) {
        if let Some(gate) = self.gates.lock().get(uri) {
            gate.add_permits(1);
        }
    }

    /// Resources created from now on block in `release` until
    /// [`FakeFactory::open_releases`]. The release is counted on entry.
    pub fn hold_releases(&self) {
        *self.release_gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn open_releases(&self, count: usize) {
        if let Some(gate) = self.release_gate.lock().as_ref() {
            gate.add_permits(count);
        }
    }

    pub fn fail(&self, uri: &str) {
        self.failing.lock().insert(uri.to_string());
    }

    /// Calls with `autoplay` set, i.e. foreground loads.
    pub fn foreground_calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|(_, autoplay)| *autoplay)
            .map(|(uri, _)| uri.clone())
            .collect()
    }

    /// Calls without `autoplay`, i.e. preloads.
    pub fn preload_calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|(_, autoplay)| !*autoplay)
            .map(|(uri, _)| uri.clone())
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn created(&self) -> Vec<Arc<FakeResource>> {
        self.created.lock().clone()
    }

    /// Most recent foreground resource created for `uri`.
    pub fn foreground(&self, uri: &str) -> Option<Arc<FakeResource>> {
        self.created
            .lock()
            .iter()
            .rev()
            .find(|resource| resource.uri == uri && resource.autoplay)
            .cloned()
    }

    /// Most recent preloaded resource created for `uri`.
    pub fn preloaded(&self, uri: &str) -> Option<Arc<FakeResource>> {
        self.created
            .lock()
            .iter()
            .rev()
            .find(|resource| resource.uri == uri && !resource.autoplay)
            .cloned()
    }
}

#[async_trait]
impl PlayerFactory for FakeFactory {
    async fn create(
        &self,
        audio_uri: &str,
        options: PlayerOptions,
    ) -> BridgeResult<Arc<dyn PlayerResource>> {
        self.calls
            .lock()
            .push((audio_uri.to_string(), options.autoplay));

        let gate = self.gates.lock().get(audio_uri).cloned();
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|err| BridgeError::OperationFailed(err.to_string()))?
                .forget();
        }

        if self.failing.lock().contains(audio_uri) {
            return Err(BridgeError::LoadFailed {
                uri: audio_uri.to_string(),
                message: "decoder rejected stream".to_string(),
            });
        }

        let release_gate = self.release_gate.lock().clone();
        let resource = Arc::new(FakeResource::new(audio_uri, options, release_gate));
        self.created.lock().push(resource.clone());
        Ok(resource)
    }
}

// ============================================================================
// Recording history
// ============================================================================

#[derive(Default)]
pub struct RecordingHistory {
    records: Mutex<Vec<(String, u64)>>,
    failing: AtomicBool,
}

impl RecordingHistory {
    pub fn records(&self) -> Vec<(String, u64)> {
        self.records.lock().clone()
    }

    pub fn fail_all(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PlayHistory for RecordingHistory {
    async fn record_play(&self, track_id: &str, listened_ms: u64) -> BridgeResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("history backend down".to_string()));
        }
        self.records
            .lock()
            .push((track_id.to_string(), listened_ms));
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness<H = RecordingHistory> {
    pub engine: PlaybackEngine,
    pub factory: Arc<FakeFactory>,
    pub history: Arc<H>,
    pub clock: Arc<ManualClock>,
    pub events: EventBus,
}

impl<H: PlayHistory + 'static> Harness<H> {
    /// Engine reporting listens to `history` instead of a recorder.
    pub fn with_history(config: PlaybackConfig, history: Arc<H>) -> Self {
        let factory = FakeFactory::new();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let core = CoreConfig::builder()
            .player_factory(factory.clone())
            .play_history(history.clone())
            .clock(clock.clone())
            .build()
            .unwrap();
        let events = EventBus::new(256);
        let engine = PlaybackEngine::new(&core, config, events.clone()).unwrap();

        Self {
            engine,
            factory,
            history,
            clock,
            events,
        }
    }

    pub fn live(&self, id: &str) -> Arc<FakeResource> {
        self.factory
            .foreground(&uri(id))
            .or_else(|| self.factory.preloaded(&uri(id)))
            .unwrap_or_else(|| panic!("no resource created for {}", id))
    }

    pub fn current_id(&self) -> Option<String> {
        self.engine
            .snapshot()
            .current_track
            .map(|track| track.id)
    }
}

impl Harness {
    pub fn new(config: PlaybackConfig) -> Self {
        Self::with_history(config, Arc::new(RecordingHistory::default()))
    }

    /// Engine without speculative preloads, so factory calls are all
    /// foreground loads.
    pub fn without_preload() -> Self {
        Self::new(no_preload_config())
    }
}

pub fn no_preload_config() -> PlaybackConfig {
    PlaybackConfig {
        preload_enabled: false,
        shuffle_seed: Some(7),
        ..Default::default()
    }
}

/// Yield to spawned tasks until `condition` holds.
pub async fn eventually<F>(condition: F)
where
    F: Fn() -> bool,
{
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

/// Give spawned tasks a chance to run.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

pub fn drain(receiver: &mut tokio::sync::broadcast::Receiver<CoreEvent>) -> Vec<CoreEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}
