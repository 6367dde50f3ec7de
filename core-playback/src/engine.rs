//! # Playback Engine
//!
//! Public orchestrator composing the queue, the preload cache and the
//! playback session.
//!
//! ## Overview
//!
//! Presentation code drives the engine through async operations
//! (`set_queue`, `next`, `previous`, `toggle_shuffle`, ...). None of them
//! return errors: failures are contained, logged, and surfaced on the event
//! bus. Derived state is published through a `tokio::sync::watch` channel as
//! [`PlayerSnapshot`], so observers always see the latest value without
//! polling.
//!
//! ## Usage
//!
//! ```ignore
//! use core_playback::{PlaybackConfig, PlaybackEngine};
//!
//! let engine = PlaybackEngine::new(&core_config, PlaybackConfig::default(), event_bus)?;
//! let mut state = engine.subscribe();
//!
//! engine.play_records(&records, 0).await;
//! engine.next().await;
//!
//! state.changed().await?;
//! println!("now playing: {:?}", state.borrow().current_track);
//! ```
//!
//! ## Threading
//!
//! The engine is `Send + Sync` and cheap to clone. Status callbacks from the
//! host re-enter the engine from whatever thread the host uses; finish
//! handling, preloads and history reports are spawned onto the ambient tokio
//! runtime.

use crate::config::PlaybackConfig;
use crate::error::{PlaybackError, Result};
use crate::preload::PreloadCache;
use crate::queue::{PlayQueue, RepeatMode};
use crate::session::{
    ListenRecord, PlayOutcome, PlaybackSession, SessionPhase, StatusDisposition,
};
use crate::track::{resolve_track, CatalogTrack, TrackDescriptor};
use bridge_traits::{PlayHistory, PlayerOptions, PlayerStatus};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, HistoryEvent, PlaybackEvent, QueueEvent};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// Derived, read-only view of the engine published on every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlayerSnapshot {
    pub current_track: Option<TrackDescriptor>,
    pub is_playing: bool,
    pub is_loading: bool,
    pub position_ms: u64,
    pub duration_ms: Option<u64>,
    pub queue: Vec<TrackDescriptor>,
    pub current_index: Option<usize>,
    pub shuffle_enabled: bool,
    pub repeat_mode: RepeatMode,
    pub phase: SessionPhase,
}

/// Handle to the playback engine.
#[derive(Clone)]
pub struct PlaybackEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: PlaybackConfig,
    queue: Mutex<PlayQueue>,
    rng: Mutex<StdRng>,
    session: PlaybackSession,
    cache: Arc<PreloadCache>,
    history: Arc<dyn PlayHistory>,
    events: EventBus,
    snapshot_tx: watch::Sender<PlayerSnapshot>,
    disposed: AtomicBool,
}

impl PlaybackEngine {
    /// Build an engine from the host bridges in `core` and the tuning in
    /// `config`. Events are published on `events`.
    pub fn new(core: &CoreConfig, config: PlaybackConfig, events: EventBus) -> Result<Self> {
        config.validate()?;

        let options =
            PlayerOptions::default().with_progress_interval(config.progress_update_interval);
        let cache = Arc::new(PreloadCache::new(
            core.player_factory.clone(),
            config.preload_capacity,
            options,
        ));
        let rng = match config.shuffle_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (snapshot_tx, _) = watch::channel(PlayerSnapshot::default());

        let inner = Arc::new_cyclic(|weak: &Weak<EngineInner>| {
            let status_target = weak.clone();
            let change_target = weak.clone();

            let session = PlaybackSession::new(
                core.player_factory.clone(),
                cache.clone(),
                core.clock.clone(),
                events.clone(),
                options,
                Arc::new(move |generation: u64, status: PlayerStatus| {
                    if let Some(inner) = status_target.upgrade() {
                        inner.handle_status(generation, status);
                    }
                }),
                Arc::new(move || {
                    if let Some(inner) = change_target.upgrade() {
                        inner.publish();
                    }
                }),
            );

            EngineInner {
                config,
                queue: Mutex::new(PlayQueue::new()),
                rng: Mutex::new(rng),
                session,
                cache,
                history: core.play_history.clone(),
                events,
                snapshot_tx,
                disposed: AtomicBool::new(false),
            }
        });

        Ok(Self { inner })
    }

    /// Latest published state.
    pub fn snapshot(&self) -> PlayerSnapshot {
        self.inner.snapshot_tx.borrow().clone()
    }

    /// Observe state changes. The receiver starts at the current value.
    pub fn subscribe(&self) -> watch::Receiver<PlayerSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Event bus the engine publishes discrete transitions on.
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.inner.config
    }

    /// Replace the queue and start playing at `start_index` (clamped). An
    /// empty list is ignored.
    #[instrument(skip(self, tracks), fields(len = tracks.len()))]
    pub async fn set_queue(&self, tracks: Vec<TrackDescriptor>, start_index: usize) {
        self.inner.set_queue(tracks, start_index).await;
    }

    /// Replace the queue contents without interrupting the current track when
    /// it is still present. Falls back to [`set_queue`](Self::set_queue) when
    /// nothing is playing or the current track was removed. An empty list
    /// clears the queue.
    #[instrument(skip(self, tracks), fields(len = tracks.len()))]
    pub async fn update_queue_preserving_playback(&self, tracks: Vec<TrackDescriptor>) {
        let inner = &self.inner;
        if inner.is_disposed() {
            return;
        }
        if tracks.is_empty() {
            inner.clear_queue().await;
            return;
        }

        let active = inner.session.has_live() || inner.session.pending_track_id().is_some();
        let current_id = inner.queue.lock().current().map(|track| track.id.clone());
        let current_id = match current_id {
            Some(id) if active => id,
            _ => {
                inner.set_queue(tracks, 0).await;
                return;
            }
        };

        if !tracks.iter().any(|track| track.id == current_id) {
            debug!(track_id = %current_id, "Current track removed, restarting queue");
            inner.set_queue(tracks, 0).await;
            return;
        }

        let (length, current_index) = {
            let mut queue = inner.queue.lock();
            queue.splice_preserving_current(tracks);
            (queue.len(), queue.current_index().unwrap_or(0))
        };
        inner.emit(CoreEvent::Queue(QueueEvent::Reordered {
            length,
            current_index,
        }));
        inner.warm_lookahead();
        inner.publish();

        if !inner.session.ensure_healthy().await {
            warn!(track_id = %current_id, "Live handle lost its media, reloading");
            inner.play_current(true).await;
        }
    }

    /// Jump to `index`. Out-of-range indices are ignored.
    pub async fn play_at_index(&self, index: usize) {
        let inner = &self.inner;
        if inner.is_disposed() {
            return;
        }
        if !inner.queue.lock().set_current(index) {
            debug!(index, "Index out of range");
            return;
        }
        inner.emit(CoreEvent::Queue(QueueEvent::IndexChanged {
            current_index: index,
        }));
        inner.play_current(false).await;
    }

    /// Play `track` now: jump to it when queued, otherwise append and play it.
    pub async fn play_track(&self, track: TrackDescriptor) {
        let inner = &self.inner;
        if inner.is_disposed() {
            return;
        }

        let (index, appended) = {
            let mut queue = inner.queue.lock();
            match queue.position_of(&track.id) {
                Some(index) => {
                    queue.set_current(index);
                    (index, None)
                }
                None => {
                    let track_id = track.id.clone();
                    let index = queue.append(track);
                    queue.set_current(index);
                    (index, Some(track_id))
                }
            }
        };

        if let Some(track_id) = appended {
            inner.emit(CoreEvent::Queue(QueueEvent::TrackAppended { track_id, index }));
        }
        inner.emit(CoreEvent::Queue(QueueEvent::IndexChanged {
            current_index: index,
        }));
        inner.play_current(false).await;
    }

    /// Map raw catalog records and start playing them.
    pub async fn play_records(&self, records: &[CatalogTrack], start_index: usize) {
        let tracks = records.iter().map(resolve_track).collect();
        self.set_queue(tracks, start_index).await;
    }

    /// Map a raw catalog record and play it now.
    pub async fn play_record(&self, record: &CatalogTrack) {
        self.play_track(resolve_track(record)).await;
    }

    /// Append without changing what is playing.
    pub async fn add_to_queue(&self, track: TrackDescriptor) {
        let inner = &self.inner;
        if inner.is_disposed() {
            return;
        }
        let track_id = track.id.clone();
        let index = inner.queue.lock().append(track);
        inner.emit(CoreEvent::Queue(QueueEvent::TrackAppended { track_id, index }));
        inner.warm_lookahead();
        inner.publish();
    }

    /// Empty the queue and release the live handle.
    pub async fn clear_queue(&self) {
        if self.inner.is_disposed() {
            return;
        }
        self.inner.clear_queue().await;
    }

    /// Advance according to shuffle and repeat. At the end of a
    /// non-repeating queue nothing happens.
    pub async fn next(&self) {
        self.inner.next().await;
    }

    /// Restart the current track when past the restart threshold, otherwise
    /// move to the previous list position.
    pub async fn previous(&self) {
        let inner = &self.inner;
        if inner.is_disposed() || inner.queue.lock().is_empty() {
            return;
        }

        if inner.session.has_live()
            && inner.session.position_ms() > inner.config.restart_threshold_ms()
        {
            debug!("Past restart threshold, seeking to start");
            inner.session.seek(0).await;
            return;
        }

        let index = {
            let mut queue = inner.queue.lock();
            let Some(index) = queue.compute_prev_index() else {
                return;
            };
            queue.set_current(index);
            index
        };
        inner.emit(CoreEvent::Queue(QueueEvent::IndexChanged {
            current_index: index,
        }));
        inner.play_current(false).await;
    }

    pub async fn toggle_play_pause(&self) {
        if self.inner.is_disposed() {
            return;
        }
        if self.inner.session.toggle_play_pause().await.is_none() {
            debug!("Nothing loaded to toggle");
        }
    }

    pub async fn seek(&self, position_ms: u64) {
        if self.inner.is_disposed() {
            return;
        }
        self.inner.session.seek(position_ms).await;
    }

    /// Flip shuffle. Ignored on an empty queue.
    pub fn toggle_shuffle(&self) {
        let inner = &self.inner;
        if inner.is_disposed() {
            return;
        }
        let enabled = {
            let mut queue = inner.queue.lock();
            if queue.is_empty() {
                return;
            }
            queue.toggle_shuffle()
        };
        inner.emit(CoreEvent::Queue(QueueEvent::ShuffleChanged { enabled }));
        inner.warm_lookahead();
        inner.publish();
    }

    /// `off → all → one → off`.
    pub fn cycle_repeat(&self) {
        let inner = &self.inner;
        if inner.is_disposed() {
            return;
        }
        let mode = inner.queue.lock().cycle_repeat();
        inner.emit(CoreEvent::Queue(QueueEvent::RepeatChanged { mode: mode.into() }));
        inner.warm_lookahead();
        inner.publish();
    }

    /// Release the live handle and every preloaded handle. Later calls on
    /// this engine are no-ops.
    pub async fn dispose(&self) {
        let inner = &self.inner;
        if inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Disposing playback engine");
        inner.session.dispose().await;
        inner.cache.release_all().await;
        inner.queue.lock().clear();
        inner.publish();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }
}

impl std::fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("session", &self.inner.session)
            .field("cache", &self.inner.cache)
            .field("disposed", &self.inner.is_disposed())
            .finish()
    }
}

/// Identifies the handle whose natural finish is being handled.
struct FinishedTrack {
    generation: u64,
    track_id: String,
}

impl EngineInner {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    async fn set_queue(self: &Arc<Self>, tracks: Vec<TrackDescriptor>, start_index: usize) {
        if self.is_disposed() || tracks.is_empty() {
            return;
        }
        let (length, current_index) = {
            let mut queue = self.queue.lock();
            queue.replace(tracks, start_index);
            (queue.len(), queue.current_index().unwrap_or(0))
        };
        self.emit(CoreEvent::Queue(QueueEvent::Replaced {
            length,
            current_index,
        }));
        self.play_current(false).await;
    }

    async fn clear_queue(&self) {
        self.queue.lock().clear();
        self.session.stop().await;
        self.emit(CoreEvent::Queue(QueueEvent::Cleared));
        self.publish();
    }

    async fn next(self: &Arc<Self>) {
        self.advance(None).await;
    }

    /// Move to the next index. With `finished` set the move only happens if
    /// nothing else changed the current track since that track ended.
    async fn advance(self: &Arc<Self>, finished: Option<&FinishedTrack>) {
        if self.is_disposed() {
            return;
        }

        let index = {
            let mut queue = self.queue.lock();
            if let Some(finished) = finished {
                if !self.still_playing(&queue, finished) {
                    debug!(track_id = %finished.track_id, "Skipping advance for superseded finish");
                    return;
                }
            }
            let mut rng = self.rng.lock();
            let (Some(current), Some(next)) =
                (queue.current_index(), queue.compute_next_index(&mut *rng))
            else {
                return;
            };
            if next == current && queue.repeat_mode() == RepeatMode::Off {
                debug!("End of queue");
                return;
            }
            queue.set_current(next);
            next
        };

        self.emit(CoreEvent::Queue(QueueEvent::IndexChanged {
            current_index: index,
        }));
        self.play_current(false).await;
    }

    /// Play whatever the queue points at and warm its neighbours.
    async fn play_current(self: &Arc<Self>, force_restart: bool) {
        let Some(track) = self.queue.lock().current().cloned() else {
            return;
        };

        self.warm_lookahead();
        self.publish();

        let report = self.session.play(&track, force_restart).await;
        if let Some(listen) = report.ended_listen {
            self.record_listen(listen);
        }
        if report.outcome == PlayOutcome::Superseded {
            debug!(track_id = %track.id, "Play request superseded");
        }
        self.publish();
    }

    fn warm_lookahead(self: &Arc<Self>) {
        if !self.config.preload_enabled || self.is_disposed() {
            return;
        }

        let targets: Vec<(String, String)> = {
            let queue = self.queue.lock();
            let current_id = queue.current().map(|track| track.id.clone());
            queue
                .lookahead_indices(self.config.lookahead_ahead, self.config.lookahead_behind)
                .into_iter()
                .filter_map(|index| queue.get(index))
                .filter(|track| current_id.as_deref() != Some(track.id.as_str()))
                .map(|track| (track.id.clone(), track.audio_uri.clone()))
                .collect()
        };

        for (track_id, audio_uri) in targets {
            if self.cache.contains(&track_id) || self.cache.is_in_flight(&track_id) {
                continue;
            }
            let cache = self.cache.clone();
            spawn_detached(async move {
                cache.warm(&track_id, &audio_uri).await;
            });
        }
    }

    fn handle_status(self: Arc<Self>, generation: u64, status: PlayerStatus) {
        let disposition = self.session.apply_status(generation, status);
        match disposition {
            StatusDisposition::Ignored => {}
            StatusDisposition::Updated => self.publish(),
            StatusDisposition::Finished { generation, listen } => {
                self.publish();
                let inner = self.clone();
                let spawned = spawn_detached(async move {
                    inner.on_natural_finish(generation, listen).await;
                });
                if !spawned {
                    warn!("No runtime to advance after track finished");
                    self.session.finish_transition(generation);
                }
            }
        }
    }

    async fn on_natural_finish(self: Arc<Self>, generation: u64, listen: ListenRecord) {
        info!(track_id = %listen.track_id, "Track finished");
        self.emit(CoreEvent::Playback(PlaybackEvent::Completed {
            track_id: listen.track_id.clone(),
        }));
        let finished = FinishedTrack {
            generation,
            track_id: listen.track_id.clone(),
        };
        self.record_listen(listen);

        let repeat = {
            let queue = self.queue.lock();
            self.still_playing(&queue, &finished)
                .then(|| queue.repeat_mode())
        };
        match repeat {
            Some(RepeatMode::One) => {
                self.session.restart_live(generation).await;
            }
            Some(_) => self.advance(Some(&finished)).await,
            None => {
                debug!(track_id = %finished.track_id, "Playback moved on before finish was handled");
            }
        }
        self.session.finish_transition(generation);
        self.publish();
    }

    /// The finished handle is still live and the queue still points at it.
    fn still_playing(&self, queue: &PlayQueue, finished: &FinishedTrack) -> bool {
        queue.current().map(|track| track.id.as_str()) == Some(finished.track_id.as_str())
            && self.session.is_live_generation(finished.generation)
    }

    fn record_listen(&self, listen: ListenRecord) {
        let history = self.history.clone();
        let events = self.events.clone();
        let spawned = spawn_detached(async move {
            let ListenRecord {
                track_id,
                listened_ms,
            } = listen;
            let event = match history.record_play(&track_id, listened_ms).await {
                Ok(()) => {
                    debug!(%track_id, listened_ms, "Play recorded");
                    HistoryEvent::PlayRecorded {
                        track_id,
                        listened_ms,
                    }
                }
                Err(err) => {
                    let err = PlaybackError::history_failed(&track_id, err);
                    warn!(error = %err, "Failed to record play");
                    HistoryEvent::RecordFailed {
                        track_id,
                        message: err.to_string(),
                    }
                }
            };
            events.publish(CoreEvent::History(event));
        });
        if !spawned {
            warn!("No runtime to record play history");
        }
    }

    fn snapshot(&self) -> PlayerSnapshot {
        let (queue, current_index, current_track, shuffle_enabled, repeat_mode) = {
            let queue = self.queue.lock();
            (
                queue.tracks().to_vec(),
                queue.current_index(),
                queue.current().cloned(),
                queue.shuffle_enabled(),
                queue.repeat_mode(),
            )
        };
        let session = self.session.snapshot();

        PlayerSnapshot {
            current_track,
            is_playing: session.is_playing,
            is_loading: session.is_loading,
            position_ms: session.position_ms,
            duration_ms: session.duration_ms,
            queue,
            current_index,
            shuffle_enabled,
            repeat_mode,
            phase: session.phase,
        }
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }

    fn emit(&self, event: CoreEvent) {
        self.events.publish(event);
    }
}

/// Spawn onto the ambient runtime. Returns `false` outside a runtime.
fn spawn_detached<F>(future: F) -> bool
where
    F: Future<Output = ()> + Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn(future);
            true
        }
        Err(_) => false,
    }
}
