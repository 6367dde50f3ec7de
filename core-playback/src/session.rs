//! # Playback Session
//!
//! Owns the single live player handle and guarantees that asynchronous load
//! completions arriving out of order never produce the wrong audible output.
//!
//! ## Race protocol
//!
//! Every [`PlaybackSession::play`] call synchronously records the requested
//! track id together with a fresh request ticket before its first suspension
//! point. Each async completion re-checks both against the session state; on
//! mismatch the completion is discarded and the handle it produced is
//! released. The last request always wins, including repeated requests for
//! the same id.
//!
//! Status callbacks are tagged with the attachment generation of the handle
//! they were attached to. Updates from any generation other than the live one
//! are ignored, and callbacks are detached before a handle is released.

use crate::error::PlaybackError;
use crate::preload::PreloadCache;
use crate::track::TrackDescriptor;
use bridge_traits::{
    Clock, PlayerFactory, PlayerOptions, PlayerResource, PlayerStatus, StatusCallback,
};
use chrono::{DateTime, Utc};
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use core_runtime::logging::redact_uri;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Receives every status update together with the generation it belongs to.
pub type StatusSink = Arc<dyn Fn(u64, PlayerStatus) + Send + Sync>;

/// Notified after the session state changed.
pub type ChangeSink = Arc<dyn Fn() + Send + Sync>;

/// Externally visible playback phase. Load failures return to `Idle`; there
/// is no separate error phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionPhase {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
}

/// How a [`PlaybackSession::play`] call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// The requested track was already live and was rewound in place.
    Restarted,
    /// A preloaded handle was promoted to live.
    PromotedFromCache,
    /// A new handle was created and became live.
    Loaded,
    /// A newer request took over before this one finished.
    Superseded,
    /// The handle could not be created.
    Failed,
    /// The session has been disposed.
    Disposed,
}

/// A finished listen, ready to be reported to the history collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenRecord {
    pub track_id: String,
    pub listened_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayReport {
    pub outcome: PlayOutcome,
    /// The listen that ended because a different track was requested.
    pub ended_listen: Option<ListenRecord>,
}

impl PlayReport {
    fn new(outcome: PlayOutcome, ended_listen: Option<ListenRecord>) -> Self {
        Self {
            outcome,
            ended_listen,
        }
    }
}

/// What a status update did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusDisposition {
    /// Stale generation, unloaded resource, or disposed session.
    Ignored,
    Updated,
    /// The live track finished naturally. The caller owns the transition
    /// until it calls [`PlaybackSession::finish_transition`] with the same
    /// generation.
    Finished {
        generation: u64,
        listen: ListenRecord,
    },
}

/// Read-only copy of the session state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub live_track: Option<TrackDescriptor>,
    pub pending_track_id: Option<String>,
    pub phase: SessionPhase,
    pub is_playing: bool,
    pub is_loading: bool,
    pub position_ms: u64,
    pub duration_ms: Option<u64>,
}

struct LiveResource {
    track: TrackDescriptor,
    resource: Arc<dyn PlayerResource>,
    generation: u64,
}

struct PendingRequest {
    track_id: String,
    ticket: u64,
}

#[derive(Default)]
struct SessionState {
    live: Option<LiveResource>,
    pending: Option<PendingRequest>,
    next_ticket: u64,
    next_generation: u64,
    is_playing: bool,
    is_loading: bool,
    position_ms: u64,
    duration_ms: Option<u64>,
    listen_started_at: Option<DateTime<Utc>>,
    transitioning: bool,
    disposed: bool,
}

impl SessionState {
    fn is_current(&self, track_id: &str, ticket: u64) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|pending| pending.ticket == ticket && pending.track_id == track_id)
    }

    fn phase(&self) -> SessionPhase {
        if self.is_loading {
            SessionPhase::Loading
        } else if self.live.is_none() {
            SessionPhase::Idle
        } else if self.is_playing {
            SessionPhase::Playing
        } else {
            SessionPhase::Paused
        }
    }

    fn make_live(
        &mut self,
        track: &TrackDescriptor,
        resource: Arc<dyn PlayerResource>,
        generation: u64,
        now: DateTime<Utc>,
    ) {
        self.live = Some(LiveResource {
            track: track.clone(),
            resource,
            generation,
        });
        self.is_loading = false;
        self.is_playing = true;
        self.position_ms = 0;
        self.duration_ms = track.duration_hint_secs.map(|secs| u64::from(secs) * 1_000);
        self.listen_started_at = Some(now);
        self.transitioning = false;
    }

    /// Detach the live handle, closing its listen when `closing_for` names a
    /// different track.
    fn take_live(
        &mut self,
        closing_for: Option<&str>,
        clock: &dyn Clock,
    ) -> (Option<Arc<dyn PlayerResource>>, Option<ListenRecord>) {
        let Some(live) = self.live.take() else {
            return (None, None);
        };

        let started_at = self.listen_started_at.take();
        let ended_listen = match (closing_for, started_at) {
            (Some(next_id), Some(started_at)) if next_id != live.track.id => {
                Some(ListenRecord {
                    track_id: live.track.id.clone(),
                    listened_ms: clock.millis_since(started_at),
                })
            }
            _ => None,
        };

        self.is_playing = false;
        self.position_ms = 0;
        self.duration_ms = None;
        self.transitioning = false;

        (Some(live.resource), ended_listen)
    }
}

pub struct PlaybackSession {
    factory: Arc<dyn PlayerFactory>,
    cache: Arc<PreloadCache>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    options: PlayerOptions,
    on_status: StatusSink,
    on_change: ChangeSink,
    state: Mutex<SessionState>,
}

impl PlaybackSession {
    pub fn new(
        factory: Arc<dyn PlayerFactory>,
        cache: Arc<PreloadCache>,
        clock: Arc<dyn Clock>,
        events: EventBus,
        options: PlayerOptions,
        on_status: StatusSink,
        on_change: ChangeSink,
    ) -> Self {
        Self {
            factory,
            cache,
            clock,
            events,
            options: PlayerOptions {
                autoplay: true,
                ..options
            },
            on_status,
            on_change,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock();
        SessionSnapshot {
            live_track: state.live.as_ref().map(|live| live.track.clone()),
            pending_track_id: state.pending.as_ref().map(|pending| pending.track_id.clone()),
            phase: state.phase(),
            is_playing: state.is_playing,
            is_loading: state.is_loading,
            position_ms: state.position_ms,
            duration_ms: state.duration_ms,
        }
    }

    pub fn live_track_id(&self) -> Option<String> {
        self.state.lock().live.as_ref().map(|live| live.track.id.clone())
    }

    pub fn pending_track_id(&self) -> Option<String> {
        self.state.lock().pending.as_ref().map(|pending| pending.track_id.clone())
    }

    pub fn has_live(&self) -> bool {
        self.state.lock().live.is_some()
    }

    pub fn position_ms(&self) -> u64 {
        self.state.lock().position_ms
    }

    /// Make `track` the live track.
    ///
    /// Re-requesting the live track rewinds it in place unless
    /// `force_restart` is set. Otherwise the previous handle is detached and
    /// released, then a preloaded handle is promoted or a new one is created.
    #[instrument(skip(self, track), fields(track_id = %track.id))]
    pub async fn play(&self, track: &TrackDescriptor, force_restart: bool) -> PlayReport {
        let (ticket, same_live) = {
            let mut state = self.state.lock();
            if state.disposed {
                return PlayReport::new(PlayOutcome::Disposed, None);
            }
            let ticket = state.next_ticket;
            state.next_ticket += 1;
            state.pending = Some(PendingRequest {
                track_id: track.id.clone(),
                ticket,
            });
            let same_live = state
                .live
                .as_ref()
                .filter(|live| live.track.id == track.id && !force_restart)
                .map(|live| live.resource.clone());
            (ticket, same_live)
        };

        if let Some(resource) = same_live {
            if self.restart_in_place(&resource, &track.id, ticket).await {
                return PlayReport::new(PlayOutcome::Restarted, None);
            }
            debug!("Live handle unhealthy, reloading");
        }

        // Detach and release the previous handle.
        let (old, ended_listen) = {
            let mut state = self.state.lock();
            if !state.is_current(&track.id, ticket) {
                return PlayReport::new(PlayOutcome::Superseded, None);
            }
            state.take_live(Some(&track.id), self.clock.as_ref())
        };
        if let Some(old) = old {
            release_detached(old).await;
        }

        if let Some(resource) = self.cache.take(&track.id) {
            let generation = self.attach(&resource);
            let promoted = {
                let mut state = self.state.lock();
                if state.is_current(&track.id, ticket) {
                    state.make_live(track, resource.clone(), generation, self.clock.now());
                    true
                } else {
                    false
                }
            };

            if !promoted {
                debug!("Preloaded handle superseded before promotion");
                release_detached(resource).await;
                return PlayReport::new(PlayOutcome::Superseded, ended_listen);
            }

            if let Err(err) = resource.seek(0).await {
                debug!(error = %err, "Seek on promoted handle failed");
            }
            if let Err(err) = resource.play().await {
                warn!(error = %err, "Play on promoted handle failed");
            }
            info!("Promoted preloaded handle");
            self.emit_started(track);
            (self.on_change)();
            return PlayReport::new(PlayOutcome::PromotedFromCache, ended_listen);
        }

        {
            let mut state = self.state.lock();
            if !state.is_current(&track.id, ticket) {
                return PlayReport::new(PlayOutcome::Superseded, ended_listen);
            }
            state.is_loading = true;
            state.is_playing = false;
        }
        (self.on_change)();

        debug!(uri = redact_uri(&track.audio_uri), "Loading track");
        let created = self.factory.create(&track.audio_uri, self.options).await;

        let resource = match created {
            Ok(resource) => resource,
            Err(err) => {
                let current = {
                    let mut state = self.state.lock();
                    let current = state.is_current(&track.id, ticket);
                    if current {
                        state.pending = None;
                        state.is_loading = false;
                        state.is_playing = false;
                    }
                    current
                };

                if !current {
                    debug!(error = %err, "Superseded load failed");
                    return PlayReport::new(PlayOutcome::Superseded, ended_listen);
                }

                let err = PlaybackError::load_failed(&track.id, err);
                warn!(error = %err, "Failed to load track");
                self.emit(PlaybackEvent::Error {
                    track_id: Some(track.id.clone()),
                    message: err.to_string(),
                    recoverable: err.is_transient(),
                });
                (self.on_change)();
                return PlayReport::new(PlayOutcome::Failed, ended_listen);
            }
        };

        let generation = self.attach(&resource);
        let became_live = {
            let mut state = self.state.lock();
            if state.is_current(&track.id, ticket) {
                state.make_live(track, resource.clone(), generation, self.clock.now());
                true
            } else {
                false
            }
        };

        if !became_live {
            debug!("Discarding stale load");
            release_detached(resource).await;
            return PlayReport::new(PlayOutcome::Superseded, ended_listen);
        }

        info!("Track loaded");
        self.emit_started(track);
        (self.on_change)();
        PlayReport::new(PlayOutcome::Loaded, ended_listen)
    }

    async fn restart_in_place(
        &self,
        resource: &Arc<dyn PlayerResource>,
        track_id: &str,
        ticket: u64,
    ) -> bool {
        match resource.status().await {
            Ok(status) if status.is_loaded => {}
            Ok(_) => return false,
            Err(err) => {
                debug!(error = %err, "Status query failed");
                return false;
            }
        }

        if let Err(err) = resource.seek(0).await {
            warn!(error = %err, "Seek to start failed");
            return false;
        }
        if let Err(err) = resource.play().await {
            warn!(error = %err, "Resume after restart failed");
            return false;
        }

        let track = {
            let mut state = self.state.lock();
            if !state.is_current(track_id, ticket) {
                // A newer request owns the handle now; report success so the
                // caller does not reload over it.
                return true;
            }
            let now = self.clock.now();
            state.position_ms = 0;
            state.is_playing = true;
            state.is_loading = false;
            state.listen_started_at = Some(now);
            state.live.as_ref().map(|live| live.track.clone())
        };

        debug!("Restarted live track in place");
        if let Some(track) = track {
            self.emit_started(&track);
        }
        (self.on_change)();
        true
    }

    /// Rewind the live track and keep playing, provided the handle with
    /// `generation` is still live. Used for repeat-one.
    pub async fn restart_live(&self, generation: u64) -> bool {
        let live = {
            let state = self.state.lock();
            state
                .live
                .as_ref()
                .filter(|live| live.generation == generation)
                .map(|live| (live.resource.clone(), live.track.clone()))
        };
        let Some((resource, track)) = live else {
            debug!(generation, "Live handle changed, skipping repeat");
            return false;
        };

        if let Err(err) = resource.seek(0).await {
            warn!(error = %err, "Seek to start failed");
            return false;
        }
        if let Err(err) = resource.play().await {
            warn!(error = %err, "Resume after repeat failed");
            return false;
        }

        {
            let mut state = self.state.lock();
            if state.live.as_ref().map(|live| live.generation) != Some(generation) {
                return false;
            }
            state.position_ms = 0;
            state.is_playing = true;
            state.listen_started_at = Some(self.clock.now());
        }

        self.emit_started(&track);
        (self.on_change)();
        true
    }

    /// Flip play/pause on the live handle. Returns the new playing state, or
    /// `None` when nothing loaded is live.
    pub async fn toggle_play_pause(&self) -> Option<bool> {
        let (resource, generation, track_id) = {
            let state = self.state.lock();
            let live = state.live.as_ref()?;
            (live.resource.clone(), live.generation, live.track.id.clone())
        };

        let status = match resource.status().await {
            Ok(status) if status.is_loaded => status,
            Ok(_) => return None,
            Err(err) => {
                debug!(error = %err, "Status query failed");
                return None;
            }
        };

        let result = if status.is_playing {
            resource.pause().await
        } else {
            resource.play().await
        };
        if let Err(err) = result {
            warn!(error = %err, "Play/pause failed");
            return None;
        }

        let now_playing = !status.is_playing;
        let position_ms = {
            let mut state = self.state.lock();
            if state.live.as_ref().map(|live| live.generation) != Some(generation) {
                return None;
            }
            state.is_playing = now_playing;
            state.position_ms = status.position_ms;
            state.position_ms
        };

        self.emit(if now_playing {
            PlaybackEvent::Resumed {
                track_id,
                position_ms,
            }
        } else {
            PlaybackEvent::Paused {
                track_id,
                position_ms,
            }
        });
        (self.on_change)();
        Some(now_playing)
    }

    /// Seek the live handle. No-op when nothing is live.
    pub async fn seek(&self, position_ms: u64) {
        let live = {
            let state = self.state.lock();
            state.live.as_ref().map(|live| (live.resource.clone(), live.generation))
        };
        let Some((resource, generation)) = live else {
            return;
        };

        if let Err(err) = resource.seek(position_ms).await {
            warn!(error = %err, position_ms, "Seek failed");
            return;
        }

        {
            let mut state = self.state.lock();
            if state.live.as_ref().map(|live| live.generation) == Some(generation) {
                state.position_ms = position_ms;
            }
        }
        (self.on_change)();
    }

    /// Whether the live handle still reports loaded media. `true` when
    /// nothing is live or a load is pending.
    pub async fn ensure_healthy(&self) -> bool {
        let resource = {
            let state = self.state.lock();
            if state.is_loading {
                return true;
            }
            match state.live.as_ref() {
                Some(live) => live.resource.clone(),
                None => return true,
            }
        };

        match resource.status().await {
            Ok(status) => status.is_loaded,
            Err(err) => {
                debug!(error = %err, "Health check failed");
                false
            }
        }
    }

    /// Apply a status update from the handle with the given generation.
    pub fn apply_status(&self, generation: u64, status: PlayerStatus) -> StatusDisposition {
        let mut state = self.state.lock();
        if state.disposed || !status.is_loaded {
            return StatusDisposition::Ignored;
        }
        let Some(track_id) = state
            .live
            .as_ref()
            .filter(|live| live.generation == generation)
            .map(|live| live.track.id.clone())
        else {
            return StatusDisposition::Ignored;
        };

        state.is_playing = status.is_playing;
        state.position_ms = status.position_ms;
        if status.duration_ms.is_some() {
            state.duration_ms = status.duration_ms;
        }

        if !status.did_just_finish || state.transitioning {
            return StatusDisposition::Updated;
        }

        state.transitioning = true;
        state.is_playing = false;
        let listened_ms = match state.listen_started_at.take() {
            Some(started_at) => self.clock.millis_since(started_at),
            None => status.position_ms,
        };

        StatusDisposition::Finished {
            generation,
            listen: ListenRecord {
                track_id,
                listened_ms,
            },
        }
    }

    /// Whether the handle attached with `generation` is still the live one.
    pub fn is_live_generation(&self, generation: u64) -> bool {
        self.state
            .lock()
            .live
            .as_ref()
            .is_some_and(|live| live.generation == generation)
    }

    /// End the transition opened by [`StatusDisposition::Finished`]. A
    /// handle made live since then has already reset the flag.
    pub fn finish_transition(&self, generation: u64) {
        let mut state = self.state.lock();
        if state.live.as_ref().map(|live| live.generation) == Some(generation) {
            state.transitioning = false;
        }
    }

    /// Release the live handle and invalidate any in-flight load.
    pub async fn stop(&self) {
        self.shut(false).await;
    }

    /// Stop and refuse further requests. The session is marked disposed
    /// before the live handle is released, so a load racing the release
    /// cannot become live.
    pub async fn dispose(&self) {
        self.shut(true).await;
    }

    async fn shut(&self, dispose: bool) {
        let (old, track_id) = {
            let mut state = self.state.lock();
            if dispose {
                state.disposed = true;
            }
            state.next_ticket += 1;
            state.pending = None;
            state.is_loading = false;
            let track_id = state.live.as_ref().map(|live| live.track.id.clone());
            let (old, _) = state.take_live(None, self.clock.as_ref());
            (old, track_id)
        };

        if let Some(old) = old {
            release_detached(old).await;
        }
        if let Some(track_id) = track_id {
            self.emit(PlaybackEvent::Stopped { track_id });
        }
        (self.on_change)();
    }

    fn attach(&self, resource: &Arc<dyn PlayerResource>) -> u64 {
        let generation = {
            let mut state = self.state.lock();
            state.next_generation += 1;
            state.next_generation
        };
        let sink = self.on_status.clone();
        let callback: StatusCallback = Arc::new(move |status| sink(generation, status));
        resource.set_status_callback(Some(callback));
        generation
    }

    fn emit_started(&self, track: &TrackDescriptor) {
        self.emit(PlaybackEvent::Started {
            track_id: track.id.clone(),
            title: track.title.clone(),
        });
    }

    fn emit(&self, event: PlaybackEvent) {
        self.events.publish(CoreEvent::Playback(event));
    }
}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PlaybackSession")
            .field("live", &state.live.as_ref().map(|live| &live.track.id))
            .field("pending", &state.pending.as_ref().map(|pending| &pending.track_id))
            .field("phase", &state.phase())
            .finish()
    }
}

async fn release_detached(resource: Arc<dyn PlayerResource>) {
    resource.set_status_callback(None);
    if let Err(err) = resource.release().await {
        warn!(error = %err, "Failed to release player handle");
    }
}
