//! # Event Bus System
//!
//! Provides an event-driven notification channel for the playback core using
//! `tokio::sync::broadcast`. Presentation layers subscribe to typed events
//! instead of polling the engine.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enums for playback, queue and history
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     emit      ┌───────────┐
//! │   Session   ├──────────────>│           │     subscribe    ┌────────────┐
//! └─────────────┘               │ EventBus  ├─────────────────>│ Now-playing│
//!                               │ (broadcast│                  └────────────┘
//! ┌─────────────┐     emit      │  channel) │     subscribe    ┌────────────┐
//! │   Engine    ├──────────────>│           ├─────────────────>│ Mini player│
//! └─────────────┘               └───────────┘                  └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Playback(PlaybackEvent::Started {
//!         track_id: "song-1".to_string(),
//!         title: "Intro".to_string(),
//!     }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Playback started");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! [`EventBus::emit`] reports a bus with no subscribers as `Err(SendError)`.
//! Publishers inside the core use [`EventBus::publish`], which treats that as
//! "nobody is listening" rather than a failure.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError, TryRecvError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Playback-related events
    Playback(PlaybackEvent),
    /// Queue-related events
    Queue(QueueEvent),
    /// Listening history events
    History(HistoryEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Playback(e) => e.description(),
            CoreEvent::Queue(e) => e.description(),
            CoreEvent::History(e) => e.description(),
        }
    }

    /// The track an event is about, when it names one.
    pub fn track_id(&self) -> Option<&str> {
        match self {
            CoreEvent::Playback(
                PlaybackEvent::Started { track_id, .. }
                | PlaybackEvent::Paused { track_id, .. }
                | PlaybackEvent::Resumed { track_id, .. }
                | PlaybackEvent::Stopped { track_id }
                | PlaybackEvent::Completed { track_id },
            ) => Some(track_id.as_str()),
            CoreEvent::Playback(PlaybackEvent::Error { track_id, .. }) => track_id.as_deref(),
            CoreEvent::Queue(QueueEvent::TrackAppended { track_id, .. }) => Some(track_id.as_str()),
            CoreEvent::History(
                HistoryEvent::PlayRecorded { track_id, .. }
                | HistoryEvent::RecordFailed { track_id, .. },
            ) => Some(track_id.as_str()),
            CoreEvent::Queue(_) => None,
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Playback(PlaybackEvent::Error { .. }) => EventSeverity::Error,
            CoreEvent::History(HistoryEvent::RecordFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Playback(PlaybackEvent::Started { .. }) => EventSeverity::Info,
            CoreEvent::Queue(QueueEvent::Replaced { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Playback Events
// ============================================================================

/// Events related to audio playback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// Playback of a track started (cold load, preload hit or restart).
    Started {
        /// The track ID being played.
        track_id: String,
        /// Track title.
        title: String,
    },
    /// Playback paused.
    Paused {
        track_id: String,
        /// Position when paused (milliseconds).
        position_ms: u64,
    },
    /// Playback resumed after pause.
    Resumed {
        track_id: String,
        /// Position when resumed (milliseconds).
        position_ms: u64,
    },
    /// Playback stopped and the live resource was released.
    Stopped {
        track_id: String,
    },
    /// Track finished playing naturally.
    Completed {
        track_id: String,
    },
    /// Loading a track failed. Prior playback, if any, is left untouched.
    Error {
        /// The track ID if available.
        track_id: Option<String>,
        /// Human-readable error message.
        message: String,
        /// Whether a later attempt may succeed.
        recoverable: bool,
    },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::Started { .. } => "Playback started",
            PlaybackEvent::Paused { .. } => "Playback paused",
            PlaybackEvent::Resumed { .. } => "Playback resumed",
            PlaybackEvent::Stopped { .. } => "Playback stopped",
            PlaybackEvent::Completed { .. } => "Track completed",
            PlaybackEvent::Error { .. } => "Playback error",
        }
    }
}

// ============================================================================
// Queue Events
// ============================================================================

/// Repeat mode as carried on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RepeatModeTag {
    Off,
    All,
    One,
}

/// Events related to the play queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum QueueEvent {
    /// Queue contents were replaced.
    Replaced {
        /// Number of tracks in the new queue.
        length: usize,
        /// Index that became current.
        current_index: usize,
    },
    /// Queue contents changed while the current track kept playing.
    Reordered {
        length: usize,
        current_index: usize,
    },
    /// A track was appended to the end of the queue.
    TrackAppended {
        track_id: String,
        index: usize,
    },
    /// Current position moved to another index.
    IndexChanged {
        current_index: usize,
    },
    /// Queue was emptied.
    Cleared,
    /// Shuffle flag changed.
    ShuffleChanged {
        enabled: bool,
    },
    /// Repeat mode changed.
    RepeatChanged {
        mode: RepeatModeTag,
    },
}

impl QueueEvent {
    fn description(&self) -> &str {
        match self {
            QueueEvent::Replaced { .. } => "Queue replaced",
            QueueEvent::Reordered { .. } => "Queue reordered",
            QueueEvent::TrackAppended { .. } => "Track appended to queue",
            QueueEvent::IndexChanged { .. } => "Queue position changed",
            QueueEvent::Cleared => "Queue cleared",
            QueueEvent::ShuffleChanged { .. } => "Shuffle toggled",
            QueueEvent::RepeatChanged { .. } => "Repeat mode changed",
        }
    }
}

// ============================================================================
// History Events
// ============================================================================

/// Events related to listening history reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum HistoryEvent {
    /// A listen was reported to the history collaborator.
    PlayRecorded {
        track_id: String,
        listened_ms: u64,
    },
    /// Reporting a listen failed. Never retried.
    RecordFailed {
        track_id: String,
        message: String,
    },
}

impl HistoryEvent {
    fn description(&self) -> &str {
        match self {
            HistoryEvent::PlayRecorded { .. } => "Play recorded",
            HistoryEvent::RecordFailed { .. } => "Play history record failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast channel shared by every publisher in the core.
///
/// Cloning is cheap and every clone publishes into the same channel. Each
/// subscriber has its own buffer of `capacity` events; a subscriber that
/// falls further behind sees `RecvError::Lagged` and then resumes with the
/// newest events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Send to every current subscriber. Fails only when there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Send and return how many subscribers received the event.
    pub fn publish(&self, event: CoreEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// New receiver for events emitted from now on. Past events are not
    /// replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Number of live receivers.
    ///
    /// ```rust
    /// use core_runtime::events::EventBus;
    ///
    /// let event_bus = EventBus::new(16);
    /// let _now_playing = event_bus.subscribe();
    /// assert_eq!(event_bus.subscriber_count(), 1);
    /// ```
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Receiver that only yields events accepted by every attached filter.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventSeverity, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let problems = EventStream::new(event_bus.subscribe())
///     .min_severity(EventSeverity::Warning);
/// let one_song = EventStream::new(event_bus.subscribe()).for_track("song-1");
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filters: Vec<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filters: Vec::new(),
        }
    }

    /// Keep only events matching `predicate`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filters.push(Box::new(predicate));
        self
    }

    /// Keep only events about `track_id`.
    pub fn for_track(self, track_id: impl Into<String>) -> Self {
        let track_id = track_id.into();
        self.filter(move |event| event.track_id() == Some(track_id.as_str()))
    }

    /// Keep only events at or above `severity`.
    pub fn min_severity(self, severity: EventSeverity) -> Self {
        self.filter(move |event| event.severity() >= severity)
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filters.iter().all(|filter| filter(event))
    }

    /// Wait for the next accepted event.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` when `n` events were dropped for this
    /// subscriber, `RecvError::Closed` once every publisher is gone.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Next accepted event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            let event = match self.receiver.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Lagged(n)) => return Some(Err(RecvError::Lagged(n))),
                Err(TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            };
            if self.accepts(&event) {
                return Some(Ok(event));
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("filters", &self.filters.len())
            .finish()
    }
}
