//! # Playback Error Types
//!
//! None of these cross the public engine API: the engine logs them, publishes
//! a [`PlaybackEvent::Error`](core_runtime::events::PlaybackEvent::Error) or
//! [`HistoryEvent::RecordFailed`](core_runtime::events::HistoryEvent::RecordFailed)
//! where the presentation layer should know, and leaves prior playback
//! untouched. Only [`PlaybackEngine::new`](crate::PlaybackEngine::new) returns
//! them directly.

use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlaybackError {
    /// Constructing a player resource for the track failed.
    #[error("Failed to load track {track_id}: {source}")]
    LoadFailed {
        track_id: String,
        #[source]
        source: BridgeError,
    },

    /// Reporting a listen to the history collaborator failed. Not retried.
    #[error("Failed to record play for {track_id}: {source}")]
    HistoryFailed {
        track_id: String,
        #[source]
        source: BridgeError,
    },

    #[error("Invalid playback configuration: {0}")]
    InvalidConfig(String),
}

impl PlaybackError {
    pub fn load_failed(track_id: &str, source: BridgeError) -> Self {
        PlaybackError::LoadFailed {
            track_id: track_id.to_string(),
            source,
        }
    }

    pub fn history_failed(track_id: &str, source: BridgeError) -> Self {
        PlaybackError::HistoryFailed {
            track_id: track_id.to_string(),
            source,
        }
    }

    /// Whether asking again later may succeed. A released handle or a
    /// missing capability will not recover on its own.
    pub fn is_transient(&self) -> bool {
        let source = match self {
            PlaybackError::LoadFailed { source, .. }
            | PlaybackError::HistoryFailed { source, .. } => source,
            PlaybackError::InvalidConfig(_) => return false,
        };
        matches!(
            source,
            BridgeError::LoadFailed { .. } | BridgeError::OperationFailed(_) | BridgeError::Io(_)
        )
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn load_failure_names_track_and_cause() {
        let err = PlaybackError::load_failed(
            "song-1",
            BridgeError::LoadFailed {
                uri: "https://cdn/a.mp3".to_string(),
                message: "timeout".to_string(),
            },
        );
        assert!(err.is_transient());
        assert!(err.to_string().contains("song-1"));
        assert!(err.to_string().contains("timeout"));
        assert!(err.source().is_some());
    }

    #[test]
    fn unavailable_capability_is_permanent() {
        let err = PlaybackError::load_failed(
            "song-2",
            BridgeError::NotAvailable("audio output".to_string()),
        );
        assert!(!err.is_transient());
        assert!(!PlaybackError::load_failed("song-2", BridgeError::Released).is_transient());
        assert!(!PlaybackError::InvalidConfig("capacity".to_string()).is_transient());
    }

    #[test]
    fn history_failures_are_transient() {
        let err = PlaybackError::history_failed(
            "song-3",
            BridgeError::OperationFailed("HTTP 503".to_string()),
        );
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "Failed to record play for song-3: Bridge operation failed: HTTP 503");
    }
}
