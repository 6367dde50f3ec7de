//! Player resource bridge traits and supporting status types.
//!
//! These abstractions let the core playback engine drive a platform media
//! player (AVPlayer, ExoPlayer, an HTML audio element, a desktop decoder) without
//! knowing how it is implemented. Host applications provide a
//! [`PlayerFactory`] that turns an audio URI into a ready [`PlayerResource`].
//!
//! A resource reports progress through a [`StatusCallback`] at a fixed polling
//! interval and immediately on terminal events (natural finish, unload).

use crate::{error::Result, platform::PlatformSendSync};
use std::sync::Arc;
use std::time::Duration;

/// Default interval between periodic status callbacks.
pub const DEFAULT_PROGRESS_UPDATE_INTERVAL: Duration = Duration::from_millis(500);

/// Snapshot of a player resource as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlayerStatus {
    /// Whether the resource has media loaded and can be controlled.
    pub is_loaded: bool,
    /// Whether audio is currently being produced.
    pub is_playing: bool,
    /// Current position in milliseconds.
    pub position_ms: u64,
    /// Total duration in milliseconds, when known.
    pub duration_ms: Option<u64>,
    /// Set on the single status update emitted when the track reached its
    /// end without a manual skip.
    pub did_just_finish: bool,
}

impl PlayerStatus {
    /// Status of a resource that has nothing loaded.
    pub fn unloaded() -> Self {
        Self::default()
    }

    /// Status of a loaded resource at the given position.
    pub fn loaded(is_playing: bool, position_ms: u64, duration_ms: Option<u64>) -> Self {
        Self {
            is_loaded: true,
            is_playing,
            position_ms,
            duration_ms,
            did_just_finish: false,
        }
    }

    /// Status emitted once when playback reaches the end of the track.
    pub fn finished(duration_ms: u64) -> Self {
        Self {
            is_loaded: true,
            is_playing: false,
            position_ms: duration_ms,
            duration_ms: Some(duration_ms),
            did_just_finish: true,
        }
    }
}

/// Options supplied when constructing a player resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerOptions {
    /// Start producing audio as soon as the resource is ready.
    pub autoplay: bool,
    /// Interval between periodic status callbacks.
    pub progress_update_interval: Duration,
}

impl PlayerOptions {
    /// Options for a foreground load that should start playing immediately.
    pub fn autoplay() -> Self {
        Self {
            autoplay: true,
            ..Self::default()
        }
    }

    /// Options for a speculative preload that stays paused.
    pub fn paused() -> Self {
        Self::default()
    }

    /// Override the status callback interval.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_update_interval = interval;
        self
    }
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            autoplay: false,
            progress_update_interval: DEFAULT_PROGRESS_UPDATE_INTERVAL,
        }
    }
}

/// Callback invoked by a resource whenever its status changes.
///
/// Implementations must not call the callback while holding locks the core
/// might need, and must stop invoking a callback once it has been replaced or
/// cleared through [`PlayerResource::set_status_callback`].
pub type StatusCallback = Arc<dyn Fn(PlayerStatus) + Send + Sync>;

/// A single platform player handle bound to one audio URI.
///
/// The core owns each handle exclusively: either the preload cache holds it, or
/// the playback session drives it as the live resource. `release` is called
/// exactly once per handle.
#[async_trait::async_trait]
pub trait PlayerResource: PlatformSendSync {
    /// Start or resume audio output.
    async fn play(&self) -> Result<()>;

    /// Pause audio output, keeping the position.
    async fn pause(&self) -> Result<()>;

    /// Move to an absolute position in milliseconds.
    async fn seek(&self, position_ms: u64) -> Result<()>;

    /// Query the current status.
    async fn status(&self) -> Result<PlayerStatus>;

    /// Unload the media and free platform resources.
    async fn release(&self) -> Result<()>;

    /// Attach, replace or (with `None`) detach the status callback.
    fn set_status_callback(&self, callback: Option<StatusCallback>);
}

/// Constructs player resources for audio URIs.
#[async_trait::async_trait]
pub trait PlayerFactory: PlatformSendSync {
    /// Load `audio_uri` and return a handle once it is ready to play.
    ///
    /// With `options.autoplay` the handle is already producing audio when the
    /// future resolves; otherwise it is paused at position zero.
    async fn create(&self, audio_uri: &str, options: PlayerOptions)
        -> Result<Arc<dyn PlayerResource>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_options_defaults() {
        let opts = PlayerOptions::default();
        assert!(!opts.autoplay);
        assert_eq!(opts.progress_update_interval, Duration::from_millis(500));

        let opts = PlayerOptions::autoplay().with_progress_interval(Duration::from_millis(250));
        assert!(opts.autoplay);
        assert_eq!(opts.progress_update_interval, Duration::from_millis(250));
    }

    #[test]
    fn finished_status_is_loaded_and_stopped() {
        let status = PlayerStatus::finished(180_000);
        assert!(status.is_loaded);
        assert!(!status.is_playing);
        assert!(status.did_just_finish);
        assert_eq!(status.position_ms, 180_000);
        assert_eq!(status.duration_ms, Some(180_000));
    }

    #[test]
    fn unloaded_status() {
        let status = PlayerStatus::unloaded();
        assert!(!status.is_loaded);
        assert!(!status.did_just_finish);
    }
}
