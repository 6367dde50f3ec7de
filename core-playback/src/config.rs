//! # Playback Configuration
//!
//! Tuning knobs for the playback engine: preload window, restart threshold,
//! status polling and shuffle determinism.

use crate::error::{PlaybackError, Result};
use bridge_traits::playback::DEFAULT_PROGRESS_UPDATE_INTERVAL;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on preloaded handles. Each one holds a decoder and a network
/// connection on the host side.
pub const MAX_PRELOAD_CAPACITY: usize = 32;

/// Playback engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Maximum number of paused, ready-to-play handles kept in the preload
    /// cache. The oldest insertion is evicted first.
    ///
    /// Default: 5.
    #[serde(default = "default_preload_capacity")]
    pub preload_capacity: usize,

    /// How many linear successors of the current index to warm.
    ///
    /// Default: 2.
    #[serde(default = "default_lookahead_ahead")]
    pub lookahead_ahead: usize,

    /// How many linear predecessors of the current index to warm.
    ///
    /// Default: 1.
    #[serde(default = "default_lookahead_behind")]
    pub lookahead_behind: usize,

    /// Whether speculative preloading is enabled at all.
    ///
    /// Default: true.
    #[serde(default = "default_preload_enabled")]
    pub preload_enabled: bool,

    /// Position past which `previous()` restarts the current track instead of
    /// moving back.
    ///
    /// Default: 3 seconds.
    #[serde(default = "default_restart_threshold")]
    pub restart_threshold: Duration,

    /// Interval requested from the host for periodic status callbacks.
    ///
    /// Default: 500 ms.
    #[serde(default = "default_progress_update_interval")]
    pub progress_update_interval: Duration,

    /// Seed for the shuffle generator. `None` seeds from OS entropy.
    #[serde(default)]
    pub shuffle_seed: Option<u64>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            preload_capacity: default_preload_capacity(),
            lookahead_ahead: default_lookahead_ahead(),
            lookahead_behind: default_lookahead_behind(),
            preload_enabled: default_preload_enabled(),
            restart_threshold: default_restart_threshold(),
            progress_update_interval: default_progress_update_interval(),
            shuffle_seed: None,
        }
    }
}

impl PlaybackConfig {
    /// Configuration for constrained devices: no speculative loads.
    pub fn low_memory() -> Self {
        Self {
            preload_capacity: 1,
            lookahead_ahead: 1,
            lookahead_behind: 0,
            preload_enabled: false,
            ..Default::default()
        }
    }

    /// Fix the shuffle seed so shuffle picks are reproducible.
    pub fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.preload_capacity == 0 {
            return Err(PlaybackError::InvalidConfig(
                "preload_capacity must be > 0".to_string(),
            ));
        }

        if self.preload_capacity > MAX_PRELOAD_CAPACITY {
            return Err(PlaybackError::InvalidConfig(format!(
                "preload_capacity cannot exceed {}",
                MAX_PRELOAD_CAPACITY
            )));
        }

        if self.preload_enabled && self.lookahead_ahead + self.lookahead_behind > self.preload_capacity
        {
            return Err(PlaybackError::InvalidConfig(
                "lookahead window cannot exceed preload_capacity".to_string(),
            ));
        }

        if self.progress_update_interval.is_zero() {
            return Err(PlaybackError::InvalidConfig(
                "progress_update_interval must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Restart threshold in milliseconds, as compared against reported positions.
    pub fn restart_threshold_ms(&self) -> u64 {
        self.restart_threshold.as_millis() as u64
    }
}

fn default_preload_capacity() -> usize {
    5
}

fn default_lookahead_ahead() -> usize {
    2
}

fn default_lookahead_behind() -> usize {
    1
}

fn default_preload_enabled() -> bool {
    true
}

fn default_restart_threshold() -> Duration {
    Duration::from_secs(3)
}

fn default_progress_update_interval() -> Duration {
    DEFAULT_PROGRESS_UPDATE_INTERVAL
}
