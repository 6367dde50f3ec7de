//! # Core Configuration Module
//!
//! Provides configuration management for the playback core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the host bridges and runtime settings the core needs.
//! It enforces fail-fast validation so that a missing bridge is reported at
//! startup rather than on the first play request.
//!
//! ## Required Dependencies
//!
//! - `PlayerFactory` - Loads audio URIs into platform player handles
//! - `PlayHistory` - Receives "track played for N ms" reports
//!
//! ## Optional Dependencies (with defaults)
//!
//! - `Clock` - Wall-clock source for listen accounting (default: `SystemClock`)
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .player_factory(Arc::new(MyPlayerFactory))
//!     .play_history(Arc::new(MyRestHistory::new(api)))
//!     .event_buffer_size(256)
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // This will panic with an actionable error message
//! let config = CoreConfig::builder()
//!     .build()
//!     .expect("Should fail - missing required bridges");
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{Clock, PlayHistory, PlayerFactory, SystemClock};
use std::sync::Arc;

/// Upper bound for the event bus buffer.
const MAX_EVENT_BUFFER_SIZE: usize = 65_536;

/// Core configuration for the playback core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Factory for platform player handles (required)
    pub player_factory: Arc<dyn PlayerFactory>,

    /// Listening history sink (required)
    pub play_history: Arc<dyn PlayHistory>,

    /// Wall-clock source used for listen durations
    pub clock: Arc<dyn Clock>,

    /// Per-subscriber buffer of the event bus
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("player_factory", &"PlayerFactory { ... }")
            .field("play_history", &"PlayHistory { ... }")
            .field("clock", &"Clock { ... }")
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size > MAX_EVENT_BUFFER_SIZE {
            return Err(Error::Config(format!(
                "Event buffer size exceeds maximum of {}",
                MAX_EVENT_BUFFER_SIZE
            )));
        }

        Ok(())
    }
}

fn player_factory_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "PlayerFactory".to_string(),
        message: "PlayerFactory implementation is required to load audio. \
                 Mobile: inject an adapter over the native media player. \
                 Desktop: inject a decoder-backed factory. \
                 Tests: inject a fake factory."
            .to_string(),
    }
}

fn play_history_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "PlayHistory".to_string(),
        message: "PlayHistory implementation is required for listening history. \
                 Inject the catalog API client, or NoopPlayHistory to disable reporting."
            .to_string(),
    }
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    player_factory: Option<Arc<dyn PlayerFactory>>,
    play_history: Option<Arc<dyn PlayHistory>>,
    clock: Option<Arc<dyn Clock>>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the player factory.
    pub fn player_factory(mut self, factory: Arc<dyn PlayerFactory>) -> Self {
        self.player_factory = Some(factory);
        self
    }

    /// Sets the listening history sink.
    pub fn play_history(mut self, history: Arc<dyn PlayHistory>) -> Self {
        self.play_history = Some(history);
        self
    }

    /// Overrides the wall-clock source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the event bus buffer size.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A required bridge is missing
    /// - A setting is out of range
    pub fn build(self) -> Result<CoreConfig> {
        let player_factory = self
            .player_factory
            .ok_or_else(player_factory_missing_error)?;

        let play_history = self.play_history.ok_or_else(play_history_missing_error)?;

        let config = CoreConfig {
            player_factory,
            play_history,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{BridgeError, NoopPlayHistory, PlayerOptions, PlayerResource};

    struct MockPlayerFactory;

    #[async_trait]
    impl PlayerFactory for MockPlayerFactory {
        async fn create(
            &self,
            audio_uri: &str,
            _options: PlayerOptions,
        ) -> std::result::Result<Arc<dyn PlayerResource>, BridgeError> {
            Err(BridgeError::NotAvailable(audio_uri.to_string()))
        }
    }

    #[test]
    fn test_builder_requires_player_factory() {
        let result = CoreConfig::builder()
            .play_history(Arc::new(NoopPlayHistory))
            .build();

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("PlayerFactory"));
        assert!(err_msg.contains("load audio"));
    }

    #[test]
    fn test_builder_requires_play_history() {
        let result = CoreConfig::builder()
            .player_factory(Arc::new(MockPlayerFactory))
            .build();

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("PlayHistory"));
    }

    #[test]
    fn test_builder_with_all_required_fields() {
        let config = CoreConfig::builder()
            .player_factory(Arc::new(MockPlayerFactory))
            .play_history(Arc::new(NoopPlayHistory))
            .build()
            .unwrap();

        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
        assert!(config.clock.now().timestamp() > 0);
    }

    #[test]
    fn test_validate_rejects_zero_event_buffer() {
        let result = CoreConfig::builder()
            .player_factory(Arc::new(MockPlayerFactory))
            .play_history(Arc::new(NoopPlayHistory))
            .event_buffer_size(0)
            .build();

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_excessive_event_buffer() {
        let result = CoreConfig::builder()
            .player_factory(Arc::new(MockPlayerFactory))
            .play_history(Arc::new(NoopPlayHistory))
            .event_buffer_size(MAX_EVENT_BUFFER_SIZE + 1)
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("exceeds maximum"));
    }

    #[test]
    fn test_config_is_cloneable() {
        let config = CoreConfig::builder()
            .player_factory(Arc::new(MockPlayerFactory))
            .play_history(Arc::new(NoopPlayHistory))
            .event_buffer_size(32)
            .build()
            .unwrap();

        let cloned = config.clone();
        assert_eq!(cloned.event_buffer_size, 32);
        assert!(format!("{:?}", cloned).contains("event_buffer_size"));
    }
}
