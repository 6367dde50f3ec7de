//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (player factory,
//! play history, clock, logger sink) into the playback core and hands the
//! host a single [`CoreService`] to drive. Hosts build a
//! [`CoreConfig`](core_runtime::config::CoreConfig) with their bridges, pick a
//! [`PlaybackConfig`], and call [`CoreService::bootstrap`].
//!
//! ```ignore
//! use core_service::{CoreService, PlaybackConfig};
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .player_factory(Arc::new(NativePlayerFactory::new()))
//!     .play_history(Arc::new(RestPlayHistory::new(api)))
//!     .build()?;
//! let core = CoreService::bootstrap(config, PlaybackConfig::default(), None)?;
//!
//! core.playback().play_records(&records, 0).await;
//! ```

pub mod error;

pub use core_playback::{PlaybackConfig, PlaybackEngine, PlayerSnapshot};
pub use core_runtime::logging::LoggingConfig;
pub use error::{CoreError, Result};

use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream};
use core_runtime::logging::init_logging;
use std::sync::Arc;
use tracing::{info, warn};

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    config: Arc<CoreConfig>,
    events: EventBus,
    playback: PlaybackEngine,
}

impl CoreService {
    /// Validate the configuration and construct the playback engine.
    ///
    /// When `logging` is given the global subscriber is installed first. A
    /// subscriber that is already installed is kept and reported as a
    /// warning, so repeated bootstraps in one process stay usable.
    pub fn bootstrap(
        config: CoreConfig,
        playback: PlaybackConfig,
        logging: Option<LoggingConfig>,
    ) -> Result<Self> {
        if let Some(logging) = logging {
            match init_logging(logging) {
                Ok(()) => {}
                Err(core_runtime::Error::LoggingInit(reason)) => {
                    warn!(%reason, "Logging already initialised, keeping existing subscriber");
                }
                Err(err) => return Err(err.into()),
            }
        }

        config.validate()?;
        playback
            .validate()
            .map_err(|err| CoreError::InitializationFailed(err.to_string()))?;

        let events = EventBus::new(config.event_buffer_size);
        let engine = PlaybackEngine::new(&config, playback, events.clone())?;

        info!(
            preload_capacity = engine.config().preload_capacity,
            preload_enabled = engine.config().preload_enabled,
            "Core service ready"
        );

        Ok(Self {
            config: Arc::new(config),
            events,
            playback: engine,
        })
    }

    /// The playback engine driven by the presentation layer.
    pub fn playback(&self) -> &PlaybackEngine {
        &self.playback
    }

    /// Subscribe to every core event.
    pub fn subscribe_events(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Bridges and runtime settings the service was built with.
    pub fn config(&self) -> Arc<CoreConfig> {
        Arc::clone(&self.config)
    }

    /// Release every player handle. The service is inert afterwards.
    pub async fn shutdown(&self) {
        info!("Shutting down core service");
        self.playback.dispose().await;
    }
}

impl std::fmt::Debug for CoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("config", &self.config)
            .field("playback", &self.playback)
            .finish()
    }
}
