//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the playback core and the host
//! application. Each trait represents a capability the core requires but that
//! is implemented differently per platform (iOS, Android, desktop, web).
//!
//! ## Traits
//!
//! ### Media
//! - [`PlayerFactory`](playback::PlayerFactory) - Load an audio URI into a player handle
//! - [`PlayerResource`](playback::PlayerResource) - Play, pause, seek, query and release one handle
//!
//! ### Catalog
//! - [`PlayHistory`](catalog::PlayHistory) - Report "track played for N ms" events
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Wall-clock source for listen durations
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with descriptive errors when a required capability is
//! missing:
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .play_history(Arc::new(NoopPlayHistory))
//!     .build()?; // Error::CapabilityMissing { capability: "PlayerFactory", .. }
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Host
//! implementations should convert platform errors into it and include the
//! failing URI or track id where relevant.
//!
//! ## Thread Safety
//!
//! On native targets every bridge trait requires `Send + Sync` (see
//! [`platform::PlatformSendSync`]) so handles can be shared across async tasks.
//!
//! ## Examples
//!
//! ### Implementing PlayerFactory
//!
//! ```ignore
//! use bridge_traits::playback::{PlayerFactory, PlayerOptions, PlayerResource};
//! use bridge_traits::error::Result;
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! pub struct NativePlayerFactory;
//!
//! #[async_trait]
//! impl PlayerFactory for NativePlayerFactory {
//!     async fn create(
//!         &self,
//!         audio_uri: &str,
//!         options: PlayerOptions,
//!     ) -> Result<Arc<dyn PlayerResource>> {
//!         // Implementation
//!         todo!()
//!     }
//! }
//! ```

pub mod catalog;
pub mod error;
pub mod logging;
pub mod platform;
pub mod playback;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use catalog::{NoopPlayHistory, PlayHistory};
pub use playback::{PlayerFactory, PlayerOptions, PlayerResource, PlayerStatus, StatusCallback};
pub use logging::{LogEntry, LogLevel, LoggerSink};
pub use time::{Clock, ManualClock, SystemClock};
