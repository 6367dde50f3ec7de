//! # Playback Engine Module
//!
//! Queue, preload and race-safe playback control for the mobile client.
//!
//! ## Overview
//!
//! This module handles:
//! - Track descriptors and mapping of raw catalog records
//! - Queue order, shuffle and repeat policy
//! - Speculative preloading of neighbouring tracks
//! - The single live player handle and stale-load protection
//! - The public [`PlaybackEngine`] orchestrating all of the above
//!
//! Audio output itself is delegated to the host through the
//! [`bridge_traits::PlayerFactory`] contract.

pub mod config;
pub mod engine;
pub mod error;
pub mod preload;
pub mod queue;
pub mod session;
pub mod track;

pub use config::PlaybackConfig;
pub use engine::{PlaybackEngine, PlayerSnapshot};
pub use error::{PlaybackError, Result};
pub use preload::{PreloadCache, WarmOutcome};
pub use queue::{PlayQueue, RepeatMode};
pub use session::{PlayOutcome, PlaybackSession, SessionPhase};
pub use track::{resolve_track, CatalogTrack, TrackDescriptor};
