//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates. Host applications can depend on `streamplay-workspace`
//! and enable `service` (the full façade, default) or `engine-only` (just the
//! playback engine) without wiring each crate individually.

#[cfg(feature = "service")]
pub use core_service as service;

#[cfg(feature = "engine-only")]
pub use core_playback as playback;
