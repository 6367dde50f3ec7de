//! Thread-safety bound shared by every bridge trait.
//!
//! Host bridges are called from tokio tasks and from whatever thread the host
//! delivers player callbacks on, so implementations must be shareable across
//! threads. Naming the bound once keeps the trait definitions short.

/// Marker trait for `Send + Sync` bridge implementations.
pub trait PlatformSendSync: Send + Sync {}

impl<T> PlatformSendSync for T where T: Send + Sync {}
