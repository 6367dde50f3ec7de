//! Catalog and listening-history bridge.
//!
//! The catalog backend lives outside the core. The playback engine only needs
//! to report completed or skipped listens; everything else (browsing, search,
//! favorites) is handled by the host against its own REST client.

use crate::{error::Result, platform::PlatformSendSync};

/// Records "track played for N ms" events against the catalog backend.
///
/// Calls are fire-and-forget from the engine's point of view: failures are
/// logged by the caller and never retried.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::catalog::PlayHistory;
///
/// struct RestHistory { client: reqwest::Client, base_url: String }
///
/// #[async_trait::async_trait]
/// impl PlayHistory for RestHistory {
///     async fn record_play(&self, track_id: &str, listened_ms: u64) -> Result<()> {
///         // POST {base_url}/songs/{track_id}/play { duration: listened_ms }
///         todo!()
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait PlayHistory: PlatformSendSync {
    /// Record that `track_id` was listened to for `listened_ms` milliseconds.
    async fn record_play(&self, track_id: &str, listened_ms: u64) -> Result<()>;
}

/// History sink that discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPlayHistory;

#[async_trait::async_trait]
impl PlayHistory for NoopPlayHistory {
    async fn record_play(&self, _track_id: &str, _listened_ms: u64) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        pub History {}

        #[async_trait::async_trait]
        impl PlayHistory for History {
            async fn record_play(&self, track_id: &str, listened_ms: u64) -> Result<()>;
        }
    }

    #[tokio::test]
    async fn noop_history_accepts_everything() {
        let history = NoopPlayHistory;
        assert!(history.record_play("song-1", 1_000).await.is_ok());
    }

    #[tokio::test]
    async fn history_is_object_safe() {
        let mut mock = MockHistory::new();
        mock.expect_record_play()
            .withf(|track_id: &str, listened_ms: &u64| {
                track_id == "song-1" && *listened_ms == 42_000
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let history: Box<dyn PlayHistory> = Box::new(mock);
        history.record_play("song-1", 42_000).await.unwrap();
    }
}
