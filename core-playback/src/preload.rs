//! # Preload Cache
//!
//! Bounded pool of paused, ready-to-play player handles keyed by track id.
//!
//! The cache is told which ids to warm and knows nothing about queue order.
//! Eviction is strictly by insertion order; a lookup never refreshes an entry.
//! A handle leaves the cache exactly once: through [`PreloadCache::take`]
//! (ownership moves to the caller), through eviction, or through
//! [`PreloadCache::release_all`] (the cache releases it).

use bridge_traits::{PlayerFactory, PlayerOptions, PlayerResource};
use core_runtime::logging::redact_uri;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// A warmed handle and its insertion sequence number.
struct CacheEntry {
    track_id: String,
    resource: Arc<dyn PlayerResource>,
    inserted_at: u64,
}

#[derive(Default)]
struct CacheState {
    entries: VecDeque<CacheEntry>,
    in_flight: HashSet<String>,
    /// In-flight warms whose result must be released on arrival.
    cancelled: HashSet<String>,
    next_seq: u64,
    closed: bool,
}

impl CacheState {
    fn position(&self, track_id: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.track_id == track_id)
    }
}

/// Result of a [`PreloadCache::warm`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmOutcome {
    /// A new handle was inserted.
    Inserted,
    /// Already cached, already in flight, or the cache is closed.
    Skipped,
    /// The handle arrived after being claimed or after shutdown and was released.
    Discarded,
    /// The factory failed; nothing was cached.
    Failed,
}

pub struct PreloadCache {
    factory: Arc<dyn PlayerFactory>,
    capacity: usize,
    options: PlayerOptions,
    state: Mutex<CacheState>,
}

impl PreloadCache {
    pub fn new(factory: Arc<dyn PlayerFactory>, capacity: usize, options: PlayerOptions) -> Self {
        Self {
            factory,
            capacity: capacity.max(1),
            options: PlayerOptions {
                autoplay: false,
                ..options
            },
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn contains(&self, track_id: &str) -> bool {
        self.state.lock().position(track_id).is_some()
    }

    pub fn is_in_flight(&self, track_id: &str) -> bool {
        self.state.lock().in_flight.contains(track_id)
    }

    /// Cached ids, oldest insertion first.
    pub fn cached_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|entry| entry.track_id.clone())
            .collect()
    }

    /// Construct a paused handle for `track_id` and insert it, evicting the
    /// oldest entry when the cache is full.
    ///
    /// Best effort: failures are logged and leave the cache unchanged.
    pub async fn warm(&self, track_id: &str, audio_uri: &str) -> WarmOutcome {
        {
            let mut state = self.state.lock();
            if state.closed
                || state.in_flight.contains(track_id)
                || state.position(track_id).is_some()
            {
                return WarmOutcome::Skipped;
            }
            state.in_flight.insert(track_id.to_string());
        }

        debug!(track_id, uri = redact_uri(audio_uri), "Warming preload handle");
        let created = self.factory.create(audio_uri, self.options).await;

        let (outcome, to_release) = {
            let mut state = self.state.lock();
            state.in_flight.remove(track_id);
            let cancelled = state.cancelled.remove(track_id);

            match created {
                Err(err) => {
                    debug!(track_id, error = %err, "Preload failed");
                    (WarmOutcome::Failed, Vec::new())
                }
                Ok(resource) if cancelled || state.closed => {
                    (WarmOutcome::Discarded, vec![resource])
                }
                Ok(resource) => {
                    let mut evicted = Vec::new();
                    while state.entries.len() >= self.capacity {
                        if let Some(oldest) = state.entries.pop_front() {
                            debug!(
                                track_id = %oldest.track_id,
                                inserted_at = oldest.inserted_at,
                                "Evicting preload handle"
                            );
                            evicted.push(oldest.resource);
                        }
                    }

                    let inserted_at = state.next_seq;
                    state.next_seq += 1;
                    state.entries.push_back(CacheEntry {
                        track_id: track_id.to_string(),
                        resource,
                        inserted_at,
                    });
                    (WarmOutcome::Inserted, evicted)
                }
            }
        };

        release_all_of(to_release).await;
        outcome
    }

    /// Remove and return the ready handle for `track_id`.
    ///
    /// When the id is still being warmed, the eventual handle is marked for
    /// release so it can never coexist with the caller's own load.
    pub fn take(&self, track_id: &str) -> Option<Arc<dyn PlayerResource>> {
        let mut state = self.state.lock();
        match state.position(track_id) {
            Some(index) => state.entries.remove(index).map(|entry| entry.resource),
            None => {
                if state.in_flight.contains(track_id) {
                    state.cancelled.insert(track_id.to_string());
                }
                None
            }
        }
    }

    /// Release every cached handle and refuse further warms. In-flight warms
    /// release their handle when they land.
    pub async fn release_all(&self) {
        let drained: Vec<_> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.entries.drain(..).map(|entry| entry.resource).collect()
        };

        if !drained.is_empty() {
            debug!(count = drained.len(), "Releasing preload cache");
        }
        release_all_of(drained).await;
    }
}

impl std::fmt::Debug for PreloadCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PreloadCache")
            .field("capacity", &self.capacity)
            .field("len", &state.entries.len())
            .field("in_flight", &state.in_flight.len())
            .field("closed", &state.closed)
            .finish()
    }
}

async fn release_all_of(resources: Vec<Arc<dyn PlayerResource>>) {
    for resource in resources {
        if let Err(err) = resource.release().await {
            warn!(error = %err, "Failed to release preload handle");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{BridgeError, PlayerStatus, StatusCallback};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct CountingResource {
        releases: AtomicUsize,
    }

    #[async_trait]
    impl PlayerResource for CountingResource {
        async fn play(&self) -> BridgeResult<()> {
            Ok(())
        }
        async fn pause(&self) -> BridgeResult<()> {
            Ok(())
        }
        async fn seek(&self, _position_ms: u64) -> BridgeResult<()> {
            Ok(())
        }
        async fn status(&self) -> BridgeResult<PlayerStatus> {
            Ok(PlayerStatus::loaded(false, 0, None))
        }
        async fn release(&self) -> BridgeResult<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn set_status_callback(&self, _callback: Option<StatusCallback>) {}
    }

    #[derive(Default)]
    struct RecordingFactory {
        created: Mutex<Vec<(String, Arc<CountingResource>)>>,
        gate: Option<Arc<Notify>>,
    }

    impl RecordingFactory {
        fn resource_for(&self, uri: &str) -> Arc<CountingResource> {
            self.created
                .lock()
                .iter()
                .find(|(created_uri, _)| created_uri == uri)
                .map(|(_, resource)| resource.clone())
                .unwrap()
        }
    }

    #[async_trait]
    impl PlayerFactory for RecordingFactory {
        async fn create(
            &self,
            audio_uri: &str,
            options: PlayerOptions,
        ) -> BridgeResult<Arc<dyn PlayerResource>> {
            assert!(!options.autoplay);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if audio_uri.contains("broken") {
                return Err(BridgeError::LoadFailed {
                    uri: audio_uri.to_string(),
                    message: "decoder error".to_string(),
                });
            }
            let resource = Arc::new(CountingResource::default());
            self.created
                .lock()
                .push((audio_uri.to_string(), resource.clone()));
            Ok(resource)
        }
    }

    fn cache_with(factory: Arc<RecordingFactory>, capacity: usize) -> PreloadCache {
        PreloadCache::new(factory, capacity, PlayerOptions::default())
    }

    #[tokio::test]
    async fn warming_six_ids_evicts_only_the_oldest() {
        let factory = Arc::new(RecordingFactory::default());
        let cache = cache_with(factory.clone(), 5);

        for id in ["a", "b", "c", "d", "e", "f"] {
            assert_eq!(cache.warm(id, &format!("uri-{}", id)).await, WarmOutcome::Inserted);
        }

        assert_eq!(cache.cached_ids(), vec!["b", "c", "d", "e", "f"]);
        assert!(!cache.contains("a"));
        assert_eq!(factory.resource_for("uri-a").releases.load(Ordering::SeqCst), 1);
        assert_eq!(factory.resource_for("uri-b").releases.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn warm_is_noop_when_already_cached() {
        let factory = Arc::new(RecordingFactory::default());
        let cache = cache_with(factory.clone(), 5);

        cache.warm("a", "uri-a").await;
        assert_eq!(cache.warm("a", "uri-a").await, WarmOutcome::Skipped);
        assert_eq!(factory.created.lock().len(), 1);
    }

    #[tokio::test]
    async fn take_removes_the_entry() {
        let factory = Arc::new(RecordingFactory::default());
        let cache = cache_with(factory, 5);

        cache.warm("a", "uri-a").await;
        assert!(cache.take("a").is_some());
        assert!(cache.take("a").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn failed_warm_caches_nothing() {
        let factory = Arc::new(RecordingFactory::default());
        let cache = cache_with(factory, 5);

        assert_eq!(cache.warm("a", "broken-uri").await, WarmOutcome::Failed);
        assert!(!cache.contains("a"));
        assert!(!cache.is_in_flight("a"));
    }

    #[tokio::test]
    async fn take_during_warm_discards_the_late_handle() {
        let gate = Arc::new(Notify::new());
        let factory = Arc::new(RecordingFactory {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let cache = Arc::new(cache_with(factory.clone(), 5));

        let warming = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.warm("a", "uri-a").await })
        };
        while !cache.is_in_flight("a") {
            tokio::task::yield_now().await;
        }

        assert!(cache.take("a").is_none());
        gate.notify_one();

        assert_eq!(warming.await.unwrap(), WarmOutcome::Discarded);
        assert!(!cache.contains("a"));
        assert_eq!(factory.resource_for("uri-a").releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn release_all_releases_each_handle_once_and_closes() {
        let factory = Arc::new(RecordingFactory::default());
        let cache = cache_with(factory.clone(), 5);

        cache.warm("a", "uri-a").await;
        cache.warm("b", "uri-b").await;
        cache.release_all().await;
        cache.release_all().await;

        assert!(cache.is_empty());
        assert_eq!(factory.resource_for("uri-a").releases.load(Ordering::SeqCst), 1);
        assert_eq!(factory.resource_for("uri-b").releases.load(Ordering::SeqCst), 1);
        assert_eq!(cache.warm("c", "uri-c").await, WarmOutcome::Skipped);
    }
}
