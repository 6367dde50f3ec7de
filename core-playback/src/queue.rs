//! # Queue Manager
//!
//! Synchronous bookkeeping of track order, current position, shuffle and
//! repeat. Nothing here touches audio resources.
//!
//! The current position is `None` exactly when the queue is empty; otherwise
//! it always points at a valid index. Every mutating method restores that
//! invariant before returning.

use crate::track::TrackDescriptor;
use core_runtime::events::RepeatModeTag;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Repeat policy applied when advancing past the end of the queue or when a
/// track finishes naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    All,
    One,
}

impl RepeatMode {
    /// `off → all → one → off`.
    pub fn cycled(self) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::All,
            RepeatMode::All => RepeatMode::One,
            RepeatMode::One => RepeatMode::Off,
        }
    }
}

impl From<RepeatMode> for RepeatModeTag {
    fn from(mode: RepeatMode) -> Self {
        match mode {
            RepeatMode::Off => RepeatModeTag::Off,
            RepeatMode::All => RepeatModeTag::All,
            RepeatMode::One => RepeatModeTag::One,
        }
    }
}

/// Ordered list of tracks plus the playback-policy flags.
#[derive(Debug, Clone, Default)]
pub struct PlayQueue {
    tracks: Vec<TrackDescriptor>,
    current: Option<usize>,
    shuffle: bool,
    repeat: RepeatMode,
}

impl PlayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracks(&self) -> &[TrackDescriptor] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&TrackDescriptor> {
        self.current.and_then(|index| self.tracks.get(index))
    }

    pub fn get(&self, index: usize) -> Option<&TrackDescriptor> {
        self.tracks.get(index)
    }

    pub fn shuffle_enabled(&self) -> bool {
        self.shuffle
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat
    }

    /// Index of the first track with the given id.
    pub fn position_of(&self, track_id: &str) -> Option<usize> {
        self.tracks.iter().position(|track| track.id == track_id)
    }

    /// Replace the contents and point at `start_index`, clamped into range.
    pub fn replace(&mut self, tracks: Vec<TrackDescriptor>, start_index: usize) {
        self.current = if tracks.is_empty() {
            None
        } else {
            Some(start_index.min(tracks.len() - 1))
        };
        self.tracks = tracks;
    }

    /// Replace the contents while keeping the current position on the track
    /// that was current before, matched by id. Falls back to index 0 when that
    /// track is gone.
    ///
    /// Returns `true` when the previous current track was found.
    pub fn splice_preserving_current(&mut self, tracks: Vec<TrackDescriptor>) -> bool {
        let previous_id = self.current().map(|track| track.id.clone());
        let preserved = previous_id
            .as_deref()
            .and_then(|id| tracks.iter().position(|track| track.id == id));

        self.current = match preserved {
            Some(index) => Some(index),
            None if tracks.is_empty() => None,
            None => Some(0),
        };
        self.tracks = tracks;

        preserved.is_some()
    }

    /// Move the current position. Out-of-range indices are ignored.
    pub fn set_current(&mut self, index: usize) -> bool {
        if index >= self.tracks.len() {
            return false;
        }
        self.current = Some(index);
        true
    }

    /// Append a track and return its index. An empty queue gets a current
    /// position pointing at the new track.
    pub fn append(&mut self, track: TrackDescriptor) -> usize {
        self.tracks.push(track);
        let index = self.tracks.len() - 1;
        if self.current.is_none() {
            self.current = Some(index);
        }
        index
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.current = None;
    }

    /// Index that `next` should move to.
    ///
    /// With shuffle on, a uniform pick among all other indices. Otherwise the
    /// linear successor, wrapping to 0 only under [`RepeatMode::All`]. When
    /// there is nowhere to go the current index comes back unchanged.
    pub fn compute_next_index<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<usize> {
        let current = self.current?;
        let len = self.tracks.len();

        if self.shuffle {
            if len <= 1 {
                return Some(current);
            }
            // Draw from the other len - 1 slots and skip over the current one.
            let pick = rng.gen_range(0..len - 1);
            return Some(if pick >= current { pick + 1 } else { pick });
        }

        if current + 1 < len {
            Some(current + 1)
        } else if self.repeat == RepeatMode::All {
            Some(0)
        } else {
            Some(current)
        }
    }

    /// Index that `previous` should move to. Always the linear predecessor,
    /// wrapping, regardless of shuffle.
    pub fn compute_prev_index(&self) -> Option<usize> {
        let current = self.current?;
        let len = self.tracks.len();
        Some((current + len - 1) % len)
    }

    /// Indices to warm around the current position: `ahead` linear successors
    /// then `behind` predecessors, wrapping. The current index and duplicates
    /// are left out.
    pub fn lookahead_indices(&self, ahead: usize, behind: usize) -> Vec<usize> {
        let Some(current) = self.current else {
            return Vec::new();
        };
        let len = self.tracks.len();

        let successors = (1..=ahead).map(|offset| (current + offset) % len);
        let predecessors = (1..=behind).map(|offset| (current + len - offset % len) % len);

        let mut indices = Vec::with_capacity(ahead + behind);
        for index in successors.chain(predecessors) {
            if index != current && !indices.contains(&index) {
                indices.push(index);
            }
        }
        indices
    }

    pub fn toggle_shuffle(&mut self) -> bool {
        self.shuffle = !self.shuffle;
        self.shuffle
    }

    pub fn set_shuffle(&mut self, enabled: bool) {
        self.shuffle = enabled;
    }

    pub fn cycle_repeat(&mut self) -> RepeatMode {
        self.repeat = self.repeat.cycled();
        self.repeat
    }

    pub fn set_repeat(&mut self, mode: RepeatMode) {
        self.repeat = mode;
    }
}
