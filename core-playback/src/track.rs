//! # Track Descriptors
//!
//! Normalized, immutable descriptions of playable items and the mapping from
//! raw catalog records.
//!
//! The catalog backend returns songs whose `artist` and `album` fields are
//! either bare ids or populated objects, with cover art spread across several
//! optional fields. [`resolve_track`] flattens that into a [`TrackDescriptor`],
//! which is the only track type the queue, cache and session ever see.
//!
//! Equality and hashing of descriptors are by `id` only.

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Cover shown when neither the song, its album nor its artist carry artwork.
pub const PLACEHOLDER_COVER_URI: &str = "https://via.placeholder.com/300x300.png?text=No+Cover";

/// Display name used when the artist reference is not populated.
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// A playable item as seen by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackDescriptor {
    pub id: String,
    pub title: String,
    pub artist_display_name: String,
    pub artist_id: Option<String>,
    pub cover_uri: String,
    pub audio_uri: String,
    pub duration_hint_secs: Option<u32>,
}

impl TrackDescriptor {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        audio_uri: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist_display_name: UNKNOWN_ARTIST.to_string(),
            artist_id: None,
            cover_uri: PLACEHOLDER_COVER_URI.to_string(),
            audio_uri: audio_uri.into(),
            duration_hint_secs: None,
        }
    }

    pub fn with_artist(mut self, display_name: impl Into<String>, id: Option<String>) -> Self {
        self.artist_display_name = display_name.into();
        self.artist_id = id;
        self
    }

    pub fn with_cover(mut self, cover_uri: impl Into<String>) -> Self {
        self.cover_uri = cover_uri.into();
        self
    }

    pub fn with_duration_hint(mut self, secs: u32) -> Self {
        self.duration_hint_secs = Some(secs);
        self
    }
}

impl PartialEq for TrackDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TrackDescriptor {}

impl Hash for TrackDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

// ============================================================================
// Raw catalog records
// ============================================================================

/// Artist object as returned when the backend populates the reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogArtist {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
}

/// Album object as returned when the backend populates the reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogAlbum {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
}

/// Artist field: a bare id, or the populated object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArtistRef {
    Id(String),
    Populated(CatalogArtist),
}

/// Album field: a bare id, or the populated object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AlbumRef {
    Id(String),
    Populated(CatalogAlbum),
}

/// Song record as returned by the catalog API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogTrack {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub artist: ArtistRef,
    #[serde(default)]
    pub album: Option<AlbumRef>,
    /// Duration in seconds.
    #[serde(default)]
    pub duration: Option<f64>,
    pub audio_url: String,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
}

/// Map a raw catalog record to a [`TrackDescriptor`]. Pure, no I/O.
pub fn resolve_track(record: &CatalogTrack) -> TrackDescriptor {
    let (artist_display_name, artist_id) = match &record.artist {
        ArtistRef::Id(id) => (UNKNOWN_ARTIST.to_string(), Some(id.clone())),
        ArtistRef::Populated(artist) => (artist.name.clone(), Some(artist.id.clone())),
    };

    TrackDescriptor {
        id: record.id.clone(),
        title: record.title.clone(),
        artist_display_name,
        artist_id,
        cover_uri: resolve_cover(record).to_string(),
        audio_uri: record.audio_url.clone(),
        duration_hint_secs: record
            .duration
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(|secs| secs.round() as u32),
    }
}

impl From<&CatalogTrack> for TrackDescriptor {
    fn from(record: &CatalogTrack) -> Self {
        resolve_track(record)
    }
}

// Song artwork first, then album, then artist, then the placeholder.
fn resolve_cover(record: &CatalogTrack) -> &str {
    let mut candidates = vec![record.cover_url.as_deref(), record.cover_image.as_deref()];

    if let Some(AlbumRef::Populated(album)) = &record.album {
        candidates.extend([album.cover_url.as_deref(), album.cover_image.as_deref()]);
    }

    if let ArtistRef::Populated(artist) = &record.artist {
        candidates.extend([
            artist.avatar_url.as_deref(),
            artist.avatar.as_deref(),
            artist.cover_url.as_deref(),
            artist.cover_image.as_deref(),
        ]);
    }

    candidates
        .into_iter()
        .flatten()
        .find(|uri| !uri.is_empty())
        .unwrap_or(PLACEHOLDER_COVER_URI)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn record(json: &str) -> CatalogTrack {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn descriptors_compare_by_id_only() {
        let a = TrackDescriptor::new("song-1", "First", "https://cdn/a.mp3");
        let b = TrackDescriptor::new("song-1", "Renamed", "https://cdn/b.mp3");
        let c = TrackDescriptor::new("song-2", "First", "https://cdn/a.mp3");

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn unpopulated_artist_falls_back_to_unknown() {
        let track = resolve_track(&record(
            r#"{"_id":"s1","title":"Intro","artist":"a1","audioUrl":"https://cdn/s1.mp3","duration":182.4}"#,
        ));

        assert_eq!(track.artist_display_name, "Unknown Artist");
        assert_eq!(track.artist_id.as_deref(), Some("a1"));
        assert_eq!(track.cover_uri, PLACEHOLDER_COVER_URI);
        assert_eq!(track.duration_hint_secs, Some(182));
    }

    #[test]
    fn populated_artist_supplies_name_and_id() {
        let track = resolve_track(&record(
            r#"{"_id":"s1","title":"Intro","audioUrl":"u",
                "artist":{"_id":"a1","name":"The Band","avatarUrl":"https://img/a1.jpg"}}"#,
        ));

        assert_eq!(track.artist_display_name, "The Band");
        assert_eq!(track.artist_id.as_deref(), Some("a1"));
        assert_eq!(track.cover_uri, "https://img/a1.jpg");
    }

    #[test]
    fn cover_prefers_song_then_album_then_artist() {
        let song_cover = resolve_track(&record(
            r#"{"_id":"s1","title":"t","audioUrl":"u","coverImage":"song.jpg",
                "album":{"_id":"al","coverUrl":"album.jpg"},
                "artist":{"_id":"a1","name":"n","avatar":"artist.jpg"}}"#,
        ));
        assert_eq!(song_cover.cover_uri, "song.jpg");

        let album_cover = resolve_track(&record(
            r#"{"_id":"s1","title":"t","audioUrl":"u","coverUrl":"",
                "album":{"_id":"al","coverImage":"album.jpg"},
                "artist":{"_id":"a1","name":"n","avatar":"artist.jpg"}}"#,
        ));
        assert_eq!(album_cover.cover_uri, "album.jpg");

        let artist_cover = resolve_track(&record(
            r#"{"_id":"s1","title":"t","audioUrl":"u","album":"al",
                "artist":{"_id":"a1","name":"n","coverImage":"artist-cover.jpg"}}"#,
        ));
        assert_eq!(artist_cover.cover_uri, "artist-cover.jpg");
    }

    #[test]
    fn negative_duration_is_dropped() {
        let track = resolve_track(&record(
            r#"{"_id":"s1","title":"t","artist":"a","audioUrl":"u","duration":-1}"#,
        ));
        assert_eq!(track.duration_hint_secs, None);
    }
}
