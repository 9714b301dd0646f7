use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    ShortTerm,
    MediumTerm,
    LongTerm,
}

impl TimeRange {
    pub fn as_query_value(&self) -> &'static str {
        match self {
            TimeRange::ShortTerm => "short_term",
            TimeRange::MediumTerm => "medium_term",
            TimeRange::LongTerm => "long_term",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "short_term" => Some(TimeRange::ShortTerm),
            "medium_term" => Some(TimeRange::MediumTerm),
            "long_term" => Some(TimeRange::LongTerm),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchType {
    Track,
    Artist,
    Album,
}

impl SearchType {
    pub fn as_query_value(&self) -> &'static str {
        match self {
            SearchType::Track => "track",
            SearchType::Artist => "artist",
            SearchType::Album => "album",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "track" => Some(SearchType::Track),
            "artist" => Some(SearchType::Artist),
            "album" => Some(SearchType::Album),
            _ => None,
        }
    }
}

/// One item of Spotify's `/me/player/recently-played`, trimmed to what the
/// ingestion pipeline needs.
#[derive(Debug, Clone, Deserialize)]
pub struct RecentlyPlayedItem {
    pub played_at: DateTime<Utc>,
    pub track: SpotifyTrack,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyTrack {
    pub id: Option<String>,
    pub name: String,
    pub duration_ms: Option<i64>,
    pub album: Option<SpotifyAlbum>,
    pub artists: Vec<SpotifyArtistRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyAlbum {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyArtistRef {
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct RecentlyPlayedPage {
    pub items: Vec<RecentlyPlayedItem>,
    pub next_before_ms: Option<i64>,
}

impl RecentlyPlayedItem {
    /// Converts one API item into the same [`crate::models::NormalizedPlay`]
    /// shape the ZIP importer produces, tagged `source = api`.
    pub fn normalize(&self) -> crate::models::NormalizedPlay {
        let artist = self.track.artists.first();
        crate::models::NormalizedPlay {
            played_at: self.played_at,
            ms_played: self.track.duration_ms.unwrap_or(0),
            track_name: self.track.name.clone(),
            album_name: self
                .track
                .album
                .as_ref()
                .map(|a| a.name.clone())
                .unwrap_or_default(),
            artist_name: artist.map(|a| a.name.clone()).unwrap_or_default(),
            provider_track_id: self.track.id.clone(),
            provider_artist_id: artist.and_then(|a| a.id.clone()),
            duration_ms: self.track.duration_ms,
            source: crate::models::SourceTag::Api,
        }
    }
}

pub fn normalize_page(items: &[RecentlyPlayedItem]) -> Vec<crate::models::NormalizedPlay> {
    items.iter().map(RecentlyPlayedItem::normalize).collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyProfile {
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub country: Option<String>,
    pub product: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyErrorBody {
    pub error: SpotifyErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyErrorDetail {
    pub status: Option<i32>,
    pub message: String,
}
