use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use uuid::Uuid;

/// Origin marker on tracks/artists/plays, used by coverage statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum SourceTag {
    Api,
    Import,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Api => "api",
            SourceTag::Import => "import",
        }
    }
}

impl std::fmt::Display for SourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Track {
    pub id: Uuid,
    pub name: String,
    pub provider_track_id: Option<String>,
    pub local_id: Option<String>,
    pub album_name: Option<String>,
    pub duration_ms: Option<i64>,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Artist {
    pub id: Uuid,
    pub name: String,
    pub provider_artist_id: Option<String>,
    pub local_id: Option<String>,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The identity a track/artist is looked up and upserted by: either the
/// provider's own id, or a deterministic hash-derived local id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    Provider(String),
    Local(String),
}

impl Identity {
    pub fn as_str(&self) -> &str {
        match self {
            Identity::Provider(s) | Identity::Local(s) => s,
        }
    }
}

/// `"local:" + hex(sha1(artist ‖ "|" ‖ track ‖ "|" ‖ album))`, lowercased,
/// empty fields contributing empty strings.
pub fn local_track_id(artist: &str, track: &str, album: &str) -> String {
    let input = format!("{artist}|{track}|{album}").to_lowercase();
    let digest = Sha1::digest(input.as_bytes());
    format!("local:{}", hex_encode(&digest))
}

/// `"local:" + hex(sha1(name))`, lowercased.
pub fn local_artist_id(name: &str) -> String {
    let input = name.to_lowercase();
    let digest = Sha1::digest(input.as_bytes());
    format!("local:{}", hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(out, "{b:02x}").expect("writing to a String never fails");
    }
    out
}

/// Track identity resolved during ingest: a provider URI, when Spotify gave
/// us one, else the deterministic local id.
pub fn track_identity(provider_track_id: Option<&str>, artist: &str, track: &str, album: &str) -> Identity {
    match provider_track_id {
        Some(id) if !id.is_empty() => Identity::Provider(id.to_string()),
        _ => Identity::Local(local_track_id(artist, track, album)),
    }
}

pub fn artist_identity(provider_artist_id: Option<&str>, name: &str) -> Identity {
    match provider_artist_id {
        Some(id) if !id.is_empty() => Identity::Provider(id.to_string()),
        _ => Identity::Local(local_artist_id(name)),
    }
}
