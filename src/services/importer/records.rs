use serde::Deserialize;

/// Raw shape of one `endsong_*.json` / `Streaming_History_Audio_*.json`
/// element. Unknown fields (IP, user agent, platform, …) are dropped by
/// serde's default "ignore unknown fields" behavior: they never reach a
/// typed struct, so there is nothing to scrub later.
#[derive(Debug, Deserialize)]
pub struct ExtendedRecord {
    pub ts: Option<String>,
    pub ms_played: Option<i64>,
    pub master_metadata_track_name: Option<String>,
    pub master_metadata_album_artist_name: Option<String>,
    pub master_metadata_album_album_name: Option<String>,
    pub spotify_track_uri: Option<String>,
}

/// Raw shape of one `StreamingHistory*.json` element (the simpler,
/// account-data export schema).
#[derive(Debug, Deserialize)]
pub struct AccountDataRecord {
    #[serde(rename = "endTime")]
    pub end_time: Option<String>,
    #[serde(rename = "artistName")]
    pub artist_name: Option<String>,
    #[serde(rename = "trackName")]
    pub track_name: Option<String>,
    #[serde(rename = "msPlayed")]
    pub ms_played: Option<i64>,
}
