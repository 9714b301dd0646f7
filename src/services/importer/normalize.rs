use chrono::{DateTime, NaiveDateTime, Utc};

use crate::models::{NormalizedPlay, SourceTag};

use super::records::{AccountDataRecord, ExtendedRecord};

/// `None` means the record is missing a mandatory field and must be
/// counted as skipped, not a hard failure.
pub fn normalize_extended(record: ExtendedRecord) -> Option<NormalizedPlay> {
    let played_at = parse_rfc3339(record.ts.as_deref()?)?;
    let ms_played = record.ms_played?;
    let track_name = non_empty(record.master_metadata_track_name)?;
    let artist_name = non_empty(record.master_metadata_album_artist_name)?;
    let album_name = record.master_metadata_album_album_name.unwrap_or_default();
    let provider_track_id = record
        .spotify_track_uri
        .as_deref()
        .and_then(extract_spotify_id);

    Some(NormalizedPlay {
        played_at,
        ms_played,
        track_name,
        album_name,
        artist_name,
        provider_track_id,
        provider_artist_id: None,
        duration_ms: None,
        source: SourceTag::Import,
    })
}

pub fn normalize_account_data(record: AccountDataRecord) -> Option<NormalizedPlay> {
    let played_at = parse_naive_as_utc(record.end_time.as_deref()?)?;
    let ms_played = record.ms_played?;
    let track_name = non_empty(record.track_name)?;
    let artist_name = non_empty(record.artist_name)?;

    Some(NormalizedPlay {
        played_at,
        ms_played,
        track_name,
        album_name: String::new(),
        artist_name,
        provider_track_id: None,
        provider_artist_id: None,
        duration_ms: None,
        source: SourceTag::Import,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Account-data `endTime` is a naive `"YYYY-MM-DD HH:MM"` string with no
/// offset. Normalized to UTC at ingest rather than ever compared as a
/// naive instant downstream.
fn parse_naive_as_utc(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M")
        .ok()
        .map(|naive| naive.and_utc())
}

fn extract_spotify_id(uri: &str) -> Option<String> {
    let id = uri.rsplit(':').next()?;
    (!id.is_empty()).then(|| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_record_missing_ts_is_skipped() {
        let record = ExtendedRecord {
            ts: None,
            ms_played: Some(1000),
            master_metadata_track_name: Some("Track".to_string()),
            master_metadata_album_artist_name: Some("Artist".to_string()),
            master_metadata_album_album_name: Some("Album".to_string()),
            spotify_track_uri: None,
        };
        assert!(normalize_extended(record).is_none());
    }

    #[test]
    fn extended_record_extracts_track_id_from_uri() {
        let record = ExtendedRecord {
            ts: Some("2024-01-15T10:30:00Z".to_string()),
            ms_played: Some(354000),
            master_metadata_track_name: Some("Bohemian Rhapsody".to_string()),
            master_metadata_album_artist_name: Some("Queen".to_string()),
            master_metadata_album_album_name: Some("A Night at the Opera".to_string()),
            spotify_track_uri: Some("spotify:track:4u7EnebtmKWzUH433cf5Qv".to_string()),
        };
        let normalized = normalize_extended(record).unwrap();
        assert_eq!(normalized.provider_track_id.as_deref(), Some("4u7EnebtmKWzUH433cf5Qv"));
        assert_eq!(normalized.played_at.to_rfc3339(), "2024-01-15T10:30:00+00:00");
    }

    #[test]
    fn account_data_naive_timestamp_normalizes_to_utc() {
        let record = AccountDataRecord {
            end_time: Some("2024-01-15 11:00".to_string()),
            artist_name: Some("Led Zeppelin".to_string()),
            track_name: Some("Stairway to Heaven".to_string()),
            ms_played: Some(482000),
        };
        let normalized = normalize_account_data(record).unwrap();
        assert_eq!(normalized.played_at.to_rfc3339(), "2024-01-15T11:00:00+00:00");
        assert!(normalized.provider_track_id.is_none());
    }

    #[test]
    fn account_data_record_missing_artist_is_skipped() {
        let record = AccountDataRecord {
            end_time: Some("2024-01-15 11:00".to_string()),
            artist_name: None,
            track_name: Some("Stairway to Heaven".to_string()),
            ms_played: Some(482000),
        };
        assert!(normalize_account_data(record).is_none());
    }
}
