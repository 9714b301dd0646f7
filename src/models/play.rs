use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Play {
    pub id: Uuid,
    pub user_id: Uuid,
    pub track_id: Uuid,
    pub played_at: DateTime<Utc>,
    pub ms_played: i64,
    pub source: String,
}

/// A normalized, not-yet-persisted play event: the output of both the
/// Spotify client's page parser and the ZIP importer's record normalizer.
#[derive(Debug, Clone)]
pub struct NormalizedPlay {
    pub played_at: DateTime<Utc>,
    pub ms_played: i64,
    pub track_name: String,
    pub album_name: String,
    pub artist_name: String,
    pub provider_track_id: Option<String>,
    pub provider_artist_id: Option<String>,
    pub duration_ms: Option<i64>,
    pub source: crate::models::SourceTag,
}

/// Outcome of committing one batch of normalized plays through the repository.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub inserted: u64,
    pub skipped: u64,
    pub earliest_played_at: Option<DateTime<Utc>>,
    pub latest_played_at: Option<DateTime<Utc>>,
}

impl BatchOutcome {
    pub fn merge(&mut self, other: BatchOutcome) {
        self.inserted += other.inserted;
        self.skipped += other.skipped;
        self.earliest_played_at = min_opt(self.earliest_played_at, other.earliest_played_at);
        self.latest_played_at = max_opt(self.latest_played_at, other.latest_played_at);
    }

    pub fn observe(&mut self, played_at: DateTime<Utc>, inserted: bool) {
        if inserted {
            self.inserted += 1;
        } else {
            self.skipped += 1;
        }
        self.earliest_played_at = min_opt(self.earliest_played_at, Some(played_at));
        self.latest_played_at = max_opt(self.latest_played_at, Some(played_at));
    }
}

fn min_opt(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

fn max_opt(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}
