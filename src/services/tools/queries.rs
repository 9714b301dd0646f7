//! Stateless analytical query primitives over `(user, days_window, ...)`.
//! Every primitive is a plain async function over a pool rather than a
//! service struct: there is no per-call state to hold. Weekday/hour
//! bucketing for the heatmap is done in application code rather than with
//! dialect-specific SQL date functions.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// `cutoff = now_utc - days`. `days` must be a positive integer; values
/// into the thousands are expected for ZIP-imported history, so this
/// deliberately does not cap the window.
fn cutoff(days: i64) -> Result<DateTime<Utc>> {
    if days <= 0 {
        return Err(AppError::InvalidArgument(format!(
            "days must be a positive integer, got {days}"
        )));
    }
    Ok(Utc::now() - Duration::days(days))
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RankedArtist {
    pub artist_id: Uuid,
    pub name: String,
    pub play_count: i64,
    pub last_played_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RankedTrack {
    pub track_id: Uuid,
    pub name: String,
    pub album_name: Option<String>,
    pub artist_names: Option<String>,
    pub play_count: i64,
    pub last_played_at: DateTime<Utc>,
}

/// Top artists by play count, ties broken by most-recent play: two artists
/// with equal counts never compare equal to the caller because
/// `last_played_at` differs, and if it somehow ties too the database's
/// stable sort still returns a consistent order.
pub async fn top_artists(pool: &PgPool, user_id: Uuid, days: i64, limit: i64) -> Result<Vec<RankedArtist>> {
    let since = cutoff(days)?;
    let rows = sqlx::query_as::<_, RankedArtist>(
        r#"
        SELECT a.id AS artist_id, a.name, COUNT(*) AS play_count, MAX(p.played_at) AS last_played_at
        FROM plays p
        JOIN track_artists ta ON ta.track_id = p.track_id
        JOIN artists a ON a.id = ta.artist_id
        WHERE p.user_id = $1 AND p.played_at >= $2
        GROUP BY a.id, a.name
        ORDER BY play_count DESC, last_played_at DESC
        LIMIT $3
        "#,
    )
    .bind(user_id)
    .bind(since)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn top_tracks(pool: &PgPool, user_id: Uuid, days: i64, limit: i64) -> Result<Vec<RankedTrack>> {
    let since = cutoff(days)?;
    let rows = sqlx::query_as::<_, RankedTrack>(
        r#"
        SELECT t.id AS track_id, t.name, t.album_name,
               STRING_AGG(DISTINCT a.name, ', ') AS artist_names,
               COUNT(*) AS play_count, MAX(p.played_at) AS last_played_at
        FROM plays p
        JOIN tracks t ON t.id = p.track_id
        LEFT JOIN track_artists ta ON ta.track_id = t.id
        LEFT JOIN artists a ON a.id = ta.artist_id
        WHERE p.user_id = $1 AND p.played_at >= $2
        GROUP BY t.id, t.name, t.album_name
        ORDER BY play_count DESC, last_played_at DESC
        LIMIT $3
        "#,
    )
    .bind(user_id)
    .bind(since)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct HeatmapCell {
    pub weekday: u32,
    pub hour: u32,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Heatmap {
    pub cells: Vec<HeatmapCell>,
    pub total_plays: u64,
    pub peak_weekday: Option<u32>,
    pub peak_hour: Option<u32>,
}

/// Aggregates plays by (ISO weekday, hour) in application code rather than
/// SQL. Returns only non-empty cells; a window with zero plays returns an
/// empty `cells` vec and `total_plays = 0`, never an error.
pub async fn listening_heatmap(pool: &PgPool, user_id: Uuid, days: i64) -> Result<Heatmap> {
    let since = cutoff(days)?;
    let played_ats: Vec<(DateTime<Utc>,)> =
        sqlx::query_as("SELECT played_at FROM plays WHERE user_id = $1 AND played_at >= $2")
            .bind(user_id)
            .bind(since)
            .fetch_all(pool)
            .await?;

    let mut grid = [[0u64; 24]; 7];
    for (played_at,) in &played_ats {
        let weekday = played_at.weekday().num_days_from_monday() as usize;
        let hour = played_at.hour() as usize;
        grid[weekday][hour] += 1;
    }

    let mut cells = Vec::new();
    let mut peak: Option<(u32, u32, u64)> = None;
    for (weekday, hours) in grid.iter().enumerate() {
        for (hour, count) in hours.iter().enumerate() {
            if *count == 0 {
                continue;
            }
            cells.push(HeatmapCell {
                weekday: weekday as u32,
                hour: hour as u32,
                count: *count,
            });
            if peak.map(|(_, _, c)| *count > c).unwrap_or(true) {
                peak = Some((weekday as u32, hour as u32, *count));
            }
        }
    }

    Ok(Heatmap {
        total_plays: played_ats.len() as u64,
        peak_weekday: peak.map(|(w, _, _)| w),
        peak_hour: peak.map(|(_, h, _)| h),
        cells,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct RepeatTrack {
    pub track_id: Uuid,
    pub name: String,
    pub play_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepeatRate {
    pub total_plays: i64,
    pub unique_tracks: i64,
    pub repeat_ratio: f64,
    pub top_repeated: Vec<RepeatTrack>,
}

pub async fn repeat_rate(pool: &PgPool, user_id: Uuid, days: i64) -> Result<RepeatRate> {
    let since = cutoff(days)?;
    let (total_plays, unique_tracks): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COUNT(DISTINCT track_id) FROM plays WHERE user_id = $1 AND played_at >= $2",
    )
    .bind(user_id)
    .bind(since)
    .fetch_one(pool)
    .await?;

    let repeat_ratio = if unique_tracks > 0 {
        total_plays as f64 / unique_tracks as f64
    } else {
        0.0
    };

    let top_repeated: Vec<RepeatTrack> = sqlx::query_as(
        r#"
        SELECT t.id AS track_id, t.name, COUNT(*) AS play_count
        FROM plays p
        JOIN tracks t ON t.id = p.track_id
        WHERE p.user_id = $1 AND p.played_at >= $2
        GROUP BY t.id, t.name
        ORDER BY play_count DESC
        LIMIT 10
        "#,
    )
    .bind(user_id)
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(RepeatRate {
        total_plays,
        unique_tracks,
        repeat_ratio,
        top_repeated,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct Coverage {
    pub total_plays: i64,
    pub earliest_played_at: Option<DateTime<Utc>>,
    pub latest_played_at: Option<DateTime<Utc>>,
    pub api_source_count: i64,
    pub import_source_count: i64,
    pub distinct_active_days: i64,
    pub requested_days: i64,
}

/// A window with no plays returns all-zero counts and `null` bounds, not an
/// error.
pub async fn coverage(pool: &PgPool, user_id: Uuid, days: i64) -> Result<Coverage> {
    let since = cutoff(days)?;
    let row: (i64, Option<DateTime<Utc>>, Option<DateTime<Utc>>, i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*),
            MIN(played_at),
            MAX(played_at),
            COUNT(*) FILTER (WHERE source = 'api'),
            COUNT(*) FILTER (WHERE source = 'import'),
            COUNT(DISTINCT played_at::date)
        FROM plays
        WHERE user_id = $1 AND played_at >= $2
        "#,
    )
    .bind(user_id)
    .bind(since)
    .fetch_one(pool)
    .await?;

    Ok(Coverage {
        total_plays: row.0,
        earliest_played_at: row.1,
        latest_played_at: row.2,
        api_source_count: row.3,
        import_source_count: row.4,
        distinct_active_days: row.5,
        requested_days: days,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct TasteSummary {
    pub coverage: Coverage,
    pub top_artists: Vec<RankedArtist>,
    pub top_tracks: Vec<RankedTrack>,
    pub heatmap: Heatmap,
    pub repeat_rate: RepeatRate,
    pub total_ms_played: i64,
    pub listening_hours: f64,
    pub peak_weekday: Option<u32>,
    pub peak_hour: Option<u32>,
}

/// Composes the five other primitives plus totals; each component runs its
/// own bounded query instead of one combined one.
pub async fn taste_summary(pool: &PgPool, user_id: Uuid, days: i64) -> Result<TasteSummary> {
    let since = cutoff(days)?;
    let coverage = coverage(pool, user_id, days).await?;
    let top_artists = top_artists(pool, user_id, days, 5).await?;
    let top_tracks = top_tracks(pool, user_id, days, 5).await?;
    let heatmap = listening_heatmap(pool, user_id, days).await?;
    let repeat_rate = repeat_rate(pool, user_id, days).await?;

    let total_ms_played: (Option<i64>,) =
        sqlx::query_as("SELECT SUM(ms_played) FROM plays WHERE user_id = $1 AND played_at >= $2")
            .bind(user_id)
            .bind(since)
            .fetch_one(pool)
            .await?;
    let total_ms_played = total_ms_played.0.unwrap_or(0);

    Ok(TasteSummary {
        peak_weekday: heatmap.peak_weekday,
        peak_hour: heatmap.peak_hour,
        listening_hours: total_ms_played as f64 / 3_600_000.0,
        total_ms_played,
        coverage,
        top_artists,
        top_tracks,
        heatmap,
        repeat_rate,
    })
}
