//! Analytical query primitive tests against a disposable Postgres instance.

mod common;

use chrono::{TimeZone, Utc};

use spotify_history_collector::models::{NormalizedPlay, SourceTag};
use spotify_history_collector::services::repository::MusicRepository;
use spotify_history_collector::services::tools::queries;

use common::TestDatabase;

fn play_at(
    played_at: chrono::DateTime<Utc>,
    artist: &str,
    track: &str,
    provider_track_id: &str,
) -> NormalizedPlay {
    NormalizedPlay {
        played_at,
        ms_played: 180_000,
        track_name: track.to_string(),
        album_name: "Album".to_string(),
        artist_name: artist.to_string(),
        provider_track_id: Some(provider_track_id.to_string()),
        provider_artist_id: None,
        duration_ms: None,
        source: SourceTag::Api,
    }
}

/// S5: 10 plays at Monday 14:00, 5 at Friday 09:00. The heatmap returns
/// exactly those two cells, the right totals, and the right peak.
#[tokio::test]
async fn heatmap_matches_seed_scenario() {
    let db = TestDatabase::new().await;
    let user_id = db.create_user().await;
    let repo = MusicRepository::new(db.pool.clone());

    // 2024-01-15 is a Monday; 2024-01-19 is the Friday of the same week.
    let monday_14 = Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap();
    let friday_9 = Utc.with_ymd_and_hms(2024, 1, 19, 9, 0, 0).unwrap();

    let mut records = Vec::new();
    for i in 0..10 {
        records.push(play_at(
            monday_14 + chrono::Duration::seconds(i),
            "Artist Monday",
            "Track Monday",
            "mon-track",
        ));
    }
    for i in 0..5 {
        records.push(play_at(
            friday_9 + chrono::Duration::seconds(i),
            "Artist Friday",
            "Track Friday",
            "fri-track",
        ));
    }
    repo.batch_process(user_id, &records).await.unwrap();

    let heatmap = queries::listening_heatmap(&db.pool, user_id, 30).await.unwrap();
    assert_eq!(heatmap.total_plays, 15);
    assert_eq!(heatmap.peak_weekday, Some(0));
    assert_eq!(heatmap.peak_hour, Some(14));

    let monday_cell = heatmap
        .cells
        .iter()
        .find(|c| c.weekday == 0 && c.hour == 14)
        .expect("monday 14:00 cell present");
    assert_eq!(monday_cell.count, 10);

    let friday_cell = heatmap
        .cells
        .iter()
        .find(|c| c.weekday == 4 && c.hour == 9)
        .expect("friday 09:00 cell present");
    assert_eq!(friday_cell.count, 5);
}

/// Boundary behavior: a window with zero plays returns an all-empty grid
/// and `total_plays = 0`, not an error.
#[tokio::test]
async fn heatmap_over_empty_window_is_zero_not_error() {
    let db = TestDatabase::new().await;
    let user_id = db.create_user().await;

    let heatmap = queries::listening_heatmap(&db.pool, user_id, 7).await.unwrap();
    assert_eq!(heatmap.total_plays, 0);
    assert!(heatmap.cells.is_empty());
    assert!(heatmap.peak_weekday.is_none());
    assert!(heatmap.peak_hour.is_none());
}

/// Boundary behavior: coverage for a user with no plays returns zero
/// counts and null bounds, not an error.
#[tokio::test]
async fn coverage_with_no_plays_is_all_zero() {
    let db = TestDatabase::new().await;
    let user_id = db.create_user().await;

    let coverage = queries::coverage(&db.pool, user_id, 30).await.unwrap();
    assert_eq!(coverage.total_plays, 0);
    assert!(coverage.earliest_played_at.is_none());
    assert!(coverage.latest_played_at.is_none());
    assert_eq!(coverage.api_source_count, 0);
    assert_eq!(coverage.import_source_count, 0);
}

/// `top_artists` orders by play count descending, tie-broken by most
/// recent play.
#[tokio::test]
async fn top_artists_orders_by_count_then_recency() {
    let db = TestDatabase::new().await;
    let user_id = db.create_user().await;
    let repo = MusicRepository::new(db.pool.clone());

    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut records = Vec::new();
    // "Popular" gets 3 plays, "Rare" gets 1.
    for i in 0..3 {
        records.push(play_at(
            base + chrono::Duration::hours(i),
            "Popular",
            "Track",
            "popular-track",
        ));
    }
    records.push(play_at(base, "Rare", "Other Track", "rare-track"));
    repo.batch_process(user_id, &records).await.unwrap();

    let ranked = queries::top_artists(&db.pool, user_id, 30, 10).await.unwrap();
    assert_eq!(ranked[0].name, "Popular");
    assert_eq!(ranked[0].play_count, 3);
}

/// `days` must be a positive integer; non-positive values are
/// rejected as `InvalidArgument` before any query runs.
#[tokio::test]
async fn non_positive_days_window_is_rejected() {
    let db = TestDatabase::new().await;
    let user_id = db.create_user().await;

    let err = queries::coverage(&db.pool, user_id, 0).await.unwrap_err();
    assert!(matches!(
        err,
        spotify_history_collector::error::AppError::InvalidArgument(_)
    ));
}
