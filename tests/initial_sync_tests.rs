//! `InitialSyncService` stop-condition tests, built on the same
//! wiremock-backed-client pattern as `tests/spotify_client_tests.rs`: stub
//! the upstream, drive the real pager against it, assert on the reported
//! [`StopReason`].

mod common;

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use spotify_history_collector::config::InitialSyncConfig;
use spotify_history_collector::models::AccessTokenLease;
use spotify_history_collector::services::checkpoint::CheckpointStore;
use spotify_history_collector::services::job_ledger::JobLedger;
use spotify_history_collector::services::repository::MusicRepository;
use spotify_history_collector::services::spotify::{SpotifyClient, TokenRefresher};
use spotify_history_collector::services::sync::{InitialSyncService, StopReason};

use common::TestDatabase;

struct NeverRefresh;

#[async_trait::async_trait]
impl TokenRefresher for NeverRefresh {
    async fn refresh(&self, _user_id: Uuid) -> spotify_history_collector::error::Result<AccessTokenLease> {
        panic!("initial sync pages should never need a token refresh in these tests");
    }
}

fn client_against(server: &MockServer, rate_limit_budget: u32) -> SpotifyClient {
    SpotifyClient::with_api_base(
        Uuid::new_v4(),
        server.uri(),
        AccessTokenLease {
            token: "a-token".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        },
        Arc::new(NeverRefresh),
        Arc::new(tokio::sync::Semaphore::new(4)),
        rate_limit_budget,
    )
}

fn recently_played_page(played_at: chrono::DateTime<Utc>, track_id: &str) -> serde_json::Value {
    json!({
        "items": [
            {
                "played_at": played_at.to_rfc3339(),
                "track": {
                    "id": track_id,
                    "name": format!("Track {track_id}"),
                    "duration_ms": 200_000,
                    "album": {"name": "Album"},
                    "artists": [{"id": "artist-1", "name": "Artist"}]
                }
            }
        ],
        "cursors": {}
    })
}

fn empty_page() -> serde_json::Value {
    json!({"items": [], "cursors": {}})
}

fn service(db: &TestDatabase, config: InitialSyncConfig) -> InitialSyncService {
    InitialSyncService::new(
        MusicRepository::new(db.pool.clone()),
        CheckpointStore::new(db.pool.clone()),
        JobLedger::new(db.pool.clone()),
        config,
    )
}

fn default_config() -> InitialSyncConfig {
    InitialSyncConfig {
        max_days: 30,
        max_requests: 200,
        rate_limit_budget: 5,
        concurrency: 2,
    }
}

/// An empty first page stops the pager immediately with `StopReason::Empty`.
/// There is no history to page through at all.
#[tokio::test]
async fn empty_first_page_stops_with_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me/player/recently-played"))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_page()))
        .expect(1)
        .mount(&server)
        .await;

    let db = TestDatabase::new().await;
    let user_id = db.create_user().await;
    let client = client_against(&server, 5);
    let svc = service(&db, default_config());

    let outcome = svc.run(user_id, &client).await.expect("clean stop, not an error");
    assert_eq!(outcome.reason, StopReason::Empty);
    assert_eq!(outcome.requests, 1);
    assert_eq!(outcome.totals.inserted, 0);
}

/// S2: the second page reports the same oldest `played_at` as the first
/// (the API returned an overlapping page rather than moving the cursor
/// back), which the pager detects as `StopReason::NoProgress` rather than
/// looping on the same page forever.
#[tokio::test]
async fn repeated_oldest_timestamp_stops_with_no_progress() {
    let server = MockServer::start().await;
    let played_at = Utc::now() - ChronoDuration::days(2);

    Mock::given(method("GET"))
        .and(path("/me/player/recently-played"))
        .respond_with(ResponseTemplate::new(200).set_body_json(recently_played_page(played_at, "track-a")))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/me/player/recently-played"))
        .respond_with(ResponseTemplate::new(200).set_body_json(recently_played_page(played_at, "track-a")))
        .expect(1)
        .mount(&server)
        .await;

    let db = TestDatabase::new().await;
    let user_id = db.create_user().await;
    let client = client_against(&server, 5);
    let svc = service(&db, default_config());

    let outcome = svc.run(user_id, &client).await.expect("clean stop, not an error");
    assert_eq!(outcome.reason, StopReason::NoProgress);
    assert_eq!(outcome.requests, 2);
}

/// A page whose oldest play already falls outside `MAX_DAYS` stops the
/// pager with `StopReason::MaxDays` on the very first page: the backfill
/// has reached its configured horizon.
#[tokio::test]
async fn play_older_than_max_days_stops_with_max_days() {
    let server = MockServer::start().await;
    let ancient = Utc::now() - ChronoDuration::days(400);

    Mock::given(method("GET"))
        .and(path("/me/player/recently-played"))
        .respond_with(ResponseTemplate::new(200).set_body_json(recently_played_page(ancient, "track-old")))
        .expect(1)
        .mount(&server)
        .await;

    let db = TestDatabase::new().await;
    let user_id = db.create_user().await;
    let client = client_against(&server, 5);
    let svc = service(
        &db,
        InitialSyncConfig {
            max_days: 30,
            ..default_config()
        },
    );

    let outcome = svc.run(user_id, &client).await.expect("clean stop, not an error");
    assert_eq!(outcome.reason, StopReason::MaxDays);
    assert_eq!(outcome.requests, 1);
    assert_eq!(outcome.totals.inserted, 1);
}

/// Spec §8 property 4 (initial-sync boundedness): once the pager has spent
/// `MAX_REQUESTS` calls, it stops with `StopReason::RequestCap` rather than
/// paging forever, even if every page still makes progress.
#[tokio::test]
async fn request_cap_stops_pager_even_when_still_making_progress() {
    let server = MockServer::start().await;
    let recent = Utc::now() - ChronoDuration::days(1);

    Mock::given(method("GET"))
        .and(path("/me/player/recently-played"))
        .respond_with(ResponseTemplate::new(200).set_body_json(recently_played_page(recent, "track-a")))
        .expect(1)
        .mount(&server)
        .await;

    let db = TestDatabase::new().await;
    let user_id = db.create_user().await;
    let client = client_against(&server, 5);
    let svc = service(
        &db,
        InitialSyncConfig {
            max_requests: 1,
            ..default_config()
        },
    );

    let outcome = svc.run(user_id, &client).await.expect("clean stop, not an error");
    assert_eq!(outcome.reason, StopReason::RequestCap);
    assert_eq!(outcome.requests, 1);
}

/// A consecutive-429 budget exhaustion during the pager surfaces as
/// `StopReason::RateLimited`, a clean stop rather than a propagated error.
#[tokio::test]
async fn rate_limit_budget_exhaustion_stops_with_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me/player/recently-played"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"status": 429, "message": "rate limited"}
        })))
        .mount(&server)
        .await;

    let db = TestDatabase::new().await;
    let user_id = db.create_user().await;
    let client = client_against(&server, 2);
    let svc = service(&db, default_config());

    let outcome = svc.run(user_id, &client).await.expect("clean stop, not an error");
    assert_eq!(outcome.reason, StopReason::RateLimited);
}
