//! Checkpoint-store tests against a disposable Postgres instance: creation,
//! monotonic advancement, and error-state transitions.

mod common;

use chrono::{TimeZone, Utc};

use spotify_history_collector::models::CheckpointStatus;
use spotify_history_collector::services::checkpoint::CheckpointStore;

use common::TestDatabase;

#[tokio::test]
async fn get_or_create_is_idempotent_and_starts_idle() {
    let db = TestDatabase::new().await;
    let user_id = db.create_user().await;
    let store = CheckpointStore::new(db.pool.clone());

    let first = store.get_or_create(user_id).await.unwrap();
    assert_eq!(first.status, CheckpointStatus::Idle.to_string());
    assert!(first.last_poll_latest_played_at.is_none());

    let second = store.get_or_create(user_id).await.unwrap();
    assert_eq!(first.user_id, second.user_id);

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sync_checkpoints WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert_eq!(count.0, 1);
}

/// Spec §8 property 3: after any successful poll, `last_poll_latest_played_at`
/// never moves backward.
#[tokio::test]
async fn last_poll_latest_played_at_never_regresses() {
    let db = TestDatabase::new().await;
    let user_id = db.create_user().await;
    let store = CheckpointStore::new(db.pool.clone());
    store.get_or_create(user_id).await.unwrap();

    let later = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let earlier = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    store.mark_poll_completed(user_id, Some(later)).await.unwrap();
    let checkpoint = store.get(user_id).await.unwrap().unwrap();
    assert_eq!(checkpoint.last_poll_latest_played_at, Some(later));

    // A subsequent poll observing only older plays (e.g. overlap with a
    // prior page) must not regress the bookmark.
    store.mark_poll_completed(user_id, Some(earlier)).await.unwrap();
    let checkpoint = store.get(user_id).await.unwrap().unwrap();
    assert_eq!(checkpoint.last_poll_latest_played_at, Some(later));
}

/// The very first poll, with nothing to compare against, still sets the
/// bookmark (NULL is never "greater" than a real instant in the other
/// direction either).
#[tokio::test]
async fn first_poll_sets_bookmark_from_null() {
    let db = TestDatabase::new().await;
    let user_id = db.create_user().await;
    let store = CheckpointStore::new(db.pool.clone());
    store.get_or_create(user_id).await.unwrap();

    let first_seen = Utc.with_ymd_and_hms(2024, 3, 3, 3, 0, 0).unwrap();
    store.mark_poll_completed(user_id, Some(first_seen)).await.unwrap();

    let checkpoint = store.get(user_id).await.unwrap().unwrap();
    assert_eq!(checkpoint.last_poll_latest_played_at, Some(first_seen));
    assert_eq!(checkpoint.status, CheckpointStatus::Idle.to_string());
}

/// `mark_error` flips status to `error` and records the diagnostic message;
/// a later successful poll clears it again.
#[tokio::test]
async fn mark_error_then_recover_clears_message() {
    let db = TestDatabase::new().await;
    let user_id = db.create_user().await;
    let store = CheckpointStore::new(db.pool.clone());
    store.get_or_create(user_id).await.unwrap();

    store.mark_error(user_id, "AuthExpired: refresh failed").await.unwrap();
    let checkpoint = store.get(user_id).await.unwrap().unwrap();
    assert_eq!(checkpoint.status, CheckpointStatus::Error.to_string());
    assert_eq!(checkpoint.error_message.as_deref(), Some("AuthExpired: refresh failed"));

    store.mark_poll_completed(user_id, None).await.unwrap();
    let checkpoint = store.get(user_id).await.unwrap().unwrap();
    assert_eq!(checkpoint.status, CheckpointStatus::Idle.to_string());
    assert!(checkpoint.error_message.is_none());
}

/// Initial-sync completion advances `initial_sync_earliest_played_at` only
/// toward the past (`LEAST`), mirroring the poll side's `GREATEST`.
#[tokio::test]
async fn initial_sync_completed_tracks_earliest_seen() {
    let db = TestDatabase::new().await;
    let user_id = db.create_user().await;
    let store = CheckpointStore::new(db.pool.clone());
    store.get_or_create(user_id).await.unwrap();

    let day_10 = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
    store.mark_initial_sync_started(user_id).await.unwrap();
    store
        .mark_initial_sync_completed(user_id, Some(day_10))
        .await
        .unwrap();

    let checkpoint = store.get(user_id).await.unwrap().unwrap();
    assert_eq!(checkpoint.initial_sync_earliest_played_at, Some(day_10));
    assert!(checkpoint.initial_sync_completed_at.is_some());
    assert_eq!(checkpoint.status, CheckpointStatus::Idle.to_string());
}
