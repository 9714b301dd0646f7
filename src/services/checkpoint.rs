//! Per-user sync checkpoint store. All mutations flush immediately and
//! atomically: each method is a single UPDATE/UPSERT.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{CheckpointStatus, SyncCheckpoint};

#[derive(Clone)]
pub struct CheckpointStore {
    pool: PgPool,
}

impl CheckpointStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_or_create(&self, user_id: Uuid) -> Result<SyncCheckpoint> {
        if let Some(existing) = self.get(user_id).await? {
            return Ok(existing);
        }

        let fresh = SyncCheckpoint::fresh(user_id);
        sqlx::query(
            r#"
            INSERT INTO sync_checkpoints (user_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(fresh.user_id)
        .bind(&fresh.status)
        .bind(fresh.created_at)
        .bind(fresh.updated_at)
        .execute(&self.pool)
        .await?;

        self.get(user_id)
            .await?
            .ok_or_else(|| crate::error::AppError::Internal("checkpoint insert raced and lost".to_string()))
    }

    pub async fn get(&self, user_id: Uuid) -> Result<Option<SyncCheckpoint>> {
        let row = sqlx::query_as::<_, SyncCheckpoint>(
            "SELECT * FROM sync_checkpoints WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn set_status(&self, user_id: Uuid, status: CheckpointStatus) -> Result<()> {
        sqlx::query("UPDATE sync_checkpoints SET status = $2, updated_at = now() WHERE user_id = $1")
            .bind(user_id)
            .bind(status.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_initial_sync_started(&self, user_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sync_checkpoints
            SET status = $2, initial_sync_started_at = now(), updated_at = now()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(CheckpointStatus::Syncing.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Records completion for any non-fatal stop reason:
    /// `initial_sync_completed_at = now`, `earliest_played_at` advanced to
    /// whatever the pager saw, status returns to `idle`.
    pub async fn mark_initial_sync_completed(
        &self,
        user_id: Uuid,
        earliest_played_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sync_checkpoints
            SET status = $2,
                initial_sync_completed_at = now(),
                initial_sync_earliest_played_at = LEAST(initial_sync_earliest_played_at, $3),
                error_message = NULL,
                updated_at = now()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(CheckpointStatus::Idle.to_string())
        .bind(earliest_played_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_poll_started(&self, user_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sync_checkpoints
            SET status = $2, last_poll_started_at = now(), updated_at = now()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(CheckpointStatus::Syncing.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Advances `last_poll_latest_played_at` only if `latest` is strictly
    /// newer than the current value. `GREATEST` in Postgres ignores NULL
    /// operands, so this is safe on the very first poll too.
    pub async fn mark_poll_completed(&self, user_id: Uuid, latest: Option<DateTime<Utc>>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sync_checkpoints
            SET status = $2,
                last_poll_completed_at = now(),
                last_poll_latest_played_at = GREATEST(last_poll_latest_played_at, $3),
                error_message = NULL,
                updated_at = now()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(CheckpointStatus::Idle.to_string())
        .bind(latest)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_error(&self, user_id: Uuid, message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE sync_checkpoints SET status = $2, error_message = $3, updated_at = now() WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(CheckpointStatus::Error.to_string())
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
