//! Music repository: idempotent upserts and play inserts.
//!
//! Uses runtime-checked `sqlx::query`/`query_as` rather than the `query!`
//! compile-time macro, so the crate builds without a live database or
//! `.sqlx` query cache.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::instrument;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{BatchOutcome, Identity, NormalizedPlay, SourceTag};

#[derive(Clone)]
pub struct MusicRepository {
    pool: PgPool,
}

impl MusicRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Looks up an artist by provider id (if present) else local id;
    /// updates its name on a hit, inserts otherwise. Returns the surrogate id.
    #[instrument(skip(self, tx))]
    async fn upsert_artist(
        tx: &mut Transaction<'_, Postgres>,
        name: &str,
        identity: &Identity,
        source: SourceTag,
    ) -> Result<Uuid> {
        let existing: Option<Uuid> = match identity {
            Identity::Provider(id) => {
                sqlx::query_scalar("SELECT id FROM artists WHERE provider_artist_id = $1")
                    .bind(id)
                    .fetch_optional(&mut **tx)
                    .await?
            }
            Identity::Local(id) => {
                sqlx::query_scalar("SELECT id FROM artists WHERE local_id = $1")
                    .bind(id)
                    .fetch_optional(&mut **tx)
                    .await?
            }
        };

        if let Some(id) = existing {
            sqlx::query("UPDATE artists SET name = $2, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(name)
                .execute(&mut **tx)
                .await?;
            return Ok(id);
        }

        let (provider_artist_id, local_id) = split_identity(identity);
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO artists (id, name, provider_artist_id, local_id, source, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, now(), now())
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(&provider_artist_id)
        .bind(&local_id)
        .bind(source.as_str())
        .execute(&mut **tx)
        .await?;

        // A concurrent insert may have won the unique index race; re-resolve.
        if let Some(provider_id) = &provider_artist_id {
            if let Some(winner) =
                sqlx::query_scalar::<_, Uuid>("SELECT id FROM artists WHERE provider_artist_id = $1")
                    .bind(provider_id)
                    .fetch_optional(&mut **tx)
                    .await?
            {
                return Ok(winner);
            }
        }
        if let Some(local) = &local_id {
            if let Some(winner) =
                sqlx::query_scalar::<_, Uuid>("SELECT id FROM artists WHERE local_id = $1")
                    .bind(local)
                    .fetch_optional(&mut **tx)
                    .await?
            {
                return Ok(winner);
            }
        }
        Ok(id)
    }

    /// Same pattern as [`Self::upsert_artist`], plus linking to its artists
    /// through the `track_artists` join table (repeated linking is a no-op).
    #[allow(clippy::too_many_arguments)]
    async fn upsert_track(
        tx: &mut Transaction<'_, Postgres>,
        name: &str,
        album_name: Option<&str>,
        duration_ms: Option<i64>,
        identity: &Identity,
        source: SourceTag,
        artist_ids: &[Uuid],
    ) -> Result<Uuid> {
        let existing: Option<Uuid> = match identity {
            Identity::Provider(id) => {
                sqlx::query_scalar("SELECT id FROM tracks WHERE provider_track_id = $1")
                    .bind(id)
                    .fetch_optional(&mut **tx)
                    .await?
            }
            Identity::Local(id) => {
                sqlx::query_scalar("SELECT id FROM tracks WHERE local_id = $1")
                    .bind(id)
                    .fetch_optional(&mut **tx)
                    .await?
            }
        };

        let track_id = if let Some(id) = existing {
            sqlx::query(
                "UPDATE tracks SET name = $2, album_name = COALESCE($3, album_name), \
                 duration_ms = COALESCE($4, duration_ms), updated_at = now() WHERE id = $1",
            )
            .bind(id)
            .bind(name)
            .bind(album_name)
            .bind(duration_ms)
            .execute(&mut **tx)
            .await?;
            id
        } else {
            let (provider_track_id, local_id) = split_identity(identity);
            let id = Uuid::new_v4();
            sqlx::query(
                r#"
                INSERT INTO tracks (id, name, provider_track_id, local_id, album_name, duration_ms, source, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, now(), now())
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(id)
            .bind(name)
            .bind(&provider_track_id)
            .bind(&local_id)
            .bind(album_name)
            .bind(duration_ms)
            .bind(source.as_str())
            .execute(&mut **tx)
            .await?;

            let mut resolved = id;
            if let Some(provider_id) = &provider_track_id {
                if let Some(winner) = sqlx::query_scalar::<_, Uuid>(
                    "SELECT id FROM tracks WHERE provider_track_id = $1",
                )
                .bind(provider_id)
                .fetch_optional(&mut **tx)
                .await?
                {
                    resolved = winner;
                }
            } else if let Some(local) = &local_id {
                if let Some(winner) =
                    sqlx::query_scalar::<_, Uuid>("SELECT id FROM tracks WHERE local_id = $1")
                        .bind(local)
                        .fetch_optional(&mut **tx)
                        .await?
                {
                    resolved = winner;
                }
            }
            resolved
        };

        for artist_id in artist_ids {
            sqlx::query(
                "INSERT INTO track_artists (track_id, artist_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(track_id)
            .bind(artist_id)
            .execute(&mut **tx)
            .await?;
        }

        Ok(track_id)
    }

    /// Inserts one play; a unique-violation on `(user_id, played_at, track_id)`
    /// is swallowed and reported as skipped.
    async fn insert_play(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        track_id: Uuid,
        played_at: DateTime<Utc>,
        ms_played: i64,
        source: SourceTag,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO plays (id, user_id, track_id, played_at, ms_played, source)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT ON CONSTRAINT plays_unique_event DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(track_id)
        .bind(played_at)
        .bind(ms_played)
        .bind(source.as_str())
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Commits one batch of normalized plays in a single transaction.
    /// A crash mid-batch loses only this batch; re-running converges
    /// because of play uniqueness.
    #[instrument(skip(self, records), fields(user_id = %user_id, batch_len = records.len()))]
    pub async fn batch_process(
        &self,
        user_id: Uuid,
        records: &[NormalizedPlay],
    ) -> Result<BatchOutcome> {
        let mut tx = self.pool.begin().await?;
        let mut outcome = BatchOutcome::default();

        for record in records {
            let artist_identity = crate::models::artist_identity(
                record.provider_artist_id.as_deref(),
                &record.artist_name,
            );
            let artist_id = Self::upsert_artist(
                &mut tx,
                &record.artist_name,
                &artist_identity,
                record.source,
            )
            .await?;

            let track_identity = crate::models::track_identity(
                record.provider_track_id.as_deref(),
                &record.artist_name,
                &record.track_name,
                &record.album_name,
            );
            let track_id = Self::upsert_track(
                &mut tx,
                &record.track_name,
                Some(record.album_name.as_str()).filter(|s| !s.is_empty()),
                record.duration_ms,
                &track_identity,
                record.source,
                &[artist_id],
            )
            .await?;

            let inserted = Self::insert_play(
                &mut tx,
                user_id,
                track_id,
                record.played_at,
                record.ms_played,
                record.source,
            )
            .await?;

            outcome.observe(record.played_at, inserted);
        }

        tx.commit().await?;
        Ok(outcome)
    }
}

fn split_identity(identity: &Identity) -> (Option<String>, Option<String>) {
    match identity {
        Identity::Provider(id) => (Some(id.clone()), None),
        Identity::Local(id) => (None, Some(id.clone())),
    }
}
