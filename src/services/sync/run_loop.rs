//! The collector's single cooperative run loop: claim pending imports,
//! initial-sync users who haven't completed backfill, poll every active
//! user, sleep, repeat.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use sqlx::PgPool;
use tokio::sync::{Mutex, Semaphore};
use uuid::Uuid;

use crate::config::{CollectorConfig, InitialSyncConfig};
use crate::error::Result;
use crate::models::{CheckpointStatus, ImportJob, ImportStatus};
use crate::services::checkpoint::CheckpointStore;
use crate::services::importer::ZipImporter;
use crate::services::spotify::{SpotifyAuth, SpotifyClient, TokenRefresher};

use super::initial_sync::InitialSyncService;
use super::poller::Poller;

/// Keyed lock map serializing all work touching one user. Entries are
/// never removed: one mutex per user for the process lifetime, which is
/// cheap at this scale.
#[derive(Clone, Default)]
pub struct UserLocks(Arc<DashMap<Uuid, Arc<Mutex<()>>>>);

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        self.0.entry(user_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    pub async fn with_lock<F, Fut, T>(&self, user_id: Uuid, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let handle = self.handle(user_id);
        let _guard = handle.lock().await;
        f().await
    }
}

/// Shared cancellation flag: set on shutdown, checked at every suspension
/// point. In-flight batch commits finish, new ones don't start.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct RunLoop {
    pool: PgPool,
    checkpoint: CheckpointStore,
    importer: ZipImporter,
    spotify_auth: Arc<SpotifyAuth>,
    initial_sync: InitialSyncService,
    poller: Poller,
    user_locks: UserLocks,
    collector: CollectorConfig,
    initial_sync_semaphore: Arc<Semaphore>,
}

impl RunLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        checkpoint: CheckpointStore,
        importer: ZipImporter,
        spotify_auth: Arc<SpotifyAuth>,
        initial_sync: InitialSyncService,
        poller: Poller,
        collector: CollectorConfig,
        initial_sync_config: InitialSyncConfig,
    ) -> Self {
        Self {
            pool,
            checkpoint,
            importer,
            spotify_auth,
            initial_sync,
            poller,
            user_locks: UserLocks::new(),
            collector,
            initial_sync_semaphore: Arc::new(Semaphore::new(initial_sync_config.concurrency)),
        }
    }

    /// Runs cycles forever until `cancel` is observed between cycles.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                tracing::info!("run loop stopping: cancellation observed before cycle start");
                return;
            }

            if let Err(err) = self.run_cycle(&cancel).await {
                tracing::error!(error = %err, "run loop cycle failed unexpectedly");
            }

            if cancel.is_cancelled() {
                return;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.collector.interval) => {}
                _ = wait_for_cancel(&cancel) => {}
            }
        }
    }

    #[tracing::instrument(skip(self, cancel))]
    async fn run_cycle(&self, cancel: &CancellationToken) -> Result<()> {
        self.process_pending_imports(cancel).await?;
        if cancel.is_cancelled() {
            return Ok(());
        }

        let user_ids = self.list_user_ids().await?;
        if !cancel.is_cancelled() {
            stream::iter(user_ids.iter().copied())
                .for_each_concurrent(None, |user_id| self.sync_one_user(user_id))
                .await;
        }

        for user_id in &user_ids {
            if cancel.is_cancelled() {
                return Ok(());
            }
            self.poll_one_user(*user_id).await;
        }

        Ok(())
    }

    /// Step 1: at most one pending import processed per cycle.
    async fn process_pending_imports(&self, cancel: &CancellationToken) -> Result<()> {
        let Some(mut job) = self.claim_pending_import().await? else {
            return Ok(());
        };
        if cancel.is_cancelled() {
            return Ok(());
        }

        let user_locks = self.user_locks.clone();
        let user_id = job.user_id;
        user_locks
            .with_lock(user_id, || async {
                if let Err(err) = self.importer.run(&mut job).await {
                    tracing::warn!(user_id = %user_id, error = %err, "import job failed");
                }
                self.persist_import_job(&job).await
            })
            .await?;
        Ok(())
    }

    async fn claim_pending_import(&self) -> Result<Option<ImportJob>> {
        let mut tx = self.pool.begin().await?;
        let job = sqlx::query_as::<_, ImportJob>(
            "SELECT * FROM import_jobs WHERE status = $1 ORDER BY created_at ASC LIMIT 1 FOR UPDATE SKIP LOCKED",
        )
        .bind(ImportStatus::Pending.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(job) = &job {
            sqlx::query("UPDATE import_jobs SET status = $2, updated_at = now() WHERE id = $1")
                .bind(job.id)
                .bind(ImportStatus::Processing.as_str())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(job)
    }

    async fn persist_import_job(&self, job: &ImportJob) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE import_jobs
            SET status = $2, detected_format = $3, records_ingested = $4,
                earliest_played_at = $5, latest_played_at = $6, error_message = $7, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(&job.status)
        .bind(&job.detected_format)
        .bind(job.records_ingested)
        .bind(job.earliest_played_at)
        .bind(job.latest_played_at)
        .bind(&job.error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Step 2: initial sync for users whose backfill hasn't completed yet,
    /// bounded by `INITIAL_SYNC_CONCURRENCY` concurrent users.
    async fn sync_one_user(&self, user_id: Uuid) {
        if !self.collector.initial_sync_enabled {
            return;
        }
        let checkpoint = match self.checkpoint.get_or_create(user_id).await {
            Ok(c) => c,
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "failed to load checkpoint");
                return;
            }
        };
        if checkpoint.status == CheckpointStatus::Paused.to_string() || checkpoint.initial_sync_complete() {
            return;
        }

        let Some(client) = self.client_for(user_id).await else {
            return;
        };

        let Ok(_permit) = self.initial_sync_semaphore.clone().acquire_owned().await else {
            return;
        };

        let user_locks = self.user_locks.clone();
        user_locks
            .with_lock(user_id, || async {
                match self.initial_sync.run(user_id, &client).await {
                    Ok(outcome) => tracing::info!(
                        user_id = %user_id,
                        reason = outcome.reason.as_str(),
                        requests = outcome.requests,
                        inserted = outcome.totals.inserted,
                        "initial sync finished"
                    ),
                    Err(err) => tracing::warn!(user_id = %user_id, error = %err, "initial sync failed"),
                }
            })
            .await;
    }

    /// Step 3: incremental poll for every non-paused user.
    async fn poll_one_user(&self, user_id: Uuid) {
        let checkpoint = match self.checkpoint.get_or_create(user_id).await {
            Ok(c) => c,
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "failed to load checkpoint");
                return;
            }
        };
        if checkpoint.status == CheckpointStatus::Paused.to_string() {
            return;
        }

        let Some(client) = self.client_for(user_id).await else {
            return;
        };

        let user_locks = self.user_locks.clone();
        user_locks
            .with_lock(user_id, || async {
                match self.poller.run(user_id, &client).await {
                    Ok(outcome) => tracing::info!(
                        user_id = %user_id,
                        fetched = outcome.fetched,
                        inserted = outcome.inserted,
                        "poll finished"
                    ),
                    Err(err) => tracing::warn!(user_id = %user_id, error = %err, "poll failed"),
                }
            })
            .await;
    }

    async fn client_for(&self, user_id: Uuid) -> Option<SpotifyClient> {
        let lease = match self.spotify_auth.current_lease(user_id).await {
            Ok(lease) => lease,
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "no usable spotify credential");
                let _ = self.checkpoint.mark_error(user_id, &err.to_string()).await;
                return None;
            }
        };
        let semaphore = Arc::new(Semaphore::new(self.collector.spotify_concurrency));
        let refresher: Arc<dyn TokenRefresher> = self.spotify_auth.clone();
        Some(SpotifyClient::with_api_base(
            user_id,
            self.collector.spotify_api_base.clone(),
            lease,
            refresher,
            semaphore,
            self.collector.rate_limit_budget,
        ))
    }

    async fn list_user_ids(&self) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM users ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

async fn wait_for_cancel(cancel: &CancellationToken) {
    loop {
        if cancel.is_cancelled() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }
}
