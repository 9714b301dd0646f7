//! Best-effort backward-paging backfill over `recently_played`: a bounded,
//! cursor-driven pull loop walking Spotify's `before`-cursor play history
//! back from now until one of five stop conditions fires.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use uuid::Uuid;

use crate::config::InitialSyncConfig;
use crate::error::{AppError, Result};
use crate::models::{BatchOutcome, JobType};
use crate::services::checkpoint::CheckpointStore;
use crate::services::job_ledger::JobLedger;
use crate::services::repository::MusicRepository;
use crate::services::spotify::{normalize_page, SpotifyClient};

/// Why the backward pager stopped. Every variant other than a propagated
/// error is a clean stop: the checkpoint still gets marked complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    RequestCap,
    Empty,
    NoProgress,
    MaxDays,
    RateLimited,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::RequestCap => "request_cap",
            StopReason::Empty => "empty",
            StopReason::NoProgress => "no_progress",
            StopReason::MaxDays => "max_days",
            StopReason::RateLimited => "rate_limited",
        }
    }
}

pub struct InitialSyncOutcome {
    pub reason: StopReason,
    pub requests: u32,
    pub earliest_seen: Option<DateTime<Utc>>,
    pub totals: BatchOutcome,
}

pub struct InitialSyncService {
    repository: MusicRepository,
    checkpoint: CheckpointStore,
    job_ledger: JobLedger,
    config: InitialSyncConfig,
}

impl InitialSyncService {
    pub fn new(
        repository: MusicRepository,
        checkpoint: CheckpointStore,
        job_ledger: JobLedger,
        config: InitialSyncConfig,
    ) -> Self {
        Self {
            repository,
            checkpoint,
            job_ledger,
            config,
        }
    }

    /// Runs the backward pager for one user to completion (one of the five
    /// stop conditions) or a fatal error. On any clean stop the checkpoint
    /// is updated here; on a fatal error the caller is responsible for
    /// recording `checkpoint.mark_error` (the run loop does this uniformly
    /// for every job kind).
    pub async fn run(&self, user_id: Uuid, client: &SpotifyClient) -> Result<InitialSyncOutcome> {
        let job = self.job_ledger.begin(user_id, JobType::InitialSync).await?;
        self.checkpoint.mark_initial_sync_started(user_id).await?;

        match self.run_inner(user_id, client).await {
            Ok(outcome) => {
                self.job_ledger
                    .finish(
                        job.id,
                        (outcome.totals.inserted + outcome.totals.skipped) as i64,
                        outcome.totals.inserted as i64,
                        outcome.totals.skipped as i64,
                    )
                    .await?;
                self.checkpoint
                    .mark_initial_sync_completed(user_id, outcome.earliest_seen)
                    .await?;
                Ok(outcome)
            }
            Err(err) => {
                self.job_ledger.fail(job.id, &err.to_string()).await?;
                self.checkpoint.mark_error(user_id, &err.to_string()).await?;
                Err(err)
            }
        }
    }

    async fn run_inner(&self, user_id: Uuid, client: &SpotifyClient) -> Result<InitialSyncOutcome> {
        let mut cursor_ms: i64 = Utc::now().timestamp_millis();
        let mut prev_oldest: Option<DateTime<Utc>> = None;
        let mut earliest_seen: Option<DateTime<Utc>> = None;
        let mut requests: u32 = 0;
        let mut totals = BatchOutcome::default();
        let max_age = ChronoDuration::days(self.config.max_days);

        loop {
            if requests >= self.config.max_requests {
                return Ok(InitialSyncOutcome {
                    reason: StopReason::RequestCap,
                    requests,
                    earliest_seen,
                    totals,
                });
            }

            let page = match client.recently_played(Some(cursor_ms), 50).await {
                Ok(page) => page,
                Err(AppError::RateLimited(_)) => {
                    return Ok(InitialSyncOutcome {
                        reason: StopReason::RateLimited,
                        requests,
                        earliest_seen,
                        totals,
                    })
                }
                Err(err) => return Err(err),
            };
            requests += 1;

            if page.items.is_empty() {
                return Ok(InitialSyncOutcome {
                    reason: StopReason::Empty,
                    requests,
                    earliest_seen,
                    totals,
                });
            }

            let records = normalize_page(&page.items);
            let batch_outcome = self.repository.batch_process(user_id, &records).await?;
            let min_pa = batch_outcome.earliest_played_at;
            totals.merge(batch_outcome);

            earliest_seen = min_opt(earliest_seen, min_pa);

            let min_pa = match min_pa {
                Some(pa) => pa,
                None => {
                    return Ok(InitialSyncOutcome {
                        reason: StopReason::Empty,
                        requests,
                        earliest_seen,
                        totals,
                    })
                }
            };

            if let Some(prev) = prev_oldest {
                if min_pa >= prev {
                    return Ok(InitialSyncOutcome {
                        reason: StopReason::NoProgress,
                        requests,
                        earliest_seen,
                        totals,
                    });
                }
            }
            prev_oldest = Some(min_pa);

            if Utc::now() - min_pa >= max_age {
                return Ok(InitialSyncOutcome {
                    reason: StopReason::MaxDays,
                    requests,
                    earliest_seen,
                    totals,
                });
            }

            cursor_ms = min_pa.timestamp_millis() - 1;
        }
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
