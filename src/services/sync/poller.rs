//! Single-call incremental poller: one `recently_played` request per cycle
//! per user, no cursor. Overlap with the previous poll is resolved by the
//! repository's play-uniqueness constraint, not by this service.

use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::JobType;
use crate::services::checkpoint::CheckpointStore;
use crate::services::job_ledger::JobLedger;
use crate::services::repository::MusicRepository;
use crate::services::spotify::{normalize_page, SpotifyClient};

pub struct PollOutcome {
    pub fetched: u64,
    pub inserted: u64,
    pub skipped: u64,
    pub latest_played_at: Option<chrono::DateTime<chrono::Utc>>,
}

pub struct Poller {
    repository: MusicRepository,
    checkpoint: CheckpointStore,
    job_ledger: JobLedger,
}

impl Poller {
    pub fn new(repository: MusicRepository, checkpoint: CheckpointStore, job_ledger: JobLedger) -> Self {
        Self {
            repository,
            checkpoint,
            job_ledger,
        }
    }

    pub async fn run(&self, user_id: Uuid, client: &SpotifyClient) -> Result<PollOutcome> {
        let job = self.job_ledger.begin(user_id, JobType::Poll).await?;
        self.checkpoint.mark_poll_started(user_id).await?;

        match self.run_inner(user_id, client).await {
            Ok(outcome) => {
                self.job_ledger
                    .finish(
                        job.id,
                        outcome.fetched as i64,
                        outcome.inserted as i64,
                        outcome.skipped as i64,
                    )
                    .await?;
                self.checkpoint
                    .mark_poll_completed(user_id, outcome.latest_played_at)
                    .await?;
                Ok(outcome)
            }
            // A budgeted run of consecutive 429s is a clean stop here too,
            // not a fatal error: the cycle ends with whatever progress was
            // made, and the checkpoint returns to idle so the next cycle
            // retries rather than sitting in `error` needing re-authorization.
            Err(AppError::RateLimited(_)) => {
                self.job_ledger.finish(job.id, 0, 0, 0).await?;
                self.checkpoint.mark_poll_completed(user_id, None).await?;
                Ok(PollOutcome {
                    fetched: 0,
                    inserted: 0,
                    skipped: 0,
                    latest_played_at: None,
                })
            }
            Err(err) => {
                self.job_ledger.fail(job.id, &err.to_string()).await?;
                self.checkpoint.mark_error(user_id, &err.to_string()).await?;
                Err(err)
            }
        }
    }

    async fn run_inner(&self, user_id: Uuid, client: &SpotifyClient) -> Result<PollOutcome> {
        let page = client.recently_played(None, 50).await?;
        let fetched = page.items.len() as u64;
        let records = normalize_page(&page.items);
        let outcome = self.repository.batch_process(user_id, &records).await?;

        Ok(PollOutcome {
            fetched,
            inserted: outcome.inserted,
            skipped: outcome.skipped,
            latest_played_at: outcome.latest_played_at,
        })
    }
}
