//! Start/complete/fail records for every worker unit.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{JobRun, JobStatus, JobType};

#[derive(Clone)]
pub struct JobLedger {
    pool: PgPool,
}

impl JobLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn begin(&self, user_id: Uuid, job_type: JobType) -> Result<JobRun> {
        let job = JobRun::start(user_id, job_type);
        sqlx::query(
            r#"
            INSERT INTO job_runs (id, user_id, job_type, status, started_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(job.id)
        .bind(job.user_id)
        .bind(&job.job_type)
        .bind(&job.status)
        .bind(job.started_at)
        .execute(&self.pool)
        .await?;
        Ok(job)
    }

    pub async fn finish(&self, job_id: Uuid, fetched: i64, inserted: i64, skipped: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE job_runs
            SET status = $2, completed_at = now(), fetched_count = $3, inserted_count = $4, skipped_count = $5
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(JobStatus::Success.to_string())
        .bind(fetched)
        .bind(inserted)
        .bind(skipped)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fail(&self, job_id: Uuid, error_message: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE job_runs
            SET status = $2, completed_at = now(), error_message = $3
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(JobStatus::Error.to_string())
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn latest_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<JobRun>> {
        let rows = sqlx::query_as::<_, JobRun>(
            "SELECT * FROM job_runs WHERE user_id = $1 ORDER BY started_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
