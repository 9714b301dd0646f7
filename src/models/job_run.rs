use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of background work a [`JobRun`] recorded. `Enrich` has no
/// producer yet; the variant is kept so the ledger's domain matches the
/// data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum JobType {
    Import,
    InitialSync,
    Poll,
    Enrich,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Import => "import",
            JobType::InitialSync => "initial_sync",
            JobType::Poll => "poll",
            JobType::Enrich => "enrich",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Success,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One execution of a sync or import job against one user, recorded for
/// observability and for `ops.latest_job_runs`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobRun {
    pub id: Uuid,
    pub user_id: Uuid,
    pub job_type: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub fetched_count: i64,
    pub inserted_count: i64,
    pub skipped_count: i64,
    pub error_message: Option<String>,
}

impl JobRun {
    pub fn start(user_id: Uuid, job_type: JobType) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            job_type: job_type.to_string(),
            status: JobStatus::Running.to_string(),
            started_at: Utc::now(),
            completed_at: None,
            fetched_count: 0,
            inserted_count: 0,
            skipped_count: 0,
            error_message: None,
        }
    }
}
