use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-user sync state. Deliberately distinct from [`crate::models::JobStatus`]:
/// a checkpoint describes the user's standing ("are we caught up, or did the
/// last attempt fail"), while a job run describes one execution ("did this
/// particular poll succeed"). Collapsing the two would let a single failed
/// poll permanently wedge a user who is otherwise healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum CheckpointStatus {
    Idle,
    Paused,
    Syncing,
    Error,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::Idle => "idle",
            CheckpointStatus::Paused => "paused",
            CheckpointStatus::Syncing => "syncing",
            CheckpointStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SyncCheckpoint {
    pub user_id: Uuid,
    pub status: String,
    pub initial_sync_started_at: Option<DateTime<Utc>>,
    pub initial_sync_completed_at: Option<DateTime<Utc>>,
    pub initial_sync_earliest_played_at: Option<DateTime<Utc>>,
    pub last_poll_started_at: Option<DateTime<Utc>>,
    pub last_poll_completed_at: Option<DateTime<Utc>>,
    pub last_poll_latest_played_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncCheckpoint {
    pub fn fresh(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            status: CheckpointStatus::Idle.to_string(),
            initial_sync_started_at: None,
            initial_sync_completed_at: None,
            initial_sync_earliest_played_at: None,
            last_poll_started_at: None,
            last_poll_completed_at: None,
            last_poll_latest_played_at: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn initial_sync_complete(&self) -> bool {
        self.initial_sync_completed_at.is_some()
    }
}
