//! `ops.*` tool handlers: operational visibility into checkpoints, job runs,
//! and import jobs.

use serde_json::json;

use crate::error::AppError;
use crate::models::ImportJob;
use crate::services::tools::registry::{HandlerFn, HandlerFut, ParamSpec, ParamType, ToolSpec};
use crate::AppState;

use super::to_value;

fn user_id_param() -> ParamSpec {
    ParamSpec {
        name: "user_id",
        param_type: ParamType::String,
        required: true,
        default: None,
        description: "Surrogate id (UUID) of the user to inspect.",
    }
}

fn limit_param(default: i64) -> ParamSpec {
    ParamSpec {
        name: "limit",
        param_type: ParamType::Integer,
        required: false,
        default: Some(json!(default)),
        description: "Maximum number of rows to return, most recent first.",
    }
}

pub fn specs() -> Vec<(ToolSpec, HandlerFn)> {
    vec![
        (
            ToolSpec {
                name: "ops.sync_status",
                category: "ops",
                description: "Current checkpoint for a user: status, cursor, last error.",
                params: vec![user_id_param()],
            },
            sync_status as HandlerFn,
        ),
        (
            ToolSpec {
                name: "ops.latest_job_runs",
                category: "ops",
                description: "Most recent initial-sync/poll job runs for a user.",
                params: vec![user_id_param(), limit_param(10)],
            },
            latest_job_runs as HandlerFn,
        ),
        (
            ToolSpec {
                name: "ops.latest_import_jobs",
                category: "ops",
                description: "Most recent ZIP import jobs for a user.",
                params: vec![user_id_param(), limit_param(10)],
            },
            latest_import_jobs as HandlerFn,
        ),
    ]
}

fn sync_status(state: &AppState, args: crate::services::tools::dispatch::ValidatedArgs) -> HandlerFut<'_> {
    Box::pin(async move {
        let user_id = args.uuid("user_id")?;
        let checkpoint = state
            .checkpoint
            .get(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("no checkpoint for user '{user_id}'")))?;
        to_value(checkpoint)
    })
}

fn latest_job_runs(state: &AppState, args: crate::services::tools::dispatch::ValidatedArgs) -> HandlerFut<'_> {
    Box::pin(async move {
        let user_id = args.uuid("user_id")?;
        let limit = args.i64("limit")?;
        let runs = state.job_ledger.latest_for_user(user_id, limit).await?;
        to_value(runs)
    })
}

fn latest_import_jobs(state: &AppState, args: crate::services::tools::dispatch::ValidatedArgs) -> HandlerFut<'_> {
    Box::pin(async move {
        let user_id = args.uuid("user_id")?;
        let limit = args.i64("limit")?;
        let jobs = sqlx::query_as::<_, ImportJob>(
            r#"
            SELECT id, user_id, status, archive_path, size_bytes, detected_format,
                   records_ingested, earliest_played_at, latest_played_at,
                   error_message, created_at, updated_at
            FROM import_jobs
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&state.pool)
        .await?;
        to_value(jobs)
    })
}
