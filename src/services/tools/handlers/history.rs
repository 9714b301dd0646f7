//! `history.*` tool handlers: thin wrappers over the query primitives in
//! [`crate::services::tools::queries`].

use serde_json::json;

use crate::services::tools::queries;
use crate::services::tools::registry::{HandlerFn, HandlerFut, ParamSpec, ParamType, ToolSpec};
use crate::AppState;

use super::to_value;

fn user_id_param() -> ParamSpec {
    ParamSpec {
        name: "user_id",
        param_type: ParamType::String,
        required: true,
        default: None,
        description: "Surrogate id (UUID) of the user whose history to query.",
    }
}

fn days_param() -> ParamSpec {
    ParamSpec {
        name: "days",
        param_type: ParamType::Integer,
        required: true,
        default: None,
        description: "Size of the trailing window, in days. Values into the thousands are expected for imported history.",
    }
}

fn limit_param(default: i64) -> ParamSpec {
    ParamSpec {
        name: "limit",
        param_type: ParamType::Integer,
        required: false,
        default: Some(json!(default)),
        description: "Maximum number of ranked rows to return.",
    }
}

pub fn specs() -> Vec<(ToolSpec, HandlerFn)> {
    vec![
        (
            ToolSpec {
                name: "history.taste_summary",
                category: "history",
                description: "Composite listening-taste summary: coverage, top artists/tracks, heatmap, repeat rate, totals.",
                params: vec![user_id_param(), days_param()],
            },
            taste_summary as HandlerFn,
        ),
        (
            ToolSpec {
                name: "history.top_artists",
                category: "history",
                description: "Top artists by play count over a trailing window, ties broken by most recent play.",
                params: vec![user_id_param(), days_param(), limit_param(10)],
            },
            top_artists as HandlerFn,
        ),
        (
            ToolSpec {
                name: "history.top_tracks",
                category: "history",
                description: "Top tracks by play count over a trailing window, ties broken by most recent play.",
                params: vec![user_id_param(), days_param(), limit_param(10)],
            },
            top_tracks as HandlerFn,
        ),
        (
            ToolSpec {
                name: "history.listening_heatmap",
                category: "history",
                description: "Play counts bucketed by weekday (0=Monday) and hour of day over a trailing window.",
                params: vec![user_id_param(), days_param()],
            },
            listening_heatmap as HandlerFn,
        ),
        (
            ToolSpec {
                name: "history.repeat_rate",
                category: "history",
                description: "Total plays, unique tracks, repeat ratio, and the most-repeated tracks over a trailing window.",
                params: vec![user_id_param(), days_param()],
            },
            repeat_rate as HandlerFn,
        ),
        (
            ToolSpec {
                name: "history.coverage",
                category: "history",
                description: "How much history is on file for a user over a trailing window: span, source mix, active days.",
                params: vec![user_id_param(), days_param()],
            },
            coverage as HandlerFn,
        ),
    ]
}

fn taste_summary(state: &AppState, args: crate::services::tools::dispatch::ValidatedArgs) -> HandlerFut<'_> {
    Box::pin(async move {
        let user_id = args.uuid("user_id")?;
        let days = args.i64("days")?;
        to_value(queries::taste_summary(&state.pool, user_id, days).await?)
    })
}

fn top_artists(state: &AppState, args: crate::services::tools::dispatch::ValidatedArgs) -> HandlerFut<'_> {
    Box::pin(async move {
        let user_id = args.uuid("user_id")?;
        let days = args.i64("days")?;
        let limit = args.i64("limit")?;
        to_value(queries::top_artists(&state.pool, user_id, days, limit).await?)
    })
}

fn top_tracks(state: &AppState, args: crate::services::tools::dispatch::ValidatedArgs) -> HandlerFut<'_> {
    Box::pin(async move {
        let user_id = args.uuid("user_id")?;
        let days = args.i64("days")?;
        let limit = args.i64("limit")?;
        to_value(queries::top_tracks(&state.pool, user_id, days, limit).await?)
    })
}

fn listening_heatmap(state: &AppState, args: crate::services::tools::dispatch::ValidatedArgs) -> HandlerFut<'_> {
    Box::pin(async move {
        let user_id = args.uuid("user_id")?;
        let days = args.i64("days")?;
        to_value(queries::listening_heatmap(&state.pool, user_id, days).await?)
    })
}

fn repeat_rate(state: &AppState, args: crate::services::tools::dispatch::ValidatedArgs) -> HandlerFut<'_> {
    Box::pin(async move {
        let user_id = args.uuid("user_id")?;
        let days = args.i64("days")?;
        to_value(queries::repeat_rate(&state.pool, user_id, days).await?)
    })
}

fn coverage(state: &AppState, args: crate::services::tools::dispatch::ValidatedArgs) -> HandlerFut<'_> {
    Box::pin(async move {
        let user_id = args.uuid("user_id")?;
        let days = args.i64("days")?;
        to_value(queries::coverage(&state.pool, user_id, days).await?)
    })
}
