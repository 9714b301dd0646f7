//! `spotify.*` tool handlers: thin passthroughs to the Spotify access layer.
//! These build a short-lived [`SpotifyClient`] per call the same way the
//! run loop does for sync work.

use serde_json::json;

use crate::error::AppError;
use crate::services::spotify::{SearchType, TimeRange};
use crate::services::tools::dispatch::ValidatedArgs;
use crate::services::tools::registry::{HandlerFn, HandlerFut, ParamSpec, ParamType, ToolSpec};
use crate::AppState;

use super::to_value;

fn user_id_param() -> ParamSpec {
    ParamSpec {
        name: "user_id",
        param_type: ParamType::String,
        required: true,
        default: None,
        description: "Surrogate id (UUID) of the user whose Spotify credential to use.",
    }
}

pub fn specs() -> Vec<(ToolSpec, HandlerFn)> {
    vec![
        (
            ToolSpec {
                name: "spotify.get_top",
                category: "spotify",
                description: "Live passthrough to Spotify's top-artists/top-tracks endpoints.",
                params: vec![
                    user_id_param(),
                    ParamSpec {
                        name: "entity",
                        param_type: ParamType::String,
                        required: true,
                        default: None,
                        description: "'artists' or 'tracks'.",
                    },
                    ParamSpec {
                        name: "time_range",
                        param_type: ParamType::String,
                        required: false,
                        default: Some(json!("medium_term")),
                        description: "'short_term', 'medium_term', or 'long_term'.",
                    },
                    ParamSpec {
                        name: "limit",
                        param_type: ParamType::Integer,
                        required: false,
                        default: Some(json!(20)),
                        description: "Maximum rows to return (Spotify caps this at 50).",
                    },
                ],
            },
            get_top as HandlerFn,
        ),
        (
            ToolSpec {
                name: "spotify.search",
                category: "spotify",
                description: "Live passthrough to Spotify's catalog search endpoint.",
                params: vec![
                    user_id_param(),
                    ParamSpec {
                        name: "q",
                        param_type: ParamType::String,
                        required: true,
                        default: None,
                        description: "Search query text.",
                    },
                    ParamSpec {
                        name: "type",
                        param_type: ParamType::String,
                        required: false,
                        default: Some(json!("track")),
                        description: "'track', 'artist', or 'album'.",
                    },
                    ParamSpec {
                        name: "limit",
                        param_type: ParamType::Integer,
                        required: false,
                        default: Some(json!(20)),
                        description: "Maximum rows to return (Spotify caps this at 50).",
                    },
                ],
            },
            search as HandlerFn,
        ),
    ]
}

fn get_top(state: &AppState, args: ValidatedArgs) -> HandlerFut<'_> {
    Box::pin(async move {
        let user_id = args.uuid("user_id")?;
        let entity = args.str("entity")?.to_string();
        let time_range_raw = args.str("time_range")?.to_string();
        let limit = args.i64("limit")?;

        state.spotify_auth.ensure_scopes(user_id, &["user-top-read"]).await?;

        let time_range = TimeRange::parse(&time_range_raw).ok_or_else(|| {
            AppError::InvalidArgument(format!(
                "time_range must be one of short_term/medium_term/long_term, got '{time_range_raw}'"
            ))
        })?;

        let client = state.spotify_client_for(user_id).await?;
        let body = client.top(&entity, time_range, limit.max(0) as u32).await?;
        to_value(body)
    })
}

fn search(state: &AppState, args: ValidatedArgs) -> HandlerFut<'_> {
    Box::pin(async move {
        let user_id = args.uuid("user_id")?;
        let q = args.str("q")?.to_string();
        let kind_raw = args.str("type")?.to_string();
        let limit = args.i64("limit")?;

        let kind = SearchType::parse(&kind_raw).ok_or_else(|| {
            AppError::InvalidArgument(format!("type must be one of track/artist/album, got '{kind_raw}'"))
        })?;

        let client = state.spotify_client_for(user_id).await?;
        let body = client.search(&q, kind, limit.max(0) as u32).await?;
        to_value(body)
    })
}
