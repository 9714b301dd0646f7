//! Spotify playback history collector: pulls a user's recently-played
//! history into Postgres on a schedule, absorbs bulk "Extended Streaming
//! History" ZIP exports, and exposes both as a small set of read-only tools.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header::AUTHORIZATION, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, Result};

use services::checkpoint::CheckpointStore;
use services::job_ledger::JobLedger;
use services::repository::MusicRepository;
use services::spotify::{SpotifyAuth, SpotifyClient, TokenRefresher};
use services::sync::{CancellationToken, InitialSyncService, Poller, RunLoop};
use services::token_vault::TokenVault;
use services::tools::{build_registry, dispatch, Envelope, ToolRegistry};

/// Everything a request handler or run-loop cycle needs. Cheap to clone:
/// every field is a `PgPool` or an `Arc<_>`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pool: PgPool,
    pub repository: MusicRepository,
    pub checkpoint: CheckpointStore,
    pub job_ledger: JobLedger,
    pub token_vault: Arc<TokenVault>,
    pub spotify_auth: Arc<SpotifyAuth>,
    pub tool_registry: Arc<ToolRegistry>,
    pub cancel: CancellationToken,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, pool: PgPool) -> Result<Self> {
        let token_vault = Arc::new(TokenVault::new(&config.token_vault));
        let spotify_auth = Arc::new(SpotifyAuth::new(&config.spotify, token_vault.clone(), pool.clone())?);
        Ok(Self {
            repository: MusicRepository::new(pool.clone()),
            checkpoint: CheckpointStore::new(pool.clone()),
            job_ledger: JobLedger::new(pool.clone()),
            token_vault,
            spotify_auth,
            tool_registry: Arc::new(build_registry()),
            cancel: CancellationToken::new(),
            pool,
            config,
        })
    }

    /// Builds the `RunLoop` that owns the services constructed from this
    /// state, for the background sync/import cycle.
    pub fn build_run_loop(&self) -> RunLoop {
        let importer = services::importer::ZipImporter::new(
            self.repository.clone(),
            self.job_ledger.clone(),
            self.config.import.clone(),
        );
        let initial_sync = InitialSyncService::new(
            self.repository.clone(),
            self.checkpoint.clone(),
            self.job_ledger.clone(),
            self.config.initial_sync.clone(),
        );
        let poller = Poller::new(self.repository.clone(), self.checkpoint.clone(), self.job_ledger.clone());
        RunLoop::new(
            self.pool.clone(),
            self.checkpoint.clone(),
            importer,
            self.spotify_auth.clone(),
            initial_sync,
            poller,
            self.config.collector.clone(),
            self.config.initial_sync.clone(),
        )
    }

    /// Builds a short-lived [`SpotifyClient`] for one tool call, mirroring
    /// the run loop's `client_for` but surfacing credential failure as an
    /// error instead of silently skipping the user.
    pub async fn spotify_client_for(&self, user_id: Uuid) -> Result<SpotifyClient> {
        let lease = self.spotify_auth.current_lease(user_id).await?;
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.config.collector.spotify_concurrency));
        let refresher: Arc<dyn TokenRefresher> = self.spotify_auth.clone();
        Ok(SpotifyClient::with_api_base(
            user_id,
            self.config.collector.spotify_api_base.clone(),
            lease,
            refresher,
            semaphore,
            self.config.collector.rate_limit_budget,
        ))
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    sqlx::query("SELECT 1").execute(&state.pool).await?;
    Ok(Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

async fn list_tools(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::json!({ "tools": state.tool_registry.catalog() }))
}

#[derive(Debug, Deserialize)]
struct CallRequest {
    tool: String,
    #[serde(default = "Value::default")]
    args: Value,
}

async fn call_tool(State(state): State<AppState>, Json(req): Json<CallRequest>) -> Json<Envelope> {
    Json(dispatch(&state, &state.tool_registry, &req.tool, req.args).await)
}

/// Rejects `POST /mcp/call` requests that don't carry the shared secret as
/// a bearer token. This surface has no per-user login, only a
/// deployment-wide credential.
async fn require_shared_secret(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    let header = request.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let token = header.and_then(|h| h.strip_prefix("Bearer "));

    let matches = token
        .map(|t| {
            ring::constant_time::verify_slices_are_equal(
                t.as_bytes(),
                state.config.mcp_shared_secret.as_bytes(),
            )
            .is_ok()
        })
        .unwrap_or(false);

    if !matches {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"success": false, "error": "missing or invalid bearer token"})),
        )
            .into_response();
    }

    next.run(request).await
}

pub fn build_router(state: AppState) -> Router {
    let mcp_routes = Router::new()
        .route("/call", post(call_tool))
        .layer(axum::middleware::from_fn_with_state(state.clone(), require_shared_secret));

    Router::new()
        .route("/health", get(health_check))
        .route("/mcp/tools", get(list_tools))
        .nest("/mcp", mcp_routes)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
