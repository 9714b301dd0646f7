//! End-to-end dispatch envelope tests driven through the real
//! `AppState`/`ToolRegistry` against a disposable Postgres instance.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use spotify_history_collector::config::{
    AppConfig, CollectorConfig, DatabaseSettings, Environment, ImportConfig, InitialSyncConfig,
    ServerConfig, SpotifyAppCredentials, TokenVaultConfig,
};
use spotify_history_collector::services::tools::{build_registry, dispatch};
use spotify_history_collector::AppState;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::TestDatabase;

/// Seeds a usable (unexpired) access-token lease directly, bypassing the
/// real OAuth exchange this test has no interest in driving.
async fn seed_credential(db: &TestDatabase, user_id: uuid::Uuid) {
    sqlx::query(
        r#"
        INSERT INTO refresh_credentials (user_id, sealed_refresh_token, access_token, access_token_expires_at, scope)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(user_id)
    .bind(vec![1u8, 2, 3])
    .bind("an-access-token")
    .bind(Utc::now() + chrono::Duration::hours(1))
    .bind("user-read-recently-played")
    .execute(&db.pool)
    .await
    .expect("seed credential");
}

/// `AppState::new` takes an already-connected pool; `database.url` here is
/// never dialed, just carried for symmetry with the real startup path.
fn test_config() -> Arc<AppConfig> {
    test_config_with_api_base("https://api.spotify.com/v1".to_string())
}

/// Same as [`test_config`], but pointed at a caller-supplied Spotify API
/// base so a test can drive `spotify_client_for` against a `wiremock` server.
fn test_config_with_api_base(spotify_api_base: String) -> Arc<AppConfig> {
    Arc::new(AppConfig {
        environment: Environment::Development,
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        database: DatabaseSettings {
            url: "postgres://unused/placeholder".to_string(),
            max_connections: 5,
            connect_timeout: Duration::from_secs(5),
        },
        spotify: SpotifyAppCredentials {
            client_id: "test-client-id".to_string(),
            client_secret: "test-client-secret".to_string(),
            redirect_uri: "http://localhost/callback".to_string(),
            auth_url: "https://accounts.spotify.com/authorize".to_string(),
            token_url: "https://accounts.spotify.com/api/token".to_string(),
        },
        token_vault: TokenVaultConfig { key: [7u8; 32] },
        collector: CollectorConfig {
            interval: Duration::from_secs(600),
            initial_sync_enabled: true,
            spotify_concurrency: 4,
            rate_limit_budget: 5,
            spotify_api_base,
        },
        initial_sync: InitialSyncConfig {
            max_days: 30,
            max_requests: 200,
            rate_limit_budget: 5,
            concurrency: 2,
        },
        import: ImportConfig {
            max_zip_size_mb: 500,
            max_records: 5_000_000,
            batch_size: 5_000,
            upload_dir: std::env::temp_dir().to_string_lossy().to_string(),
        },
        mcp_shared_secret: "test-secret".to_string(),
    })
}

/// Spec §8 boundary behavior: calling an unregistered tool name returns
/// `success=false, error="NotFound: unknown tool '<name>'"`.
#[tokio::test]
async fn unknown_tool_returns_not_found_envelope() {
    let db = TestDatabase::new().await;
    let config = test_config();
    let state = AppState::new(config, db.pool.clone()).unwrap();
    let registry = build_registry();

    let envelope = dispatch(&state, &registry, "nonexistent.tool", serde_json::json!({})).await;
    assert!(!envelope.success);
    assert!(envelope.result.is_none());
    assert_eq!(
        envelope.error.as_deref(),
        Some("NotFound: unknown tool 'nonexistent.tool'")
    );
}

/// Every envelope satisfies exactly one of the two totality branches (spec
/// §8 property 5), whichever path the handler takes.
#[tokio::test]
async fn successful_call_carries_result_not_error() {
    let db = TestDatabase::new().await;
    let user_id = db.create_user().await;
    let config = test_config();
    let state = AppState::new(config, db.pool.clone()).unwrap();
    let registry = build_registry();

    let envelope = dispatch(
        &state,
        &registry,
        "history.coverage",
        serde_json::json!({"user_id": user_id.to_string(), "days": 30}),
    )
    .await;

    assert!(envelope.success);
    assert!(envelope.result.is_some());
    assert!(envelope.error.is_none());
}

/// Looking up ops status for a user with no checkpoint yet surfaces as a
/// `NotFound` failure envelope, not a panic or a 500.
#[tokio::test]
async fn sync_status_for_unknown_user_is_not_found() {
    let db = TestDatabase::new().await;
    let config = test_config();
    let state = AppState::new(config, db.pool.clone()).unwrap();
    let registry = build_registry();

    let missing_user = uuid::Uuid::new_v4();
    let envelope = dispatch(
        &state,
        &registry,
        "ops.sync_status",
        serde_json::json!({"user_id": missing_user.to_string()}),
    )
    .await;

    assert!(!envelope.success);
    assert!(envelope.error.unwrap().starts_with("NotFound:"));
}

/// Missing a required argument is an `InvalidArgument` failure, with no
/// state mutation attempted.
#[tokio::test]
async fn missing_required_argument_is_invalid_argument() {
    let db = TestDatabase::new().await;
    let config = test_config();
    let state = AppState::new(config, db.pool.clone()).unwrap();
    let registry = build_registry();

    let envelope = dispatch(&state, &registry, "history.top_artists", serde_json::json!({})).await;
    assert!(!envelope.success);
    assert!(envelope.error.unwrap().starts_with("InvalidArgument:"));
}

/// A live `spotify.search` call that hits a 403 (insufficient scope)
/// surfaces as a failure envelope with the upstream message preserved, not
/// a generic 500 or a panic, via the client's 403 -> `AuthExpired` mapping.
#[tokio::test]
async fn spotify_search_403_surfaces_as_auth_expired_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "error": {"status": 403, "message": "Insufficient client scope"}
        })))
        .mount(&server)
        .await;

    let db = TestDatabase::new().await;
    let user_id = db.create_user().await;
    seed_credential(&db, user_id).await;

    let config = test_config_with_api_base(server.uri());
    let state = AppState::new(config, db.pool.clone()).unwrap();
    let registry = build_registry();

    let envelope = dispatch(
        &state,
        &registry,
        "spotify.search",
        serde_json::json!({"user_id": user_id.to_string(), "q": "Bohemian Rhapsody"}),
    )
    .await;

    assert!(!envelope.success);
    assert!(envelope.result.is_none());
    assert_eq!(
        envelope.error.as_deref(),
        Some("AuthExpired: Insufficient client scope")
    );
}
