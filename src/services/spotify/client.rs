//! Rate-limited Spotify Web API client: per-user access token cache with
//! expiry-driven and 401-triggered refresh, 429 backoff honoring
//! `Retry-After`, and bounded 5xx retry.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use rand::Rng;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use tokio::sync::{Mutex, Semaphore};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::AccessTokenLease;

use super::types::{
    RecentlyPlayedItem, RecentlyPlayedPage, SearchType, SpotifyErrorBody, SpotifyProfile,
    TimeRange,
};

pub const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";
const ACCESS_TOKEN_SLACK: ChronoDuration = ChronoDuration::seconds(30);
const MAX_5XX_ATTEMPTS: u32 = 3;
const BASE_429_BACKOFF: Duration = Duration::from_secs(1);
const MAX_429_BACKOFF: Duration = Duration::from_secs(60);

/// Performs the token-endpoint exchange for a user's refresh credential and
/// returns the new access token lease. Implemented by the sync layer, which
/// owns the token vault and the per-user persistence.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, user_id: Uuid) -> Result<AccessTokenLease>;
}

/// One user-session's worth of Spotify API access: a cached access token, a
/// refresh callback, and the concurrency/backoff state the request protocol
/// needs.
pub struct SpotifyClient {
    user_id: Uuid,
    api_base: String,
    http: Client,
    refresher: Arc<dyn TokenRefresher>,
    lease: Mutex<AccessTokenLease>,
    refresh_lock: Mutex<()>,
    semaphore: Arc<Semaphore>,
    rate_limit_budget: u32,
    consecutive_429: AtomicU32,
}

impl SpotifyClient {
    pub fn new(
        user_id: Uuid,
        initial_lease: AccessTokenLease,
        refresher: Arc<dyn TokenRefresher>,
        semaphore: Arc<Semaphore>,
        rate_limit_budget: u32,
    ) -> Self {
        Self::with_api_base(
            user_id,
            DEFAULT_API_BASE.to_string(),
            initial_lease,
            refresher,
            semaphore,
            rate_limit_budget,
        )
    }

    /// Same as [`Self::new`], but pointed at a caller-supplied API base.
    /// Used by tests to aim the client at a `wiremock` server instead of
    /// the real Spotify API.
    pub fn with_api_base(
        user_id: Uuid,
        api_base: String,
        initial_lease: AccessTokenLease,
        refresher: Arc<dyn TokenRefresher>,
        semaphore: Arc<Semaphore>,
        rate_limit_budget: u32,
    ) -> Self {
        Self {
            user_id,
            api_base,
            http: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client builds with static config"),
            refresher,
            lease: Mutex::new(initial_lease),
            refresh_lock: Mutex::new(()),
            semaphore,
            rate_limit_budget,
            consecutive_429: AtomicU32::new(0),
        }
    }

    pub fn consecutive_429s(&self) -> u32 {
        self.consecutive_429.load(Ordering::Relaxed)
    }

    pub async fn recently_played(
        &self,
        before_ms: Option<i64>,
        limit: u32,
    ) -> Result<RecentlyPlayedPage> {
        let mut query = vec![("limit".to_string(), limit.min(50).to_string())];
        if let Some(before) = before_ms {
            query.push(("before".to_string(), before.to_string()));
        }

        let body: Value = self
            .request(Method::GET, "/me/player/recently-played", &query)
            .await?;

        let items: Vec<RecentlyPlayedItem> = body
            .get("items")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| AppError::Internal(format!("malformed recently-played body: {e}")))?
            .unwrap_or_default();

        let next_before_ms = body
            .get("cursors")
            .and_then(|c| c.get("before"))
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<i64>().ok());

        Ok(RecentlyPlayedPage {
            items,
            next_before_ms,
        })
    }

    pub async fn profile(&self) -> Result<SpotifyProfile> {
        let body: Value = self.request(Method::GET, "/me", &[]).await?;
        serde_json::from_value(body)
            .map_err(|e| AppError::Internal(format!("malformed profile body: {e}")))
    }

    pub async fn top(&self, entity: &str, time_range: TimeRange, limit: u32) -> Result<Value> {
        let path = match entity {
            "artists" => "/me/top/artists",
            "tracks" => "/me/top/tracks",
            other => {
                return Err(AppError::InvalidArgument(format!(
                    "unknown top entity '{other}', expected 'artists' or 'tracks'"
                )))
            }
        };
        let query = vec![
            ("time_range".to_string(), time_range.as_query_value().to_string()),
            ("limit".to_string(), limit.min(50).to_string()),
        ];
        self.request(Method::GET, path, &query).await
    }

    pub async fn search(&self, q: &str, kind: SearchType, limit: u32) -> Result<Value> {
        let query = vec![
            ("q".to_string(), q.to_string()),
            ("type".to_string(), kind.as_query_value().to_string()),
            ("limit".to_string(), limit.min(50).to_string()),
        ];
        self.request(Method::GET, "/search", &query).await
    }

    /// Runs one logical request through the full protocol: access-token
    /// refresh-on-expiry, single 401 retry, 429 backoff up to the
    /// consecutive-429 budget, and bounded 5xx retry.
    async fn request(&self, method: Method, path: &str, query: &[(String, String)]) -> Result<Value> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| AppError::Internal("spotify client semaphore closed".to_string()))?;

        self.ensure_fresh_token().await?;

        let url = format!("{}{path}", self.api_base);
        let mut attempted_refresh = false;
        let mut attempt_5xx: u32 = 0;

        loop {
            let access_token = self.lease.lock().await.token.clone();
            let response = self
                .http
                .request(method.clone(), &url)
                .query(query)
                .bearer_auth(&access_token)
                .send()
                .await
                .map_err(|e| AppError::TransientUpstream(format!("request failed: {e}")))?;

            let status = response.status();

            if status.is_success() {
                self.consecutive_429.store(0, Ordering::Relaxed);
                return response
                    .json::<Value>()
                    .await
                    .map_err(|e| AppError::Internal(format!("malformed response body: {e}")));
            }

            if status == StatusCode::UNAUTHORIZED {
                if attempted_refresh {
                    let message = extract_error_message(response).await;
                    return Err(AppError::AuthExpired(message));
                }
                attempted_refresh = true;
                self.force_refresh(true).await?;
                continue;
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|h| h.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs);

                let consecutive = self.consecutive_429.fetch_add(1, Ordering::Relaxed) + 1;
                if consecutive >= self.rate_limit_budget {
                    let message = extract_error_message(response).await;
                    return Err(AppError::RateLimited(message));
                }

                let wait = retry_after.unwrap_or_else(|| backoff_with_jitter(consecutive));
                tokio::time::sleep(wait).await;
                continue;
            }

            if status.is_server_error() {
                attempt_5xx += 1;
                if attempt_5xx >= MAX_5XX_ATTEMPTS {
                    let message = extract_error_message(response).await;
                    return Err(AppError::TransientUpstream(message));
                }
                tokio::time::sleep(backoff_with_jitter(attempt_5xx)).await;
                continue;
            }

            // 403 almost always means the granted scope doesn't cover this
            // endpoint. Treated like an auth problem rather than a generic
            // upstream failure so callers see "re-authorize", not "retry".
            if status == StatusCode::FORBIDDEN {
                let message = extract_error_message(response).await;
                return Err(AppError::AuthExpired(message));
            }

            let message = extract_error_message(response).await;
            return Err(AppError::TransientUpstream(message));
        }
    }

    async fn ensure_fresh_token(&self) -> Result<()> {
        let needs_refresh = {
            let lease = self.lease.lock().await;
            lease.is_expired(ACCESS_TOKEN_SLACK)
        };
        if needs_refresh {
            self.force_refresh(false).await?;
        }
        Ok(())
    }

    /// Serialized per user so concurrent callers never double-refresh.
    ///
    /// `unconditional` is set on the 401 path: the server has just told us
    /// the cached access token is invalid, so the refresh must happen even
    /// if our locally-cached expiry still looks fresh. The proactive
    /// expiry-driven path passes `false` and re-checks expiry once it holds
    /// the lock, so a burst of concurrent callers that all observed an
    /// expired lease still only refreshes once.
    async fn force_refresh(&self, unconditional: bool) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;

        if !unconditional && !self.lease.lock().await.is_expired(ACCESS_TOKEN_SLACK) {
            return Ok(());
        }

        let new_lease = self.refresher.refresh(self.user_id).await?;
        *self.lease.lock().await = new_lease;
        Ok(())
    }
}

fn backoff_with_jitter(attempt: u32) -> Duration {
    let exp = BASE_429_BACKOFF.saturating_mul(1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX));
    let capped = exp.min(MAX_429_BACKOFF);
    let jitter_ms = rand::thread_rng().gen_range(0..=100u64);
    capped + Duration::from_millis(jitter_ms)
}

async fn extract_error_message(response: reqwest::Response) -> String {
    let status = response.status();
    match response.json::<SpotifyErrorBody>().await {
        Ok(body) => body.error.message,
        Err(_) => format!("HTTP {status}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_capped() {
        let d = backoff_with_jitter(20);
        assert!(d <= MAX_429_BACKOFF + Duration::from_millis(100));
    }

    #[test]
    fn backoff_grows_with_attempt() {
        let first = backoff_with_jitter(1);
        let third = backoff_with_jitter(3);
        assert!(third >= first);
    }
}
