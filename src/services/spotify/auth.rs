//! OAuth2 token exchange and refresh for the Spotify access layer, built on
//! `oauth2::basic::BasicClient` + `async_http_client`. The refresh token is
//! stored sealed through [`crate::services::token_vault::TokenVault`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{AuthUrl, ClientId, ClientSecret, RedirectUrl, RefreshToken, TokenResponse, TokenUrl};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::SpotifyAppCredentials;
use crate::error::{AppError, Result};
use crate::models::{AccessTokenLease, RefreshCredential, SealedBlob};

use super::client::{SpotifyClient, TokenRefresher};
use crate::services::token_vault::TokenVault;
use tokio::sync::Semaphore;

pub struct SpotifyAuth {
    oauth_client: BasicClient,
    token_vault: Arc<TokenVault>,
    pool: PgPool,
}

impl SpotifyAuth {
    pub fn new(creds: &SpotifyAppCredentials, token_vault: Arc<TokenVault>, pool: PgPool) -> Result<Self> {
        let oauth_client = BasicClient::new(
            ClientId::new(creds.client_id.clone()),
            Some(ClientSecret::new(creds.client_secret.clone())),
            AuthUrl::new(creds.auth_url.clone())
                .map_err(|e| AppError::Internal(format!("invalid spotify auth url: {e}")))?,
            Some(
                TokenUrl::new(creds.token_url.clone())
                    .map_err(|e| AppError::Internal(format!("invalid spotify token url: {e}")))?,
            ),
        )
        .set_redirect_uri(
            RedirectUrl::new(creds.redirect_uri.clone())
                .map_err(|e| AppError::Internal(format!("invalid redirect uri: {e}")))?,
        );

        Ok(Self {
            oauth_client,
            token_vault,
            pool,
        })
    }

    /// Seals and persists a freshly-obtained refresh token (first authorization
    /// or a rotation), returning the access-token lease the caller should cache.
    pub async fn store_credential(
        &self,
        user_id: Uuid,
        access_token: String,
        refresh_token: &str,
        expires_in: Option<std::time::Duration>,
        scope: &str,
    ) -> Result<AccessTokenLease> {
        let sealed = self.token_vault.seal(refresh_token)?;
        let expires_at =
            Utc::now() + ChronoDuration::seconds(expires_in.map(|d| d.as_secs() as i64).unwrap_or(3600));

        sqlx::query(
            r#"
            INSERT INTO refresh_credentials (user_id, sealed_refresh_token, access_token, access_token_expires_at, scope, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, now(), now())
            ON CONFLICT (user_id) DO UPDATE SET
                sealed_refresh_token = EXCLUDED.sealed_refresh_token,
                access_token = EXCLUDED.access_token,
                access_token_expires_at = EXCLUDED.access_token_expires_at,
                scope = EXCLUDED.scope,
                updated_at = now()
            "#,
        )
        .bind(user_id)
        .bind(&sealed.0)
        .bind(&access_token)
        .bind(expires_at)
        .bind(scope)
        .execute(&self.pool)
        .await?;

        Ok(AccessTokenLease {
            token: access_token,
            expires_at,
        })
    }

    async fn load_credential(&self, user_id: Uuid) -> Result<RefreshCredential> {
        sqlx::query_as::<_, RefreshCredential>(
            "SELECT user_id, sealed_refresh_token, scope, created_at, updated_at FROM refresh_credentials WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no spotify credential for user {user_id}")))
    }

    /// The lease a caller should seed a freshly constructed [`SpotifyClient`]
    /// with: the cached access token if one is on file, else a forced
    /// refresh. The client still re-checks expiry before its first request.
    pub async fn current_lease(&self, user_id: Uuid) -> Result<AccessTokenLease> {
        let row: Option<(Option<String>, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT access_token, access_token_expires_at FROM refresh_credentials WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((Some(token), Some(expires_at))) => Ok(AccessTokenLease { token, expires_at }),
            Some(_) => self.refresh(user_id).await,
            None => Err(AppError::NotFound(format!(
                "no spotify credential for user {user_id}"
            ))),
        }
    }

    /// Checks the granted scopes cover what a tool needs, failing fast
    /// rather than letting Spotify reject the call downstream with a less
    /// actionable error.
    pub async fn ensure_scopes(&self, user_id: Uuid, required: &[&str]) -> Result<()> {
        let credential = self.load_credential(user_id).await?;
        let granted: std::collections::HashSet<&str> = credential.scope.split_whitespace().collect();
        let missing: Vec<&str> = required
            .iter()
            .filter(|s| !granted.contains(*s))
            .copied()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AppError::AuthExpired(format!(
                "missing required scope(s): {}",
                missing.join(", ")
            )))
        }
    }
}

#[async_trait]
impl TokenRefresher for SpotifyAuth {
    async fn refresh(&self, user_id: Uuid) -> Result<AccessTokenLease> {
        let credential = self.load_credential(user_id).await?;
        let refresh_token_plain = self
            .token_vault
            .unseal(&SealedBlob(credential.sealed_refresh_token))?;

        let token_result = self
            .oauth_client
            .exchange_refresh_token(&RefreshToken::new(refresh_token_plain.expose_secret().to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| AppError::AuthExpired(format!("token refresh failed: {e}")))?;

        let new_access_token = token_result.access_token().secret().clone();
        let expires_in = token_result.expires_in();

        if let Some(rotated) = token_result.refresh_token() {
            self.store_credential(
                user_id,
                new_access_token.clone(),
                rotated.secret(),
                expires_in,
                &credential.scope,
            )
            .await
        } else {
            let expires_at =
                Utc::now() + ChronoDuration::seconds(expires_in.map(|d| d.as_secs() as i64).unwrap_or(3600));
            sqlx::query(
                "UPDATE refresh_credentials SET access_token = $2, access_token_expires_at = $3, updated_at = now() WHERE user_id = $1",
            )
            .bind(user_id)
            .bind(&new_access_token)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
            Ok(AccessTokenLease {
                token: new_access_token,
                expires_at,
            })
        }
    }
}
