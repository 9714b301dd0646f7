use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// An AES-256-GCM sealed blob as stored at rest: `[version][nonce][ciphertext||tag]`.
/// `Debug` is hand-written to print only the length, never the bytes.
#[derive(Clone, Serialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct SealedBlob(pub Vec<u8>);

impl std::fmt::Debug for SealedBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedBlob")
            .field("len", &self.0.len())
            .finish()
    }
}

/// The row backing a user's Spotify refresh credential. `sealed_refresh_token`
/// never leaves this module unsealed except through `TokenVault::unseal`.
#[derive(Clone, sqlx::FromRow)]
pub struct RefreshCredential {
    pub user_id: Uuid,
    pub sealed_refresh_token: Vec<u8>,
    pub scope: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for RefreshCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCredential")
            .field("user_id", &self.user_id)
            .field("sealed_refresh_token_len", &self.sealed_refresh_token.len())
            .field("scope", &self.scope)
            .finish()
    }
}

/// A refresh token after unsealing, held only for the duration of a token
/// exchange call. Never derives `Debug`/`Display`/`Serialize`.
pub struct DecryptedToken(String);

impl DecryptedToken {
    pub fn new(plaintext: String) -> Self {
        Self(plaintext)
    }

    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for DecryptedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DecryptedToken(REDACTED)")
    }
}

/// In-memory access token cache entry (never persisted): Spotify access
/// tokens are short-lived and are reissued from the refresh token on demand.
#[derive(Clone)]
pub struct AccessTokenLease {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for AccessTokenLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokenLease")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AccessTokenLease {
    pub fn is_expired(&self, skew: chrono::Duration) -> bool {
        Utc::now() + skew >= self.expires_at
    }
}
