//! Seals and unseals refresh tokens at rest with AES-256-GCM: a random
//! 12-byte nonce generated per call, prepended to the ciphertext, under a
//! single process-wide key from [`crate::config::TokenVaultConfig`].

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use ring::rand::{SecureRandom, SystemRandom};

use crate::config::TokenVaultConfig;
use crate::error::{AppError, Result};
use crate::models::{DecryptedToken, SealedBlob};

const ENVELOPE_VERSION: u8 = 1;
const NONCE_LEN: usize = 12;

pub struct TokenVault {
    cipher: Aes256Gcm,
    rng: SystemRandom,
}

impl TokenVault {
    pub fn new(config: &TokenVaultConfig) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(&config.key);
        Self {
            cipher: Aes256Gcm::new(key),
            rng: SystemRandom::new(),
        }
    }

    /// Encrypts `plaintext` into `[version][nonce][ciphertext||tag]`.
    pub fn seal(&self, plaintext: &str) -> Result<SealedBlob> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| AppError::Internal("failed to generate nonce".to_string()))?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| AppError::Internal("token encryption failed".to_string()))?;

        let mut envelope = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
        envelope.push(ENVELOPE_VERSION);
        envelope.extend_from_slice(&nonce_bytes);
        envelope.extend_from_slice(&ciphertext);
        Ok(SealedBlob(envelope))
    }

    /// Decrypts an envelope produced by [`Self::seal`]. Any structural or
    /// authentication failure surfaces as [`AppError::CorruptCredential`],
    /// never logged with the attempted plaintext. Returns a [`DecryptedToken`]
    /// rather than a bare `String` so the plaintext can't accidentally end up
    /// in a `{:?}`/log line at a call site.
    pub fn unseal(&self, blob: &SealedBlob) -> Result<DecryptedToken> {
        let bytes = &blob.0;
        if bytes.len() < 1 + NONCE_LEN {
            return Err(AppError::CorruptCredential(
                "sealed token is shorter than the envelope header".to_string(),
            ));
        }
        if bytes[0] != ENVELOPE_VERSION {
            return Err(AppError::CorruptCredential(format!(
                "unsupported envelope version {}",
                bytes[0]
            )));
        }

        let nonce = Nonce::from_slice(&bytes[1..1 + NONCE_LEN]);
        let ciphertext = &bytes[1 + NONCE_LEN..];

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| AppError::CorruptCredential("failed to decrypt refresh token".to_string()))?;

        String::from_utf8(plaintext)
            .map(DecryptedToken::new)
            .map_err(|_| AppError::CorruptCredential("decrypted token was not valid utf-8".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> TokenVault {
        TokenVault::new(&TokenVaultConfig::for_tests())
    }

    #[test]
    fn seal_then_unseal_round_trips() {
        let vault = vault();
        let sealed = vault.seal("a-refresh-token").unwrap();
        let plaintext = vault.unseal(&sealed).unwrap();
        assert_eq!(plaintext.expose_secret(), "a-refresh-token");
    }

    #[test]
    fn seal_is_randomized() {
        let vault = vault();
        let a = vault.seal("same-input").unwrap();
        let b = vault.seal("same-input").unwrap();
        assert_ne!(a.0, b.0, "nonce reuse would make ciphertexts identical");
    }

    #[test]
    fn tampered_ciphertext_fails_closed() {
        let vault = vault();
        let mut sealed = vault.seal("a-refresh-token").unwrap();
        let last = sealed.0.len() - 1;
        sealed.0[last] ^= 0xFF;
        let err = vault.unseal(&sealed).unwrap_err();
        assert!(matches!(err, AppError::CorruptCredential(_)));
    }

    #[test]
    fn truncated_blob_fails_closed() {
        let vault = vault();
        let sealed = SealedBlob(vec![ENVELOPE_VERSION, 1, 2, 3]);
        let err = vault.unseal(&sealed).unwrap_err();
        assert!(matches!(err, AppError::CorruptCredential(_)));
    }

    #[test]
    fn unsupported_version_fails_closed() {
        let vault = vault();
        let mut sealed = vault.seal("token").unwrap();
        sealed.0[0] = 99;
        let err = vault.unseal(&sealed).unwrap_err();
        assert!(matches!(err, AppError::CorruptCredential(_)));
    }
}
