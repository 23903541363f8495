//! # rb-auth-simple
//!
//! Argon2-based implementation of `AuthProvider`.
//! Handles password hashing and HMAC-signed session cookies.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use rb_core::error::{AppError, Result};
use rb_core::models::Session;
use rb_core::traits::AuthProvider;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Bytes of entropy for generated secrets and salts.
const RANDOM_LEN: usize = 32;

/// What actually travels inside the cookie: the session plus its expiry.
#[derive(Serialize, Deserialize)]
struct SessionClaims {
    #[serde(flatten)]
    session: Session,
    /// Unix seconds.
    exp: i64,
}

pub struct SimpleAuthProvider {
    /// HMAC key for session tokens. Changing it logs everybody out.
    session_key: Vec<u8>,
    session_ttl: Duration,
    /// Verified in place of a real hash when the username is unknown.
    decoy_hash: String,
}

impl SimpleAuthProvider {
    /// Accepts a secret (e.g., from configuration) and the session lifetime.
    pub fn new(secret: &[u8], session_ttl: Duration) -> Result<Self> {
        if secret.is_empty() {
            return Err(AppError::Internal("session secret must not be empty".into()));
        }
        let decoy_password = random_bytes()?;
        Ok(Self {
            session_key: secret.to_vec(),
            session_ttl,
            decoy_hash: hash(&decoy_password)?,
        })
    }

    /// Uses a fresh random key; sessions do not survive a restart.
    pub fn with_random_secret(session_ttl: Duration) -> Result<Self> {
        Self::new(&random_bytes()?, session_ttl)
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.session_key)
            .map_err(|e| AppError::Internal(format!("session key rejected: {e}")))
    }
}

fn random_bytes() -> Result<[u8; RANDOM_LEN]> {
    let mut buf = [0u8; RANDOM_LEN];
    getrandom::getrandom(&mut buf).map_err(|e| AppError::Internal(format!("rng failure: {e}")))?;
    Ok(buf)
}

fn hash(password: &[u8]) -> Result<String> {
    let salt_bytes = random_bytes()?;
    let salt = SaltString::encode_b64(&salt_bytes[..16])
        .map_err(|e| AppError::Internal(format!("salt encoding failed: {e}")))?;
    Argon2::default()
        .hash_password(password, &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

impl AuthProvider for SimpleAuthProvider {
    fn hash_password(&self, password: &str) -> Result<String> {
        hash(password.as_bytes())
    }

    /// Verifies against the stored Argon2 hash, or the decoy when there is none.
    fn verify_password(&self, password: &str, stored: Option<&str>) -> bool {
        let candidate = stored.unwrap_or(self.decoy_hash.as_str());
        let parsed_hash = match PasswordHash::new(candidate) {
            Ok(p) => p,
            Err(_) => return false,
        };
        let matches = Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok();
        matches && stored.is_some()
    }

    /// Token format: `base64url(claims json) "." base64url(hmac)`.
    fn issue_session(&self, session: &Session) -> Result<String> {
        let claims = SessionClaims {
            session: session.clone(),
            exp: (Utc::now() + self.session_ttl).timestamp(),
        };
        let json = serde_json::to_vec(&claims)
            .map_err(|e| AppError::Internal(format!("session encoding failed: {e}")))?;
        let payload = URL_SAFE_NO_PAD.encode(json);

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{payload}.{signature}"))
    }

    fn read_session(&self, token: &str) -> Option<Session> {
        let (payload, signature) = token.split_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;

        let mut mac = self.mac().ok()?;
        mac.update(payload.as_bytes());
        if mac.verify_slice(&signature).is_err() {
            tracing::debug!("session token with bad signature");
            return None;
        }

        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        let claims: SessionClaims = serde_json::from_slice(&json).ok()?;
        if claims.exp <= Utc::now().timestamp() {
            return None;
        }
        Some(claims.session)
    }
}
