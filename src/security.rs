//! Shared security helpers: the root guard, password hashing and the signed
//! access tokens handed out at login.

use anyhow::{Result, bail};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use nix::unistd::Uid;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::DocId;

const TOKEN_KEY_CONTEXT: &str = "vidshare 2024 access token mac";

/// Fails fast when a binary is started as root. The backend is expected to
/// run under a dedicated, unprivileged account.
pub fn ensure_not_root(process: &str) -> Result<()> {
    if Uid::current().is_root() {
        bail!("{process} must not be run as root; please use a dedicated service account");
    }
    Ok(())
}

pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    OsRng.fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|err| anyhow::anyhow!("encoding password salt: {err}"))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow::anyhow!("hashing password: {err}"))?;
    Ok(hash.to_string())
}

/// `false` for a wrong password and for a hash that cannot be parsed.
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed access token")]
    Malformed,
    #[error("access token signature mismatch")]
    BadSignature,
    #[error("access token expired")]
    Expired,
    #[error("encoding access token claims")]
    Encoding,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: DocId,
    /// Unix seconds.
    pub exp: i64,
}

/// Issues and checks `base64url(claims).base64url(mac)` tokens, where the MAC
/// is keyed blake3 over the encoded claims.
#[derive(Clone)]
pub struct TokenSigner {
    key: [u8; 32],
    ttl_secs: i64,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        Self {
            key: blake3::derive_key(TOKEN_KEY_CONTEXT, secret.as_bytes()),
            ttl_secs: i64::try_from(ttl_secs).unwrap_or(i64::MAX),
        }
    }

    pub fn issue(&self, user: &DocId) -> Result<String, TokenError> {
        let claims = Claims {
            sub: user.clone(),
            exp: Utc::now().timestamp().saturating_add(self.ttl_secs),
        };
        let claims = serde_json::to_vec(&claims).map_err(|_| TokenError::Encoding)?;
        let payload = URL_SAFE_NO_PAD.encode(claims);
        let mac = blake3::keyed_hash(&self.key, payload.as_bytes());
        Ok(format!("{payload}.{}", URL_SAFE_NO_PAD.encode(mac.as_bytes())))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let (payload, mac) = token.trim().split_once('.').ok_or(TokenError::Malformed)?;
        let mac = URL_SAFE_NO_PAD.decode(mac).map_err(|_| TokenError::Malformed)?;
        let mac: [u8; 32] = mac.try_into().map_err(|_| TokenError::Malformed)?;
        // blake3::Hash compares in constant time.
        if blake3::keyed_hash(&self.key, payload.as_bytes()) != blake3::Hash::from(mac) {
            return Err(TokenError::BadSignature);
        }

        let raw = URL_SAFE_NO_PAD.decode(payload).map_err(|_| TokenError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&raw).map_err(|_| TokenError::Malformed)?;
        if claims.exp <= Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}
