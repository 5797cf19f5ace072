//! App JWT signing
//!
//! GitHub Apps authenticate to the forge with short-lived RS256 JWTs signed
//! by the App's RSA private key. The signer caches parsed keys by a content
//! hash of the PEM so repeated requests in one process skip re-parsing.

use crate::errors::{Error, GitHubResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// App JWT lifetime, per the forge's 10-minute maximum
pub const JWT_TTL_SECS: i64 = 600;

/// Claims carried by an App JWT. The issuer is the numeric App ID.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: i64,
    iat: i64,
    exp: i64,
}

/// Signs App JWTs, caching parsed RSA keys for the life of the process.
///
/// The cache is keyed by a SHA-256 of the PEM bytes, so rotating a key on
/// disk naturally yields a fresh cache entry. The signer is owned by the
/// per-invocation authenticator rather than living in a global.
#[derive(Default)]
pub struct JwtSigner {
    keys: Mutex<HashMap<[u8; 32], EncodingKey>>,
}

impl std::fmt::Debug for JwtSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSigner").finish_non_exhaustive()
    }
}

impl JwtSigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce a compact RS256 JWS for `app_id`.
    ///
    /// The header is exactly `{"alg":"RS256","typ":"JWT"}`; the payload is
    /// `{iss, iat, exp}` with `exp = iat + 600` in UTC seconds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKeyFormat`] when the PEM is not an RSA private
    /// key (PKCS#1 and PKCS#8 are both accepted), and [`Error::Jwt`] when
    /// signing fails.
    pub fn sign(&self, app_id: i64, private_key_pem: &[u8]) -> GitHubResult<String> {
        let key = self.encoding_key(private_key_pem)?;
        let iat = Utc::now().timestamp();
        let claims = Claims {
            iss: app_id,
            iat,
            exp: iat + JWT_TTL_SECS,
        };

        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| Error::jwt(format!("failed to sign App JWT: {}", e)))
    }

    /// Number of distinct keys currently cached.
    pub fn cached_key_count(&self) -> usize {
        self.lock_keys().len()
    }

    fn encoding_key(&self, pem: &[u8]) -> GitHubResult<EncodingKey> {
        let digest: [u8; 32] = Sha256::digest(pem).into();

        let mut keys = self.lock_keys();
        if let Some(key) = keys.get(&digest) {
            return Ok(key.clone());
        }

        let key = EncodingKey::from_rsa_pem(pem)
            .map_err(|e| Error::invalid_key_format(e.to_string()))?;
        debug!("parsed and cached RSA signing key");
        keys.insert(digest, key.clone());
        Ok(key)
    }

    fn lock_keys(&self) -> std::sync::MutexGuard<'_, HashMap<[u8; 32], EncodingKey>> {
        // A poisoned cache only means another thread panicked mid-insert;
        // the map itself stays usable.
        self.keys
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Structurally validate a compact JWS: three dot-separated segments, an
/// RS256/JWT header, and a payload object carrying `iss`, `iat`, and `exp`.
/// The cryptographic signature is not checked; that is the forge's job.
pub fn validate_structure(token: &str) -> GitHubResult<()> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(Error::jwt(format!(
            "expected 3 JWS segments, found {}",
            parts.len()
        )));
    }

    let header = decode_json_segment(parts[0], "header")?;
    if header.get("alg").and_then(serde_json::Value::as_str) != Some("RS256") {
        return Err(Error::jwt("header alg is not RS256"));
    }
    if header.get("typ").and_then(serde_json::Value::as_str) != Some("JWT") {
        return Err(Error::jwt("header typ is not JWT"));
    }

    let payload = decode_json_segment(parts[1], "payload")?;
    let claims = payload
        .as_object()
        .ok_or_else(|| Error::jwt("payload is not a JSON object"))?;
    for claim in ["iss", "iat", "exp"] {
        if !claims.contains_key(claim) {
            return Err(Error::jwt(format!("payload is missing '{}'", claim)));
        }
    }

    Ok(())
}

fn decode_json_segment(segment: &str, what: &str) -> GitHubResult<serde_json::Value> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| Error::jwt(format!("{} is not valid base64url: {}", what, e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::jwt(format!("{} is not valid JSON: {}", what, e)))
}

#[cfg(test)]
#[path = "jwt_tests.rs"]
mod tests;
