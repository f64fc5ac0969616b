use std::collections::HashMap;

use axum::http::{header, HeaderMap, StatusCode};
use sha2::{Digest, Sha256};

/// SHA-256 hex digest of an API token. Only digests appear in config
/// and in memory after startup, never the secrets themselves.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let result = hasher.finalize();
    hex::encode(result)
}

/// Token digest to identity lookup, built once from config.
#[derive(Debug, Clone, Default)]
pub struct TokenMap {
    by_digest: HashMap<String, String>,
}

impl TokenMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identity: &str, token_sha256: &str) {
        self.by_digest
            .insert(token_sha256.to_ascii_lowercase(), identity.to_string());
    }

    /// Resolve the identity a raw bearer token authenticates.
    pub fn identity_for(&self, token: &str) -> Option<&str> {
        self.by_digest.get(&hash_token(token)).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.by_digest.is_empty()
    }
}

/// Extract the `Authorization: Bearer` identity or fail with 401.
pub fn require_identity(
    tokens: &TokenMap,
    headers: &HeaderMap,
) -> Result<String, (StatusCode, String)> {
    let unauthorized = |message: &str| (StatusCode::UNAUTHORIZED, message.to_string());

    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| unauthorized("missing Authorization header"))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized("expected a bearer token"))?;
    tokens
        .identity_for(token.trim())
        .map(str::to_string)
        .ok_or_else(|| unauthorized("unknown token"))
}
