//! Cache key derivation.

use sha2::{Digest, Sha256};
use std::fmt;

/// Identity of a cached response.
///
/// GET responses are keyed by the normalized URL alone. POST responses are
/// keyed by the raw request URL together with a digest of the request body,
/// so only byte-identical replays hit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Url(String),
    Post { url: String, body_digest: String },
}

impl CacheKey {
    pub fn for_get(normalized_url: &str) -> Self {
        CacheKey::Url(normalized_url.to_string())
    }

    pub fn for_post(raw_url: &str, body: &[u8]) -> Self {
        CacheKey::Post {
            url: raw_url.to_string(),
            body_digest: body_digest(body),
        }
    }

    /// Stable string form used as the primary key in a backing store
    pub fn storage_key(&self) -> String {
        match self {
            CacheKey::Url(url) => url.clone(),
            CacheKey::Post { url, body_digest } => format!("POST {} {}", url, body_digest),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

/// Hex-encoded SHA-256 of a request body.
pub fn body_digest(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}
