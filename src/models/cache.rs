use bytes::Bytes;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// One cached origin response.
///
/// `content` holds the raw bytes received from the origin, status line and
/// headers included, and is replayed verbatim on a hit.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CacheEntry {
    #[sqlx(rename = "url")]
    pub key: String,
    pub content: Vec<u8>,
    pub content_type: String,
    #[sqlx(rename = "timestamp")]
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, content: Bytes, content_type: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            content: content.to_vec(),
            content_type: content_type.into(),
            stored_at: Utc::now(),
        }
    }

    /// Size of the cached payload in bytes
    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
