//! Response cache
//!
//! A pure content cache: responses are stored exactly as received from the
//! origin and replayed verbatim, with no validators and no expiry.
//!
//! - [`CacheStore`] is the backend contract (durable SQLite or in-memory)
//! - [`ResponseCache`] is what the connection handler talks to; it turns
//!   backend failures into logged misses so a cache problem never reaches
//!   the client

mod key;
mod memory;
mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::CacheEntry;

pub use key::{body_digest, CacheKey};
pub use memory::MemoryCacheStore;
pub use sqlite::SqliteCacheStore;

/// Key/value persistence for origin responses
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up a stored response. Absence is `Ok(None)`, never an error.
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Insert or replace the response stored under `key`
    async fn put(&self, key: &CacheKey, content: Bytes, content_type: &str) -> Result<()>;

    /// Short backend name used in logs
    fn backend_name(&self) -> &'static str;
}

/// Cache façade injected into the connection handler.
///
/// GET responses go to the configured page store. POST responses are only
/// cached when the in-memory POST cache is enabled.
#[derive(Clone)]
pub struct ResponseCache {
    pages: Arc<dyn CacheStore>,
    posts: Option<Arc<MemoryCacheStore>>,
}

impl ResponseCache {
    pub fn new(pages: Arc<dyn CacheStore>) -> Self {
        Self { pages, posts: None }
    }

    /// Enable the in-memory POST cache
    pub fn with_post_cache(mut self) -> Self {
        self.posts = Some(Arc::new(MemoryCacheStore::new()));
        self
    }

    pub fn post_cache_enabled(&self) -> bool {
        self.posts.is_some()
    }

    pub fn backend_name(&self) -> &'static str {
        self.pages.backend_name()
    }

    fn store_for(&self, key: &CacheKey) -> Option<&dyn CacheStore> {
        match key {
            CacheKey::Url(_) => Some(self.pages.as_ref()),
            CacheKey::Post { .. } => self.posts.as_deref().map(|s| s as &dyn CacheStore),
        }
    }

    /// Fetch a cached response; backend failures and empty payloads are reported as a miss
    pub async fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        let store = self.store_for(key)?;

        match store.get(key).await {
            Ok(Some(entry)) if entry.is_empty() => {
                debug!(key = %key, backend = store.backend_name(), "Ignoring empty cached response");
                None
            }
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, backend = store.backend_name(), error = %e, "Cache retrieval failed");
                None
            }
        }
    }

    /// Persist a response; backend failures are logged and swallowed
    pub async fn store(&self, key: &CacheKey, content: Bytes, content_type: &str) {
        let Some(store) = self.store_for(key) else {
            return;
        };

        let len = content.len();
        match store.put(key, content, content_type).await {
            Ok(()) => debug!(key = %key, bytes = len, backend = store.backend_name(), "Cached"),
            Err(e) => {
                warn!(key = %key, backend = store.backend_name(), error = %e, "Cache save failed")
            }
        }
    }
}
