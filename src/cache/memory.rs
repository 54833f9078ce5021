use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use super::{CacheKey, CacheStore};
use crate::error::Result;
use crate::models::CacheEntry;

/// Process-lifetime cache held in a concurrent map.
///
/// Each key lives in exactly one shard, so an insert for one key is atomic
/// with respect to other writers of that key.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: &CacheKey, content: Bytes, content_type: &str) -> Result<()> {
        let entry = CacheEntry::new(key.storage_key(), content, content_type);
        self.entries.insert(key.clone(), entry);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
