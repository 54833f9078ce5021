use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use super::{CacheKey, CacheStore};
use crate::error::Result;
use crate::models::CacheEntry;

/// Durable cache backed by the `cache` table.
///
/// SQLite serializes writers, and `INSERT OR REPLACE` swaps the whole row in
/// one statement, so concurrent stores to a key never interleave bytes.
#[derive(Clone)]
pub struct SqliteCacheStore {
    pool: SqlitePool,
}

impl SqliteCacheStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of stored responses
    pub async fn count(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM cache")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let entry = sqlx::query_as::<_, CacheEntry>(
            "SELECT url, content, content_type, timestamp FROM cache WHERE url = ?1",
        )
        .bind(key.storage_key())
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn put(&self, key: &CacheKey, content: Bytes, content_type: &str) -> Result<()> {
        let storage_key = key.storage_key();

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO cache (url, content, content_type, timestamp)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&storage_key)
        .bind(&content[..])
        .bind(content_type)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        debug!(key = %storage_key, bytes = content.len(), "Stored response in cache");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
