//! SQLite-backed [`CacheBackend`].
//!
//! Stores entries in the `cache_entries` table created by
//! [`migrate::apply`](crate::migrate::apply). Inserts are upserts, so
//! re-computing a key overwrites the previous value.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;

use super::CacheBackend;

pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheBackend for SqliteBackend {
    async fn lookup(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM cache_entries WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    async fn insert(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                created_at = excluded.created_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn len(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cache_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM cache_entries")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheError, CacheKey, TwoTierCache};
    use crate::{db, migrate};
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn backend(tmp: &TempDir) -> SqliteBackend {
        let pool = db::connect_path(&tmp.path().join("cache.sqlite"))
            .await
            .unwrap();
        migrate::apply(&pool).await.unwrap();
        SqliteBackend::new(pool)
    }

    #[tokio::test]
    async fn upserts_and_looks_up() {
        let tmp = TempDir::new().unwrap();
        let backend = backend(&tmp).await;

        assert_eq!(backend.lookup("k").await.unwrap(), None);
        backend.insert("k", "\"one\"").await.unwrap();
        backend.insert("k", "\"two\"").await.unwrap();

        assert_eq!(backend.lookup("k").await.unwrap().as_deref(), Some("\"two\""));
        assert_eq!(backend.len().await.unwrap(), 1);

        backend.clear().await.unwrap();
        assert_eq!(backend.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn survives_a_fresh_cache_instance() {
        let tmp = TempDir::new().unwrap();
        let key = CacheKey::from_parts("research", &["acme"]);

        let first = TwoTierCache::new(Arc::new(backend(&tmp).await));
        let v: String = first
            .get_or_compute(&key, || async { Ok::<_, CacheError>("report".to_string()) })
            .await
            .unwrap();
        assert_eq!(v, "report");

        // A new process sees the value through the durable tier only.
        let second = TwoTierCache::new(Arc::new(backend(&tmp).await));
        let v: String = second
            .get_or_compute(&key, || async {
                Ok::<_, CacheError>("recomputed".to_string())
            })
            .await
            .unwrap();
        assert_eq!(v, "report");
        assert_eq!(second.stats().durable_hits, 1);
        assert_eq!(second.stats().misses, 0);
    }
}
