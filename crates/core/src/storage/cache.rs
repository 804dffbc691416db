use crate::cache::{CacheEntry, CacheNamespace, CacheStore};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Cache tables in Postgres, one per namespace.
#[derive(Debug, Clone)]
pub struct PgCacheStore {
    pool: sqlx::PgPool,
}

impl PgCacheStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

type EntryRow = (
    String,
    Option<String>,
    Value,
    DateTime<Utc>,
    DateTime<Utc>,
    i64,
    Option<DateTime<Utc>>,
);

#[async_trait::async_trait]
impl CacheStore for PgCacheStore {
    async fn get(&self, ns: CacheNamespace, key: &str) -> anyhow::Result<Option<CacheEntry>> {
        let table = ns.table();
        let row = sqlx::query_as::<_, EntryRow>(&format!(
            "SELECT key, tag, value, created_at, expires_at, access_count, last_accessed \
             FROM {table} WHERE key = $1"
        ))
        .persistent(false)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("select {table} failed"))?;

        Ok(row.map(
            |(key, tag, value, created_at, expires_at, access_count, last_accessed)| CacheEntry {
                key,
                tag,
                value,
                created_at,
                expires_at,
                access_count,
                last_accessed,
            },
        ))
    }

    async fn put(&self, ns: CacheNamespace, entry: CacheEntry) -> anyhow::Result<()> {
        let table = ns.table();
        sqlx::query(&format!(
            "INSERT INTO {table} (key, tag, value, created_at, expires_at, access_count, last_accessed) \
             VALUES ($1, $2, $3, $4, $5, 0, NULL) \
             ON CONFLICT (key) DO UPDATE \
               SET tag = EXCLUDED.tag, value = EXCLUDED.value, created_at = EXCLUDED.created_at, \
                   expires_at = EXCLUDED.expires_at, access_count = 0, last_accessed = NULL"
        ))
        .persistent(false)
        .bind(&entry.key)
        .bind(entry.tag.as_deref())
        .bind(&entry.value)
        .bind(entry.created_at)
        .bind(entry.expires_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("upsert {table} failed"))?;
        Ok(())
    }

    async fn delete(&self, ns: CacheNamespace, key: &str) -> anyhow::Result<u64> {
        let table = ns.table();
        let res = sqlx::query(&format!("DELETE FROM {table} WHERE key = $1"))
            .persistent(false)
            .bind(key)
            .execute(&self.pool)
            .await
            .with_context(|| format!("delete from {table} failed"))?;
        Ok(res.rows_affected())
    }

    async fn delete_tagged(&self, ns: CacheNamespace, tag: &str) -> anyhow::Result<u64> {
        let table = ns.table();
        let res = sqlx::query(&format!("DELETE FROM {table} WHERE tag = $1"))
            .persistent(false)
            .bind(tag)
            .execute(&self.pool)
            .await
            .with_context(|| format!("delete tagged from {table} failed"))?;
        Ok(res.rows_affected())
    }

    async fn delete_if_expired(
        &self,
        ns: CacheNamespace,
        key: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let table = ns.table();
        let res = sqlx::query(&format!(
            "DELETE FROM {table} WHERE key = $1 AND expires_at <= $2"
        ))
        .persistent(false)
        .bind(key)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("delete expired key from {table} failed"))?;
        Ok(res.rows_affected())
    }

    async fn record_hit(
        &self,
        ns: CacheNamespace,
        key: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let table = ns.table();
        sqlx::query(&format!(
            "UPDATE {table} SET access_count = access_count + 1, last_accessed = $2 WHERE key = $1"
        ))
        .persistent(false)
        .bind(key)
        .bind(at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("update {table} access stats failed"))?;
        Ok(())
    }

    async fn delete_expired(&self, ns: CacheNamespace, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let table = ns.table();
        let res = sqlx::query(&format!("DELETE FROM {table} WHERE expires_at <= $1"))
            .persistent(false)
            .bind(now)
            .execute(&self.pool)
            .await
            .with_context(|| format!("delete expired from {table} failed"))?;
        Ok(res.rows_affected())
    }
}
