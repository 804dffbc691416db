use super::{CacheEntry, CacheNamespace, CacheStore};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local store for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<(CacheNamespace, String), CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, ns: CacheNamespace) -> usize {
        self.entries
            .read()
            .await
            .keys()
            .filter(|(n, _)| *n == ns)
            .count()
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, ns: CacheNamespace, key: &str) -> anyhow::Result<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(&(ns, key.to_string())).cloned())
    }

    async fn put(&self, ns: CacheNamespace, entry: CacheEntry) -> anyhow::Result<()> {
        self.entries
            .write()
            .await
            .insert((ns, entry.key.clone()), entry);
        Ok(())
    }

    async fn delete(&self, ns: CacheNamespace, key: &str) -> anyhow::Result<u64> {
        let removed = self.entries.write().await.remove(&(ns, key.to_string()));
        Ok(u64::from(removed.is_some()))
    }

    async fn delete_tagged(&self, ns: CacheNamespace, tag: &str) -> anyhow::Result<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|(n, _), e| !(*n == ns && e.tag.as_deref() == Some(tag)));
        Ok((before - entries.len()) as u64)
    }

    async fn delete_if_expired(
        &self,
        ns: CacheNamespace,
        key: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let mut entries = self.entries.write().await;
        let map_key = (ns, key.to_string());
        if entries.get(&map_key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(&map_key);
            return Ok(1);
        }
        Ok(0)
    }

    async fn record_hit(
        &self,
        ns: CacheNamespace,
        key: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if let Some(entry) = self.entries.write().await.get_mut(&(ns, key.to_string())) {
            entry.access_count += 1;
            entry.last_accessed = Some(at);
        }
        Ok(())
    }

    async fn delete_expired(&self, ns: CacheNamespace, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|(n, _), e| !(*n == ns && e.is_expired(now)));
        Ok((before - entries.len()) as u64)
    }
}
