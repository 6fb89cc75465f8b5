use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Key of the cached budget listing.
pub const BUDGETS_KEY: &str = "budgets:list";

/// Prefix shared by every cached report.
pub const REPORT_PREFIX: &str = "report:";

/// Cache key of a range summary.
pub fn report_summary_key(from: chrono::NaiveDate, to: chrono::NaiveDate) -> String {
    format!(
        "{}summary:{}:{}",
        REPORT_PREFIX,
        from.format("%Y-%m-%d"),
        to.format("%Y-%m-%d")
    )
}

/// Counter advanced by every write that can change a cached read.
///
/// A value computed while the generation moved must not be served:
/// readers stamp what they cache with the generation observed before
/// computing and only trust entries whose stamp is still current.
#[derive(Debug, Clone, Default)]
pub struct WriteGeneration(Arc<AtomicU64>);

impl WriteGeneration {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn advance(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Read accelerator consulted by list/report reads.
///
/// Never authoritative: any failure must be treated as a miss, and the
/// budget check must never read through it.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    async fn del(&self, keys: &[&str]) -> Result<()>;

    async fn del_prefix(&self, prefix: &str) -> Result<()>;
}

/// In-process cache with per-entry expiry.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-expired) entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|(_, expires_at)| *expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        entries.insert(key.to_string(), (value, now + ttl));
        Ok(())
    }

    async fn del(&self, keys: &[&str]) -> Result<()> {
        let mut entries = self.entries.write().await;
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }

    async fn del_prefix(&self, prefix: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_write_generation_is_shared_by_clones() {
        let writes = WriteGeneration::default();
        let seen_by_reader = writes.clone();
        assert_eq!(seen_by_reader.current(), 0);

        writes.advance();
        writes.advance();
        assert_eq!(seen_by_reader.current(), 2);
    }

    #[tokio::test]
    async fn test_set_get_del() -> Result<()> {
        let cache = MemoryCache::new();
        cache
            .set(BUDGETS_KEY, "[]".to_string(), Duration::from_secs(30))
            .await?;
        assert_eq!(cache.get(BUDGETS_KEY).await?, Some("[]".to_string()));

        cache.del(&[BUDGETS_KEY]).await?;
        assert_eq!(cache.get(BUDGETS_KEY).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_entries_are_misses() -> Result<()> {
        let cache = MemoryCache::new();
        cache
            .set("k", "v".to_string(), Duration::from_millis(5))
            .await?;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").await?, None);
        assert!(cache.is_empty().await);
        Ok(())
    }

    #[tokio::test]
    async fn test_del_prefix_only_drops_reports() -> Result<()> {
        let cache = MemoryCache::new();
        let from = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        let key = report_summary_key(from, to);
        assert_eq!(key, "report:summary:2025-01-01:2025-01-31");

        let ttl = Duration::from_secs(30);
        cache.set(&key, "{}".to_string(), ttl).await?;
        cache.set(BUDGETS_KEY, "[]".to_string(), ttl).await?;

        cache.del_prefix(REPORT_PREFIX).await?;

        assert_eq!(cache.get(&key).await?, None);
        assert!(cache.get(BUDGETS_KEY).await?.is_some());
        Ok(())
    }
}
