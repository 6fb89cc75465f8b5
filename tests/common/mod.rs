// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use spendguard::application::{Cache, LedgerService, MemoryCache};
use spendguard::domain::{Cents, NewTransaction, Transaction, TransactionId};
use spendguard::storage::{BudgetStore, SqliteStore, TransactionStore};
use spendguard::LedgerConfig;
use tempfile::TempDir;
use tokio::sync::Barrier;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    test_service_with(LedgerConfig::default()).await
}

pub async fn test_service_with(config: LedgerConfig) -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init(db_path.to_str().unwrap(), config).await?;
    Ok((service, temp_dir))
}

/// Helper to open a bare store in a temporary database
pub async fn test_store() -> Result<(SqliteStore, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let store = SqliteStore::init(&format!("sqlite:{}", db_path.to_str().unwrap()), 10).await?;
    Ok((store, temp_dir))
}

/// Service whose transaction reads and writes go through `transactions`,
/// with budgets kept in `store`.
pub fn service_over(
    transactions: Arc<dyn TransactionStore>,
    store: &SqliteStore,
    config: LedgerConfig,
) -> LedgerService {
    let budgets: Arc<dyn BudgetStore> = Arc::new(store.clone());
    let cache: Option<Arc<dyn Cache>> = if config.cache_enabled {
        Some(Arc::new(MemoryCache::new()))
    } else {
        None
    };
    LedgerService::new(transactions, budgets, cache, config)
}

/// Helper to parse a date string into DateTime<Utc>
pub fn parse_date(date_str: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
}

pub fn day(date_str: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap()
}

pub fn new_tx(amount_cents: Cents, category: &str, date_str: &str) -> NewTransaction {
    NewTransaction::new(amount_cents, category, "test", parse_date(date_str))
}

/// Makes the first `gated` cumulative-spend reads wait for each other, so
/// concurrent writers all observe the same spend before any of them inserts.
pub struct RacingStore {
    inner: SqliteStore,
    barrier: Barrier,
    gated: usize,
    reads: AtomicUsize,
}

impl RacingStore {
    pub fn new(inner: SqliteStore, gated: usize) -> Self {
        Self {
            inner,
            barrier: Barrier::new(gated),
            gated,
            reads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TransactionStore for RacingStore {
    async fn insert(&self, transaction: &NewTransaction) -> Result<TransactionId> {
        self.inner.insert(transaction).await
    }

    async fn list(&self) -> Result<Vec<Transaction>> {
        TransactionStore::list(&self.inner).await
    }

    async fn sum_by_category(&self, category: &str) -> Result<Cents> {
        let spent = self.inner.sum_by_category(category).await?;
        if self.reads.fetch_add(1, Ordering::SeqCst) < self.gated {
            self.barrier.wait().await;
        }
        Ok(spent)
    }

    async fn list_categories_in_range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<String>> {
        self.inner.list_categories_in_range(from, to).await
    }

    async fn sum_by_category_in_range(
        &self,
        category: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Cents> {
        self.inner.sum_by_category_in_range(category, from, to).await
    }
}

/// Adds a fixed delay to every insert, or after every range sum has
/// read its total.
pub struct SlowStore {
    inner: SqliteStore,
    insert_delay: Duration,
    range_delay: Duration,
    inserts: AtomicUsize,
}

impl SlowStore {
    pub fn new(inner: SqliteStore, insert_delay: Duration) -> Self {
        Self {
            inner,
            insert_delay,
            range_delay: Duration::ZERO,
            inserts: AtomicUsize::new(0),
        }
    }

    /// Fast writes, slow report sums.
    pub fn slow_reports(inner: SqliteStore, range_delay: Duration) -> Self {
        Self {
            inner,
            insert_delay: Duration::ZERO,
            range_delay,
            inserts: AtomicUsize::new(0),
        }
    }

    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionStore for SlowStore {
    async fn insert(&self, transaction: &NewTransaction) -> Result<TransactionId> {
        tokio::time::sleep(self.insert_delay).await;
        let id = self.inner.insert(transaction).await?;
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn list(&self) -> Result<Vec<Transaction>> {
        TransactionStore::list(&self.inner).await
    }

    async fn sum_by_category(&self, category: &str) -> Result<Cents> {
        self.inner.sum_by_category(category).await
    }

    async fn list_categories_in_range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<String>> {
        self.inner.list_categories_in_range(from, to).await
    }

    async fn sum_by_category_in_range(
        &self,
        category: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Cents> {
        let total = self.inner.sum_by_category_in_range(category, from, to).await?;
        tokio::time::sleep(self.range_delay).await;
        Ok(total)
    }
}

/// Fails range sums for one category at once; every other category
/// answers after `healthy_delay`.
pub struct FailingStore {
    inner: SqliteStore,
    failing_category: String,
    healthy_delay: Duration,
    range_sums: AtomicUsize,
    completed_sums: AtomicUsize,
}

impl FailingStore {
    pub fn new(inner: SqliteStore, failing_category: &str, healthy_delay: Duration) -> Self {
        Self {
            inner,
            failing_category: failing_category.to_string(),
            healthy_delay,
            range_sums: AtomicUsize::new(0),
            completed_sums: AtomicUsize::new(0),
        }
    }

    /// Range sums started.
    pub fn range_sums(&self) -> usize {
        self.range_sums.load(Ordering::SeqCst)
    }

    /// Healthy range sums that ran to completion.
    pub fn completed_sums(&self) -> usize {
        self.completed_sums.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionStore for FailingStore {
    async fn insert(&self, transaction: &NewTransaction) -> Result<TransactionId> {
        self.inner.insert(transaction).await
    }

    async fn list(&self) -> Result<Vec<Transaction>> {
        TransactionStore::list(&self.inner).await
    }

    async fn sum_by_category(&self, category: &str) -> Result<Cents> {
        self.inner.sum_by_category(category).await
    }

    async fn list_categories_in_range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<String>> {
        self.inner.list_categories_in_range(from, to).await
    }

    async fn sum_by_category_in_range(
        &self,
        category: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Cents> {
        self.range_sums.fetch_add(1, Ordering::SeqCst);
        if category == self.failing_category {
            return Err(anyhow!("disk I/O error"));
        }
        tokio::time::sleep(self.healthy_delay).await;
        let total = self.inner.sum_by_category_in_range(category, from, to).await?;
        self.completed_sums.fetch_add(1, Ordering::SeqCst);
        Ok(total)
    }
}
