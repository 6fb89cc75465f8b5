use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::LedgerConfig;
use crate::domain::{
    cents_from_f64, Budget, BudgetInput, BudgetProgress, CategoryTotals, Cents, ImportItem,
    ImportSummary, NewTransaction, SpendingReport, Transaction, ValidationError,
    normalize_category,
};
use crate::storage::{BudgetStore, SqliteStore, TransactionStore};

use super::cache::{report_summary_key, BUDGETS_KEY, REPORT_PREFIX};
use super::{
    AppError, BudgetEnforcer, Cache, ErrorKind, ImportPipeline, MemoryCache, ReportAggregator,
    Scope, WriteGeneration,
};

/// Application service providing the ledger operations.
/// This is the primary interface for any client (CLI, API, etc.).
///
/// Stores and cache are injected once at construction; nothing here is global.
pub struct LedgerService {
    transactions: Arc<dyn TransactionStore>,
    budgets: Arc<dyn BudgetStore>,
    cache: Option<Arc<dyn Cache>>,
    enforcer: BudgetEnforcer,
    pipeline: ImportPipeline,
    reports: ReportAggregator,
    writes: WriteGeneration,
    config: LedgerConfig,
}

/// Cached payload stamped with the write generation it was computed under.
#[derive(Serialize, Deserialize)]
struct Stamped<T> {
    generation: u64,
    value: T,
}

/// An error as shown to a caller: a stable kind plus a safe message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallerError {
    pub kind: &'static str,
    pub message: String,
}

impl LedgerService {
    /// Create a new ledger service over the given stores.
    pub fn new(
        transactions: Arc<dyn TransactionStore>,
        budgets: Arc<dyn BudgetStore>,
        cache: Option<Arc<dyn Cache>>,
        config: LedgerConfig,
    ) -> Self {
        let writes = WriteGeneration::default();
        let mut enforcer = BudgetEnforcer::new(Arc::clone(&budgets), Arc::clone(&transactions))
            .with_write_generation(writes.clone());
        if config.serialize_category_writes {
            enforcer = enforcer.serialized();
        }
        let pipeline =
            ImportPipeline::new(enforcer.clone()).with_default_workers(config.default_workers);
        let reports = ReportAggregator::new(Arc::clone(&transactions))
            .with_progress_interval(config.progress_interval);

        Self {
            transactions,
            budgets,
            cache,
            enforcer,
            pipeline,
            reports,
            writes,
            config,
        }
    }

    /// Service backed by a single SQLite store, with an in-memory cache when enabled.
    pub fn from_store(store: SqliteStore, config: LedgerConfig) -> Self {
        let store = Arc::new(store);
        let cache: Option<Arc<dyn Cache>> = if config.cache_enabled {
            Some(Arc::new(MemoryCache::new()))
        } else {
            None
        };
        Self::new(store.clone(), store, cache, config)
    }

    /// Open (creating if needed) the database at the given path.
    pub async fn init(database_path: &str, config: LedgerConfig) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let store = SqliteStore::init(&db_url, config.max_connections).await?;
        Ok(Self::from_store(store, config))
    }

    // ========================
    // Transaction operations
    // ========================

    /// Record one transaction, subject to its category's budget.
    pub async fn add_transaction(
        &self,
        amount_cents: Cents,
        category: &str,
        description: &str,
        date: DateTime<Utc>,
    ) -> Result<Transaction, AppError> {
        let transaction = NewTransaction::new(amount_cents, category, description, date);
        transaction.validate()?;

        let transaction = self.enforcer.try_add(transaction).await?;
        self.invalidate_prefix(REPORT_PREFIX).await;
        Ok(transaction)
    }

    /// List all transactions, newest first.
    pub async fn list_transactions(&self) -> Result<Vec<Transaction>, AppError> {
        Ok(self.transactions.list().await?)
    }

    /// Import a batch with up to `workers` concurrent writers.
    ///
    /// Per-item failures never abort the batch. An interrupted `scope` (or
    /// the configured import timeout) yields `AppError::ImportAborted`
    /// holding the partial summary.
    pub async fn bulk_import(
        &self,
        scope: &Scope,
        items: Vec<ImportItem>,
        workers: i32,
    ) -> Result<ImportSummary, AppError> {
        let scope = self.bounded(scope, self.config.import_timeout);
        let result = self.pipeline.run(&scope, items, workers).await;
        self.invalidate_prefix(REPORT_PREFIX).await;
        result
    }

    // ========================
    // Budget operations
    // ========================

    /// Create or replace the budget for a category.
    /// Changing a limit never affects already accepted transactions.
    pub async fn set_budget(
        &self,
        category: &str,
        limit_cents: Cents,
        period: Option<&str>,
    ) -> Result<Budget, AppError> {
        let budget = Budget::new(category, limit_cents, period);
        budget.validate()?;

        self.budgets.upsert(&budget).await?;
        self.writes.advance();
        self.invalidate(&[BUDGETS_KEY]).await;
        Ok(budget)
    }

    /// Apply a list of budgets in order, stopping at the first invalid one.
    pub async fn load_budgets(&self, inputs: Vec<BudgetInput>) -> Result<Vec<Budget>, AppError> {
        let mut loaded = Vec::with_capacity(inputs.len());
        for input in inputs {
            let limit_cents = cents_from_f64(input.limit)
                .map_err(|e| ValidationError::new("limit", format!("{}: {}", e, input.limit)))?;
            let budget = self
                .set_budget(&input.category, limit_cents, input.period.as_deref())
                .await?;
            loaded.push(budget);
        }
        Ok(loaded)
    }

    /// Get the budget for a category.
    pub async fn get_budget(&self, category: &str) -> Result<Budget, AppError> {
        let category = normalize_category(category);
        let budget = self.budgets.get(&category).await?;
        budget.ok_or(AppError::BudgetNotFound(category))
    }

    /// List all budgets, ordered by category.
    pub async fn list_budgets(&self) -> Result<Vec<Budget>, AppError> {
        if let Some(budgets) = self.cached::<Vec<Budget>>(BUDGETS_KEY).await {
            return Ok(budgets);
        }
        let generation = self.writes.current();
        let budgets = self.budgets.list().await?;
        self.store_cached(BUDGETS_KEY, generation, &budgets).await;
        Ok(budgets)
    }

    /// Cumulative spend of one category, the figure its budget is checked against.
    pub async fn category_spend(&self, category: &str) -> Result<Cents, AppError> {
        let category = normalize_category(category);
        Ok(self.transactions.sum_by_category(&category).await?)
    }

    // ========================
    // Reporting operations
    // ========================

    /// Total spend per category within `[from, to]`.
    pub async fn report_summary(
        &self,
        scope: &Scope,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<CategoryTotals, AppError> {
        if from > to {
            return Err(AppError::InvalidRange { from, to });
        }

        let key = report_summary_key(from, to);
        if let Some(totals) = self.cached::<CategoryTotals>(&key).await {
            return Ok(totals);
        }

        let generation = self.writes.current();
        let scope = self.bounded(scope, self.config.report_timeout);
        let totals = self.reports.summarize(&scope, from, to).await?;
        self.store_cached(&key, generation, &totals).await;
        Ok(totals)
    }

    /// Range totals plus where every budget stands against its limit.
    ///
    /// Budget progress uses the same unbounded cumulative spend the
    /// budget check compares against, not the range totals.
    pub async fn spending_report(
        &self,
        scope: &Scope,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<SpendingReport, AppError> {
        let by_category = self.report_summary(scope, from, to).await?;
        let total = by_category.values().sum();

        let mut progress = Vec::new();
        for budget in self.list_budgets().await? {
            if let Some(interrupt) = scope.interrupted() {
                return Err(interrupt.into());
            }
            let spent = self.transactions.sum_by_category(&budget.category).await?;
            progress.push(BudgetProgress::new(
                budget.category,
                budget.limit_cents,
                spent,
            ));
        }

        Ok(SpendingReport {
            from,
            to,
            total,
            by_category,
            progress,
        })
    }

    // ========================
    // Error mapping
    // ========================

    /// Translate an internal failure into what a caller is allowed to see.
    /// Internal details are logged here and replaced with a generic message.
    pub fn caller_error(err: &AppError) -> CallerError {
        let kind = err.kind();
        let message = match kind {
            ErrorKind::Internal => {
                tracing::error!(error = %err, "internal error");
                "internal error".to_string()
            }
            _ => err.to_string(),
        };
        CallerError {
            kind: kind.as_str(),
            message,
        }
    }

    // ========================
    // Helpers
    // ========================

    fn bounded(&self, scope: &Scope, timeout: Option<Duration>) -> Scope {
        match timeout {
            Some(timeout) => scope.child().with_timeout(timeout),
            None => scope.clone(),
        }
    }

    /// Cached value for `key`, unless a write happened since it was computed.
    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let cache = self.cache.as_ref()?;
        match cache.get(key).await {
            Ok(Some(raw)) => {
                let stamped: Stamped<T> = serde_json::from_str(&raw).ok()?;
                (stamped.generation == self.writes.current()).then_some(stamped.value)
            }
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(key, error = %err, "cache read failed");
                None
            }
        }
    }

    /// Cache `value`, computed after observing `generation`. Skipped when a
    /// write landed meanwhile.
    async fn store_cached<T: Serialize>(&self, key: &str, generation: u64, value: &T) {
        let Some(cache) = &self.cache else {
            return;
        };
        if generation != self.writes.current() {
            tracing::debug!(key, "write during computation, not caching");
            return;
        }
        let raw = match serde_json::to_string(&Stamped { generation, value }) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(key, error = %err, "cache encode failed");
                return;
            }
        };
        if let Err(err) = cache.set(key, raw, self.config.cache_ttl).await {
            tracing::warn!(key, error = %err, "cache write failed");
        }
    }

    async fn invalidate(&self, keys: &[&str]) {
        if let Some(cache) = &self.cache {
            if let Err(err) = cache.del(keys).await {
                tracing::warn!(error = %err, "cache invalidation failed");
            }
        }
    }

    async fn invalidate_prefix(&self, prefix: &str) {
        if let Some(cache) = &self.cache {
            if let Err(err) = cache.del_prefix(prefix).await {
                tracing::warn!(prefix, error = %err, "cache invalidation failed");
            }
        }
    }
}
