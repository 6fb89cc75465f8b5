use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::domain::{Budget, Cents, NewTransaction, Transaction, TransactionId};

use super::{BudgetStore, MIGRATION_001_INITIAL, TransactionStore};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite-backed store for transactions and budgets.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new store with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database, creating the file if it doesn't exist.
    ///
    /// WAL mode and a busy timeout let concurrent import workers write
    /// without failing on a locked database.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {}", database_url))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a database (connect + migrate).
    pub async fn init(database_url: &str, max_connections: u32) -> Result<Self> {
        let store = Self::connect(database_url, max_connections).await?;
        store.migrate().await?;
        Ok(store)
    }

    // ========================
    // Transaction operations
    // ========================

    /// Save a new transaction and return the assigned id.
    pub async fn save_transaction(&self, transaction: &NewTransaction) -> Result<TransactionId> {
        let row = sqlx::query(
            r#"
            INSERT INTO transactions (amount_cents, category, description, date, recorded_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(transaction.amount_cents)
        .bind(&transaction.category)
        .bind(&transaction.description)
        .bind(format_date(transaction.booking_date()))
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .context("Failed to save transaction")?;

        Ok(row.get("id"))
    }

    /// List all transactions, newest first.
    pub async fn list_transactions(&self) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, amount_cents, category, description, date
            FROM transactions
            ORDER BY date DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transactions")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    /// Sum every transaction in a category, regardless of date.
    pub async fn sum_transactions_by_category(&self, category: &str) -> Result<Cents> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount_cents), 0) as total
            FROM transactions
            WHERE category = ?
            "#,
        )
        .bind(category)
        .fetch_one(&self.pool)
        .await
        .context("Failed to sum transactions by category")?;

        Ok(row.get("total"))
    }

    /// Distinct categories with activity inside an inclusive date range.
    pub async fn categories_in_range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT category
            FROM transactions
            WHERE date >= ? AND date <= ?
            ORDER BY category
            "#,
        )
        .bind(format_date(from))
        .bind(format_date(to))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list categories in range")?;

        Ok(rows.iter().map(|row| row.get("category")).collect())
    }

    /// Sum a category's transactions inside an inclusive date range.
    pub async fn sum_category_in_range(
        &self,
        category: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Cents> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount_cents), 0) as total
            FROM transactions
            WHERE category = ? AND date >= ? AND date <= ?
            "#,
        )
        .bind(category)
        .bind(format_date(from))
        .bind(format_date(to))
        .fetch_one(&self.pool)
        .await
        .context("Failed to sum category in range")?;

        Ok(row.get("total"))
    }

    fn row_to_transaction(row: &SqliteRow) -> Result<Transaction> {
        let date_str: String = row.get("date");

        Ok(Transaction {
            id: row.get("id"),
            amount_cents: row.get("amount_cents"),
            category: row.get("category"),
            description: row.get("description"),
            date: parse_date(&date_str)?,
        })
    }

    // ========================
    // Budget operations
    // ========================

    /// Insert a budget, replacing any existing one for the same category.
    pub async fn save_budget(&self, budget: &Budget) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO budgets (category, limit_cents, period, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(category) DO UPDATE SET
                limit_cents = excluded.limit_cents,
                period = excluded.period,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&budget.category)
        .bind(budget.limit_cents)
        .bind(&budget.period)
        .bind(budget.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save budget")?;
        Ok(())
    }

    /// Get a budget by category.
    pub async fn get_budget_by_category(&self, category: &str) -> Result<Option<Budget>> {
        let row = sqlx::query(
            r#"
            SELECT category, limit_cents, period, updated_at
            FROM budgets
            WHERE category = ?
            "#,
        )
        .bind(category)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch budget by category")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_budget(&row)?)),
            None => Ok(None),
        }
    }

    /// List all budgets.
    pub async fn list_budgets(&self) -> Result<Vec<Budget>> {
        let rows = sqlx::query(
            r#"
            SELECT category, limit_cents, period, updated_at
            FROM budgets
            ORDER BY category
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list budgets")?;

        rows.iter().map(Self::row_to_budget).collect()
    }

    fn row_to_budget(row: &SqliteRow) -> Result<Budget> {
        let updated_at_str: String = row.get("updated_at");

        Ok(Budget {
            category: row.get("category"),
            limit_cents: row.get("limit_cents"),
            period: row.get("period"),
            updated_at: DateTime::parse_from_rfc3339(&updated_at_str)
                .context("Invalid updated_at timestamp")?
                .with_timezone(&Utc),
        })
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(s, DATE_FORMAT)
        .with_context(|| format!("Invalid transaction date: {}", s))?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}

#[async_trait]
impl TransactionStore for SqliteStore {
    async fn insert(&self, transaction: &NewTransaction) -> Result<TransactionId> {
        self.save_transaction(transaction).await
    }

    async fn list(&self) -> Result<Vec<Transaction>> {
        self.list_transactions().await
    }

    async fn sum_by_category(&self, category: &str) -> Result<Cents> {
        self.sum_transactions_by_category(category).await
    }

    async fn list_categories_in_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<String>> {
        self.categories_in_range(from, to).await
    }

    async fn sum_by_category_in_range(
        &self,
        category: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Cents> {
        self.sum_category_in_range(category, from, to).await
    }
}

#[async_trait]
impl BudgetStore for SqliteStore {
    async fn upsert(&self, budget: &Budget) -> Result<()> {
        self.save_budget(budget).await
    }

    async fn get_limit(&self, category: &str) -> Result<Option<Cents>> {
        Ok(self
            .get_budget_by_category(category)
            .await?
            .map(|budget| budget.limit_cents))
    }

    async fn get(&self, category: &str) -> Result<Option<Budget>> {
        self.get_budget_by_category(category).await
    }

    async fn list(&self) -> Result<Vec<Budget>> {
        self.list_budgets().await
    }
}
