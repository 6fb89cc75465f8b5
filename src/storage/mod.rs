mod sqlite;

pub use sqlite::*;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::{Budget, Cents, NewTransaction, Transaction, TransactionId};

/// SQL migration for the initial schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

/// Durable, append-only storage for transactions.
///
/// Range bounds are calendar dates compared inclusively on both ends.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Persist a transaction (time of day dropped) and return its new identity.
    async fn insert(&self, transaction: &NewTransaction) -> Result<TransactionId>;

    /// All transactions, newest date first, ties broken by descending id.
    async fn list(&self) -> Result<Vec<Transaction>>;

    /// Cumulative spend in a category, no date filter.
    async fn sum_by_category(&self, category: &str) -> Result<Cents>;

    /// Distinct categories with at least one transaction in `[from, to]`.
    async fn list_categories_in_range(&self, from: NaiveDate, to: NaiveDate)
    -> Result<Vec<String>>;

    async fn sum_by_category_in_range(
        &self,
        category: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Cents>;
}

/// Durable storage mapping category to budget.
#[async_trait]
pub trait BudgetStore: Send + Sync {
    /// Insert or overwrite the budget for its category.
    async fn upsert(&self, budget: &Budget) -> Result<()>;

    async fn get_limit(&self, category: &str) -> Result<Option<Cents>>;

    async fn get(&self, category: &str) -> Result<Option<Budget>>;

    /// All budgets ordered by category.
    async fn list(&self) -> Result<Vec<Budget>>;
}
