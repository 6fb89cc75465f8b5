use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::domain::{admits, truncate_to_day, NewTransaction, Transaction};
use crate::storage::{BudgetStore, TransactionStore};

use super::{AppError, WriteGeneration};

/// The check-then-act sequence every accepting path goes through.
///
/// 1. fold the category
/// 2. look up the limit (no budget means unconditional acceptance)
/// 3. read the cumulative spend for the category
/// 4. reject if `spend + amount > limit`, otherwise insert
///
/// Steps 3 and 4 are separate store calls. Two concurrent writers to the
/// same category can both pass step 4 and together exceed the limit,
/// unless `serialize_category_writes` is set, in which case a per-category
/// lock is held across steps 2-4. That lock is process-local only.
///
/// Every successful insert advances the shared write generation.
#[derive(Clone)]
pub struct BudgetEnforcer {
    budgets: Arc<dyn BudgetStore>,
    transactions: Arc<dyn TransactionStore>,
    category_locks: Option<Arc<CategoryLocks>>,
    writes: WriteGeneration,
}

impl BudgetEnforcer {
    pub fn new(budgets: Arc<dyn BudgetStore>, transactions: Arc<dyn TransactionStore>) -> Self {
        Self {
            budgets,
            transactions,
            category_locks: None,
            writes: WriteGeneration::default(),
        }
    }

    /// Share `writes` with readers that must notice every accepted insert.
    pub fn with_write_generation(mut self, writes: WriteGeneration) -> Self {
        self.writes = writes;
        self
    }

    /// Serialize writes per category within this process.
    pub fn serialized(mut self) -> Self {
        self.category_locks = Some(Arc::new(CategoryLocks::default()));
        self
    }

    /// Apply the budget check to an already validated transaction and
    /// persist it on success.
    pub async fn try_add(&self, transaction: NewTransaction) -> Result<Transaction, AppError> {
        let transaction = transaction.normalized();

        let _guard = match &self.category_locks {
            Some(locks) => Some(locks.lock_for(&transaction.category).lock_owned().await),
            None => None,
        };

        if let Some(limit) = self.budgets.get_limit(&transaction.category).await? {
            let spent = self
                .transactions
                .sum_by_category(&transaction.category)
                .await?;
            if !admits(limit, spent, transaction.amount_cents) {
                tracing::debug!(
                    category = %transaction.category,
                    spent,
                    limit,
                    requested = transaction.amount_cents,
                    "budget exceeded"
                );
                return Err(AppError::BudgetExceeded {
                    category: transaction.category,
                    spent,
                    limit,
                    requested: transaction.amount_cents,
                });
            }
        }

        let id = self.transactions.insert(&transaction).await?;
        self.writes.advance();

        Ok(Transaction {
            id,
            amount_cents: transaction.amount_cents,
            category: transaction.category,
            description: transaction.description,
            date: truncate_to_day(transaction.date),
        })
    }
}

/// One async mutex per category, created on first use.
#[derive(Default)]
struct CategoryLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CategoryLocks {
    fn lock_for(&self, category: &str) -> Arc<tokio::sync::Mutex<()>> {
        // Poisoning leaves the map itself intact
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(category.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}
