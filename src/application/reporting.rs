use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::task::JoinSet;

use crate::domain::{Cents, CategoryTotals};
use crate::storage::TransactionStore;

use super::{AppError, Scope};

/// Computes per-category totals over an inclusive date range, one
/// concurrent task per category.
///
/// All-or-nothing: a failure in any category, or an interrupted scope,
/// fails the whole call and no partial map is returned.
#[derive(Clone)]
pub struct ReportAggregator {
    transactions: Arc<dyn TransactionStore>,
    progress_interval: Duration,
}

impl ReportAggregator {
    pub fn new(transactions: Arc<dyn TransactionStore>) -> Self {
        Self {
            transactions,
            progress_interval: Duration::from_millis(400),
        }
    }

    pub fn with_progress_interval(mut self, progress_interval: Duration) -> Self {
        // tokio intervals must be non-zero
        self.progress_interval = progress_interval.max(Duration::from_millis(1));
        self
    }

    pub async fn summarize(
        &self,
        scope: &Scope,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<CategoryTotals, AppError> {
        if from > to {
            return Err(AppError::InvalidRange { from, to });
        }
        if let Some(interrupt) = scope.interrupted() {
            return Err(interrupt.into());
        }

        let categories = self.transactions.list_categories_in_range(from, to).await?;
        let mut totals = CategoryTotals::new();
        if categories.is_empty() {
            return Ok(totals);
        }

        let pending = categories.len();
        let mut tasks: JoinSet<Result<(String, Cents), AppError>> = JoinSet::new();
        for category in categories {
            let transactions = Arc::clone(&self.transactions);
            let scope = scope.clone();
            tasks.spawn(async move {
                if let Some(interrupt) = scope.interrupted() {
                    return Err(interrupt.into());
                }
                let total = transactions
                    .sum_by_category_in_range(&category, from, to)
                    .await?;
                Ok((category, total))
            });
        }

        let mut progress = tokio::time::interval(self.progress_interval);
        // The first tick completes immediately
        progress.tick().await;

        loop {
            tokio::select! {
                joined = tasks.join_next() => {
                    let Some(joined) = joined else {
                        break;
                    };
                    let result = joined.map_err(|err| {
                        AppError::Internal(format!("report task failed: {}", err))
                    });
                    match result.and_then(|inner| inner) {
                        Ok((category, total)) => {
                            totals.insert(category, total);
                        }
                        Err(err) => {
                            tasks.abort_all();
                            return Err(err);
                        }
                    }
                }
                interrupt = scope.done() => {
                    tasks.abort_all();
                    return Err(interrupt.into());
                }
                _ = progress.tick() => {
                    tracing::info!(
                        completed = totals.len(),
                        total = pending,
                        "report summary calculating"
                    );
                }
            }
        }

        // A signal that arrived after the last task still invalidates the snapshot
        if let Some(interrupt) = scope.interrupted() {
            return Err(interrupt.into());
        }

        Ok(totals)
    }
}
