use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::Cents;

/// Per-category totals keyed by normalized category.
pub type CategoryTotals = BTreeMap<String, Cents>;

/// How far a category's cumulative spend has progressed toward its limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetProgress {
    pub category: String,
    pub limit_cents: Cents,
    pub spent_cents: Cents,
    pub percent: f64,
}

impl BudgetProgress {
    pub fn new(category: String, limit_cents: Cents, spent_cents: Cents) -> Self {
        let percent = if limit_cents > 0 {
            spent_cents as f64 / limit_cents as f64 * 100.0
        } else {
            0.0
        };
        Self {
            category,
            limit_cents,
            spent_cents,
            percent,
        }
    }

    pub fn remaining_cents(&self) -> Cents {
        self.limit_cents - self.spent_cents
    }
}

/// Range totals together with the state of every configured budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendingReport {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub total: Cents,
    pub by_category: CategoryTotals,
    pub progress: Vec<BudgetProgress>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_progress_percent() {
        let progress = BudgetProgress::new("food".into(), 100000, 90000);
        assert!((progress.percent - 90.0).abs() < f64::EPSILON);
        assert_eq!(progress.remaining_cents(), 10000);
    }
}
