use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{normalize_category, Cents, ValidationError};

/// Period label applied when the caller gives none.
///
/// Periods are labels only: every budget is enforced over an unbounded
/// window and never resets on its own.
pub const DEFAULT_PERIOD: &str = "fixed";

/// Spending ceiling for one category. The normalized category is the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub category: String,
    pub limit_cents: Cents,
    pub period: String,
    pub updated_at: DateTime<Utc>,
}

impl Budget {
    /// Build a budget with a normalized category and the default period
    /// when `period` is blank.
    pub fn new(category: &str, limit_cents: Cents, period: Option<&str>) -> Self {
        let period = period
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_PERIOD);

        Self {
            category: normalize_category(category),
            limit_cents,
            period: period.to_string(),
            updated_at: Utc::now(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.category.trim().is_empty() {
            return Err(ValidationError::new("category", "budget category is empty"));
        }
        if self.limit_cents <= 0 {
            return Err(ValidationError::new("limit", "limit must be > 0"));
        }
        Ok(())
    }
}

/// Budget comparison shared by every write path: reaching the limit exactly is allowed.
pub fn admits(limit_cents: Cents, spent_cents: Cents, amount_cents: Cents) -> bool {
    spent_cents.saturating_add(amount_cents) <= limit_cents
}

/// Budget as read from an external source (e.g. a JSON file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetInput {
    pub category: String,
    pub limit: f64,
    #[serde(default)]
    pub period: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_defaults_period_and_normalizes() {
        let budget = Budget::new(" Food ", 100000, None);
        assert_eq!(budget.category, "food");
        assert_eq!(budget.period, DEFAULT_PERIOD);

        let budget = Budget::new("food", 100000, Some("  "));
        assert_eq!(budget.period, "fixed");

        let budget = Budget::new("food", 100000, Some("month"));
        assert_eq!(budget.period, "month");
    }

    #[test]
    fn test_validate() {
        assert!(Budget::new("food", 1, None).validate().is_ok());
        assert_eq!(
            Budget::new("food", 0, None).validate().unwrap_err().field,
            "limit"
        );
        assert_eq!(
            Budget::new(" ", 100, None).validate().unwrap_err().field,
            "category"
        );
    }

    #[test]
    fn test_admits_boundary() {
        assert!(admits(100000, 90000, 10000));
        assert!(!admits(100000, 90000, 10001));
        assert!(!admits(100000, 90000, 20000));
        assert!(!admits(100000, Cents::MAX, 1));
    }
}
