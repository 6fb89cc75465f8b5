use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{normalize_category, Cents, ValidationError};

/// Store-assigned identity. Monotonic and never reused.
pub type TransactionId = i64;

/// A transaction as submitted by a caller, before it has an identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    /// Amount in cents (must be positive)
    pub amount_cents: Cents,
    pub category: String,
    /// Free text, may be empty
    pub description: String,
    /// Time of day is discarded when the transaction is persisted
    pub date: DateTime<Utc>,
}

impl NewTransaction {
    pub fn new(
        amount_cents: Cents,
        category: impl Into<String>,
        description: impl Into<String>,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            amount_cents,
            category: category.into(),
            description: description.into(),
            date,
        }
    }

    /// Check the invariants every accepting path relies on.
    /// Never touches storage.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.amount_cents <= 0 {
            return Err(ValidationError::new("amount", "amount must be > 0"));
        }
        if self.category.trim().is_empty() {
            return Err(ValidationError::new(
                "category",
                "transaction category is empty",
            ));
        }
        Ok(())
    }

    /// Same transaction with its category folded to the canonical key.
    pub fn normalized(mut self) -> Self {
        self.category = normalize_category(&self.category);
        self
    }

    /// Calendar date the transaction is booked under.
    pub fn booking_date(&self) -> NaiveDate {
        self.date.date_naive()
    }
}

/// A persisted, immutable transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub amount_cents: Cents,
    pub category: String,
    pub description: String,
    /// Always midnight UTC
    pub date: DateTime<Utc>,
}

/// Drop the time-of-day component, keeping midnight UTC of the same calendar day.
pub fn truncate_to_day(date: DateTime<Utc>) -> DateTime<Utc> {
    date.date_naive().and_time(chrono::NaiveTime::MIN).and_utc()
}
