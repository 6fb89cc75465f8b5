use serde::{Deserialize, Serialize};

use super::NewTransaction;

/// One entry of a caller-submitted batch, keyed by its position in that batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportItem {
    pub index: usize,
    /// `Err` carries the reason the entry could not be parsed upstream
    pub parsed: Result<NewTransaction, String>,
}

impl ImportItem {
    pub fn parsed(index: usize, transaction: NewTransaction) -> Self {
        Self {
            index,
            parsed: Ok(transaction),
        }
    }

    pub fn unparsable(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index,
            parsed: Err(reason.into()),
        }
    }

    /// Build a batch from already-parsed transactions, indexed by position.
    pub fn batch(transactions: impl IntoIterator<Item = NewTransaction>) -> Vec<Self> {
        transactions
            .into_iter()
            .enumerate()
            .map(|(index, tx)| Self::parsed(index, tx))
            .collect()
    }
}

/// Why a single batch entry was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRejection {
    pub index: usize,
    pub error: String,
}

/// Outcome of one bulk import.
///
/// `errors` is in arrival order, not index order. Sort by `index` when
/// per-item results are needed in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub accepted: u64,
    pub rejected: u64,
    pub errors: Vec<ImportRejection>,
}

impl ImportSummary {
    pub fn record_accepted(&mut self) {
        self.accepted += 1;
    }

    pub fn record_rejected(&mut self, index: usize, error: impl Into<String>) {
        self.rejected += 1;
        self.errors.push(ImportRejection {
            index,
            error: error.into(),
        });
    }

    /// Number of items that produced an outcome.
    pub fn processed(&self) -> u64 {
        self.accepted + self.rejected
    }

    /// Rejections sorted by their original batch index.
    pub fn errors_by_index(&self) -> Vec<ImportRejection> {
        let mut errors = self.errors.clone();
        errors.sort_by_key(|e| e.index);
        errors
    }
}

/// Storage-free pre-validation of a batch.
///
/// Reports every entry that would be rejected before reaching the budget
/// check, ordered by index. Pure: the same input always yields the same
/// reasons.
pub fn validate_batch(items: &[ImportItem]) -> Vec<ImportRejection> {
    let mut rejections: Vec<ImportRejection> = items
        .iter()
        .filter_map(|item| {
            let error = match &item.parsed {
                Err(reason) => reason.clone(),
                Ok(tx) => tx.validate().err()?.to_string(),
            };
            Some(ImportRejection {
                index: item.index,
                error,
            })
        })
        .collect();
    rejections.sort_by_key(|r| r.index);
    rejections
}
