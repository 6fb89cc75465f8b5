use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::{Cents, ImportSummary, ValidationError};

use super::Interrupt;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid {}", .0)]
    Validation(#[from] ValidationError),

    #[error("Invalid range: from {from} is after to {to}")]
    InvalidRange { from: NaiveDate, to: NaiveDate },

    #[error(
        "Budget exceeded for '{category}': spent {spent}, limit {limit}, requested {requested}"
    )]
    BudgetExceeded {
        category: String,
        spent: Cents,
        limit: Cents,
        requested: Cents,
    },

    #[error("Budget not found: {0}")]
    BudgetNotFound(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// A bulk import stopped before every item produced an outcome.
    /// `partial` holds the outcomes of the items that did complete.
    #[error("Import {reason} after {} of {total} items", .partial.processed())]
    ImportAborted {
        partial: ImportSummary,
        reason: Interrupt,
        total: usize,
    },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

/// Caller-facing classification of every failure the ledger can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    BudgetExceeded,
    NotFound,
    Cancelled,
    DeadlineExceeded,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::BudgetExceeded => "budget_exceeded",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) | AppError::InvalidRange { .. } => ErrorKind::Validation,
            AppError::BudgetExceeded { .. } => ErrorKind::BudgetExceeded,
            AppError::BudgetNotFound(_) => ErrorKind::NotFound,
            AppError::Cancelled => ErrorKind::Cancelled,
            AppError::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            AppError::ImportAborted { reason, .. } => match reason {
                Interrupt::Cancelled => ErrorKind::Cancelled,
                Interrupt::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            },
            AppError::Internal(_) | AppError::Database(_) => ErrorKind::Internal,
        }
    }

    /// Outcomes collected before an interrupted import stopped.
    pub fn partial_import(&self) -> Option<&ImportSummary> {
        match self {
            AppError::ImportAborted { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

impl From<Interrupt> for AppError {
    fn from(interrupt: Interrupt) -> Self {
        match interrupt {
            Interrupt::Cancelled => AppError::Cancelled,
            Interrupt::DeadlineExceeded => AppError::DeadlineExceeded,
        }
    }
}
