//! Errors surfaced by schedule mutations.

use chrono::NaiveDate;
use thiserror::Error;

use crate::types::{BlockId, Effort, EstimateId, ValidationError};

/// Errors returned by the estimate store, allocation engine and actual tracker.
///
/// Every variant is reported to the caller of the mutation; the [`Ledger`](crate::Ledger)
/// guarantees none of them leaves a partially applied state behind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// Split amount was not strictly between zero and the re-flowable effort.
    #[error(
        "split amount {amount} must be above 0h and below the {available} still unallocated on {estimate_id}"
    )]
    InvalidSplitAmount {
        estimate_id: EstimateId,
        amount: Effort,
        available: Effort,
    },

    /// Merge was attempted on estimates that are not parent and child.
    #[error("estimate {child_id} was not split from {parent_id}")]
    NotSiblingEstimates {
        parent_id: EstimateId,
        child_id: EstimateId,
    },

    /// Delete was attempted on an estimate that still has splits.
    #[error("estimate {estimate_id} has {count} dependent split(s); use force to delete them too")]
    HasDependentSplits { estimate_id: EstimateId, count: usize },

    /// An explicit pin asked for more than the date can hold.
    #[error("{requested} exceeds the {available} of capacity available on {date}")]
    CapacityExceeded {
        date: NaiveDate,
        requested: Effort,
        available: Effort,
    },

    /// A pin would fix more effort than the estimate has in total.
    #[error("{requested} exceeds the {available} of {estimate_id} that can still be pinned")]
    PinExceedsEstimate {
        estimate_id: EstimateId,
        requested: Effort,
        available: Effort,
    },

    /// Unpin was attempted on a date without a manual entry.
    #[error("estimate {estimate_id} has no pinned entry on {date}")]
    NotPinned {
        estimate_id: EstimateId,
        date: NaiveDate,
    },

    /// An edit would shrink a total below effort that can no longer move.
    #[error("total {total} of {estimate_id} is below the {committed} already committed")]
    TotalBelowCommitted {
        estimate_id: EstimateId,
        total: Effort,
        committed: Effort,
    },

    #[error("amount cannot be negative, got {minutes} minutes")]
    NegativeAmount { minutes: i64 },

    #[error("unknown estimate: {0}")]
    UnknownEstimateId(String),

    #[error("unknown capacity block: {0}")]
    UnknownCapacityBlock(BlockId),

    /// A persistence document failed validation on load.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// Saving state after a commit failed. In-memory state is kept.
    #[error("failed to persist state: {message}")]
    PersistenceWriteFailed { message: String },

    #[error(transparent)]
    Validation(ValidationError),
}

impl From<ValidationError> for ScheduleError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::NegativeAmount { minutes } => Self::NegativeAmount { minutes },
            other => Self::Validation(other),
        }
    }
}
