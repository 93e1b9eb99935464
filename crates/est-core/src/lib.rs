//! Core domain logic for the work estimator.
//!
//! This crate contains the fundamental types and logic for:
//! - Capacity: what each date can hold after vacation and other work
//! - Allocation: spreading estimates over dates and keeping pins intact
//! - History: transactional, undoable mutation through the [`Ledger`]
//! - Documents: the flat shape state is persisted and exchanged in

mod actual;
mod allocation;
mod calendar;
pub mod document;
mod error;
mod estimate;
mod history;
mod report;
mod schedule;
pub mod types;

pub use actual::{ActualEntry, record_actual};
pub use allocation::{AllocationEntry, PinMode, allocate, merge, pin, recompute_from, split, unpin};
pub use calendar::{
    CalendarConfig, CapacityBlock, add_capacity_block, is_workday, remove_capacity_block,
};
pub use document::{HistoryRecord, HistoryRecords, StateDocument};
pub use error::ScheduleError;
pub use estimate::{Estimate, EstimatePatch, add_estimate, delete_estimate, edit_estimate};
pub use history::{
    Change, Clock, CommitNotice, DEFAULT_HISTORY_DEPTH, FixedClock, Intent, Ledger, Outcome,
    SystemClock, Transaction,
};
pub use report::{EstimateVariance, variance_report};
pub use schedule::{AllocationBalance, DaySummary, Schedule};
pub use types::{BlockId, BlockKind, Effort, EntryKind, EstimateId, ValidationError};
