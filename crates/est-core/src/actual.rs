//! Actual effort tracking.
//!
//! Actuals are recorded per estimate and date, independent of allocation and
//! capacity. Recording more than was planned is an overrun, not an error.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;
use crate::schedule::Schedule;
use crate::types::{Effort, EstimateId};

/// Effort actually spent on an estimate on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualEntry {
    pub estimate_id: EstimateId,
    pub date: NaiveDate,
    pub amount: Effort,
    pub recorded_at: DateTime<Utc>,
}

/// Records actual effort for (estimate, date).
///
/// Replaces any previous amount, or adds to it when `accumulate` is set.
/// Returns the amount now recorded for the date.
pub fn record_actual(
    schedule: &mut Schedule,
    id: &EstimateId,
    date: NaiveDate,
    amount: Effort,
    accumulate: bool,
    now: DateTime<Utc>,
) -> Result<Effort, ScheduleError> {
    schedule.estimate(id)?;
    let entry = schedule
        .actuals
        .entry((id.clone(), date))
        .or_insert_with(|| ActualEntry {
            estimate_id: id.clone(),
            date,
            amount: Effort::ZERO,
            recorded_at: now,
        });
    entry.amount = if accumulate {
        entry.amount + amount
    } else {
        amount
    };
    entry.recorded_at = now;
    tracing::debug!(estimate_id = %id, %date, amount = %entry.amount, "recorded actual");
    Ok(entry.amount)
}
