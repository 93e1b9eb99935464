//! Calendar and capacity model.
//!
//! Capacity of a date is the base capacity of that weekday minus every
//! capacity block on the date, floored at zero. Nothing is cached: callers
//! recompute from the current blocks on every lookup.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::allocation::recompute_from;
use crate::error::ScheduleError;
use crate::schedule::Schedule;
use crate::types::{BlockId, BlockKind, Effort};

/// Configuration for capacity and allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarConfig {
    /// Capacity of a working day (Monday to Friday).
    /// Default: 8 hours.
    pub workday_capacity: Effort,

    /// How many days the allocator walks forward before giving up and
    /// recording an unallocated remainder.
    /// Default: 365.
    pub horizon_days: u32,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            workday_capacity: Effort::from_hours(8),
            horizon_days: 365,
        }
    }
}

/// Time taken out of a date for vacation or other work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityBlock {
    pub id: BlockId,
    pub date: NaiveDate,
    pub kind: BlockKind,
    pub amount: Effort,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Returns true for Monday through Friday.
pub fn is_workday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

impl CalendarConfig {
    /// Capacity of the date before any blocks are subtracted.
    pub fn base_capacity(&self, date: NaiveDate) -> Effort {
        if is_workday(date) {
            self.workday_capacity
        } else {
            Effort::ZERO
        }
    }

    /// Capacity of the date after subtracting the blocks that fall on it.
    pub fn capacity_of(&self, date: NaiveDate, blocks: &[CapacityBlock]) -> Effort {
        let blocked: Effort = blocks
            .iter()
            .filter(|block| block.date == date)
            .map(|block| block.amount)
            .sum();
        self.base_capacity(date).saturating_sub(blocked)
    }
}

// ========== Vacation / Other-work Entry Points ==========

/// Takes `amount` out of a date's capacity and re-flows from that date.
pub fn add_capacity_block(
    schedule: &mut Schedule,
    date: NaiveDate,
    kind: BlockKind,
    amount: Effort,
    note: Option<String>,
) -> BlockId {
    let id = BlockId::generate();
    schedule.blocks.push(CapacityBlock {
        id: id.clone(),
        date,
        kind,
        amount,
        note,
    });
    schedule.blocks.sort_by_key(|block| block.date);
    recompute_from(schedule, date);
    tracing::debug!(block_id = %id, %date, %kind, %amount, "added capacity block");
    id
}

/// Removes a capacity block and re-flows from its date.
pub fn remove_capacity_block(
    schedule: &mut Schedule,
    id: &BlockId,
) -> Result<CapacityBlock, ScheduleError> {
    let index = schedule
        .blocks
        .iter()
        .position(|block| &block.id == id)
        .ok_or_else(|| ScheduleError::UnknownCapacityBlock(id.clone()))?;
    let block = schedule.blocks.remove(index);
    recompute_from(schedule, block.date);
    tracing::debug!(block_id = %id, date = %block.date, "removed capacity block");
    Ok(block)
}
