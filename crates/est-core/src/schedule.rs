//! The single owned state tree and its read-only projections.
//!
//! Every component receives a `&Schedule` or `&mut Schedule` explicitly;
//! mutation from outside this crate goes through the [`Ledger`](crate::Ledger).

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::actual::ActualEntry;
use crate::allocation::AllocationEntry;
use crate::calendar::{CalendarConfig, CapacityBlock};
use crate::error::ScheduleError;
use crate::estimate::Estimate;
use crate::types::{Effort, EntryKind, EstimateId};

/// Full application state: estimates, their allocation, capacity blocks and actuals.
///
/// Cloning a schedule produces a snapshot; two schedules compare equal when
/// every record matches exactly.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schedule {
    pub(crate) calendar: CalendarConfig,
    /// Insertion order is allocation priority: earlier estimates claim capacity first.
    pub(crate) estimates: Vec<Estimate>,
    pub(crate) entries: BTreeMap<(EstimateId, NaiveDate), AllocationEntry>,
    pub(crate) blocks: Vec<CapacityBlock>,
    pub(crate) actuals: BTreeMap<(EstimateId, NaiveDate), ActualEntry>,
    /// Effort the allocator could not place within the horizon.
    pub(crate) shortfalls: BTreeMap<EstimateId, Effort>,
}

/// How much of an estimate is placed on the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AllocationBalance {
    pub total: Effort,
    pub allocated: Effort,
    pub manual: Effort,
    pub unallocated: Effort,
}

/// Capacity and allocation of a single date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub capacity: Effort,
    pub allocated: Effort,
    pub free: Effort,
    pub entries: Vec<AllocationEntry>,
}

impl Schedule {
    /// Creates an empty schedule.
    pub fn new(calendar: CalendarConfig) -> Self {
        Self {
            calendar,
            ..Self::default()
        }
    }

    pub const fn calendar(&self) -> &CalendarConfig {
        &self.calendar
    }

    /// Estimates in priority order.
    pub fn estimates(&self) -> &[Estimate] {
        &self.estimates
    }

    /// Looks up an estimate by ID.
    pub fn estimate(&self, id: &EstimateId) -> Result<&Estimate, ScheduleError> {
        self.estimates
            .iter()
            .find(|estimate| &estimate.id == id)
            .ok_or_else(|| ScheduleError::UnknownEstimateId(id.to_string()))
    }

    pub(crate) fn estimate_mut(&mut self, id: &EstimateId) -> Result<&mut Estimate, ScheduleError> {
        self.estimates
            .iter_mut()
            .find(|estimate| &estimate.id == id)
            .ok_or_else(|| ScheduleError::UnknownEstimateId(id.to_string()))
    }

    /// Position of the estimate in priority order.
    pub(crate) fn priority_of(&self, id: &EstimateId) -> usize {
        self.estimates
            .iter()
            .position(|estimate| &estimate.id == id)
            .unwrap_or(usize::MAX)
    }

    /// Estimates split directly from `id`, in priority order.
    pub fn children_of(&self, id: &EstimateId) -> Vec<&Estimate> {
        self.estimates
            .iter()
            .filter(|estimate| estimate.parent_id.as_ref() == Some(id))
            .collect()
    }

    /// All allocation entries, ordered by estimate then date.
    pub fn entries(&self) -> impl Iterator<Item = &AllocationEntry> {
        self.entries.values()
    }

    pub fn entry(&self, id: &EstimateId, date: NaiveDate) -> Option<&AllocationEntry> {
        self.entries.get(&(id.clone(), date))
    }

    pub(crate) fn entries_of<'a>(
        &'a self,
        id: &EstimateId,
    ) -> impl Iterator<Item = &'a AllocationEntry> + use<'a> {
        self.entries
            .range((id.clone(), NaiveDate::MIN)..=(id.clone(), NaiveDate::MAX))
            .map(|(_, entry)| entry)
    }

    /// Capacity blocks ordered by date.
    pub fn capacity_blocks(&self) -> &[CapacityBlock] {
        &self.blocks
    }

    /// Available capacity of the date after vacation and other work.
    pub fn capacity_of(&self, date: NaiveDate) -> Effort {
        self.calendar.capacity_of(date, &self.blocks)
    }

    /// Effort allocated on the date across all estimates.
    pub fn allocated_on(&self, date: NaiveDate) -> Effort {
        self.entries
            .values()
            .filter(|entry| entry.date == date)
            .map(|entry| entry.amount)
            .sum()
    }

    /// Unallocated remainder recorded for the estimate.
    pub fn shortfall(&self, id: &EstimateId) -> Effort {
        self.shortfalls.get(id).copied().unwrap_or_default()
    }

    /// Every recorded actual entry, ordered by estimate then date.
    pub fn actuals(&self) -> impl Iterator<Item = &ActualEntry> {
        self.actuals.values()
    }

    // ========== Projections ==========

    /// Estimates with allocation in the half-open range `[start, end)`, in priority order.
    pub fn estimates_in_range(&self, start: NaiveDate, end: NaiveDate) -> Vec<&Estimate> {
        self.estimates
            .iter()
            .filter(|estimate| {
                self.entries_of(&estimate.id)
                    .any(|entry| entry.date >= start && entry.date < end)
            })
            .collect()
    }

    /// Allocation entries of the estimate, ordered by date.
    pub fn allocation_grid_for(
        &self,
        id: &EstimateId,
    ) -> Result<Vec<&AllocationEntry>, ScheduleError> {
        self.estimate(id)?;
        Ok(self.entries_of(id).collect())
    }

    /// Actual entries of the estimate, ordered by date.
    pub fn actuals_for(&self, id: &EstimateId) -> Result<Vec<&ActualEntry>, ScheduleError> {
        self.estimate(id)?;
        Ok(self
            .actuals
            .range((id.clone(), NaiveDate::MIN)..=(id.clone(), NaiveDate::MAX))
            .map(|(_, actual)| actual)
            .collect())
    }

    /// Allocated, pinned and unallocated effort of the estimate.
    pub fn balance(&self, id: &EstimateId) -> Result<AllocationBalance, ScheduleError> {
        let estimate = self.estimate(id)?;
        let (allocated, manual) =
            self.entries_of(id)
                .fold((Effort::ZERO, Effort::ZERO), |(all, manual), entry| {
                    if entry.kind == EntryKind::Manual {
                        (all + entry.amount, manual + entry.amount)
                    } else {
                        (all + entry.amount, manual)
                    }
                });
        Ok(AllocationBalance {
            total: estimate.total,
            allocated,
            manual,
            unallocated: self.shortfall(id),
        })
    }

    /// Capacity, allocation and entries of one date.
    pub fn day(&self, date: NaiveDate) -> DaySummary {
        let mut entries: Vec<AllocationEntry> = self
            .entries
            .values()
            .filter(|entry| entry.date == date)
            .cloned()
            .collect();
        entries.sort_by_key(|entry| self.priority_of(&entry.estimate_id));
        let capacity = self.capacity_of(date);
        let allocated: Effort = entries.iter().map(|entry| entry.amount).sum();
        DaySummary {
            date,
            capacity,
            allocated,
            free: capacity.saturating_sub(allocated),
            entries,
        }
    }
}
