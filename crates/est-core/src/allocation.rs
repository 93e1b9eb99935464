//! Effort allocation engine.
//!
//! Distributes each estimate's effort over the calendar and keeps that
//! distribution consistent as estimates, capacity and pins change.
//!
//! # Algorithm Summary
//!
//! 1. Manual entries are fixed: they are never moved, and their amount is
//!    taken out of the date's free capacity before any auto entry is placed.
//! 2. Auto entries before the pivot date are history and stay as they are.
//! 3. From the pivot forward, estimates claim capacity in priority order
//!    (earliest created first), walking one date at a time and taking
//!    `min(remaining, free capacity)` until the estimate is fully placed or
//!    the horizon runs out.
//! 4. Whatever does not fit within the horizon is recorded as an
//!    unallocated remainder for the estimate.
//!
//! For every estimate, allocated effort plus the unallocated remainder
//! equals the estimate's total.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;
use crate::estimate::{Estimate, validate_title};
use crate::schedule::Schedule;
use crate::types::{Effort, EntryKind, EstimateId};

/// The portion of an estimate's effort placed on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationEntry {
    pub estimate_id: EstimateId,
    pub date: NaiveDate,
    pub amount: Effort,
    pub kind: EntryKind,
    /// When the entry was pinned. Auto entries carry no timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl AllocationEntry {
    fn auto(estimate_id: EstimateId, date: NaiveDate, amount: Effort) -> Self {
        Self {
            estimate_id,
            date,
            amount,
            kind: EntryKind::Auto,
            modified_at: None,
        }
    }
}

/// How [`pin`] treats an amount larger than the date or estimate allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PinMode {
    /// Reject with `CapacityExceeded` or `PinExceedsEstimate`.
    #[default]
    Strict,
    /// Reduce the amount to what fits.
    Clamp,
}

/// Effort of the estimate that allocation from `pivot` may not move:
/// all manual entries plus auto entries dated before `pivot`.
pub(crate) fn fixed_effort(schedule: &Schedule, id: &EstimateId, pivot: NaiveDate) -> Effort {
    schedule
        .entries_of(id)
        .filter(|entry| entry.kind == EntryKind::Manual || entry.date < pivot)
        .map(|entry| entry.amount)
        .sum()
}

/// Removes auto entries dated on or after `from`, for one estimate or for all.
fn clear_auto(schedule: &mut Schedule, only: Option<&EstimateId>, from: NaiveDate) {
    schedule.entries.retain(|(owner, date), entry| {
        entry.kind == EntryKind::Manual || *date < from || only.is_some_and(|id| id != owner)
    });
}

/// Allocated effort per date across all estimates.
fn day_usage(schedule: &Schedule) -> BTreeMap<NaiveDate, Effort> {
    let mut usage: BTreeMap<NaiveDate, Effort> = BTreeMap::new();
    for entry in schedule.entries.values() {
        *usage.entry(entry.date).or_default() += entry.amount;
    }
    usage
}

/// Places the estimate's re-flowable effort from `pivot` forward.
///
/// Expects the estimate's auto entries on or after `pivot` to be cleared.
/// Returns the effort that did not fit within the horizon.
fn fill(
    schedule: &mut Schedule,
    id: &EstimateId,
    pivot: NaiveDate,
    usage: &mut BTreeMap<NaiveDate, Effort>,
) -> Effort {
    let Ok(estimate) = schedule.estimate(id) else {
        return Effort::ZERO;
    };
    let start = estimate.start_on.max(pivot);
    let mut remaining = estimate.total.saturating_sub(fixed_effort(schedule, id, pivot));
    let horizon = schedule.calendar.horizon_days as usize;

    for date in start.iter_days().take(horizon) {
        if remaining.is_zero() {
            break;
        }
        let key = (id.clone(), date);
        if schedule.entries.contains_key(&key) {
            // Pinned by the user for this estimate.
            continue;
        }
        let used = usage.get(&date).copied().unwrap_or_default();
        let free = schedule.capacity_of(date).saturating_sub(used);
        if free.is_zero() {
            continue;
        }
        let amount = remaining.min(free);
        schedule
            .entries
            .insert(key, AllocationEntry::auto(id.clone(), date, amount));
        *usage.entry(date).or_default() += amount;
        remaining = remaining.saturating_sub(amount);
    }

    if remaining.is_zero() {
        schedule.shortfalls.remove(id);
    } else {
        tracing::warn!(
            estimate_id = %id,
            unallocated = %remaining,
            %start,
            horizon,
            "estimate does not fit within the allocation horizon"
        );
        schedule.shortfalls.insert(id.clone(), remaining);
    }
    remaining
}

/// Allocates one estimate's remaining effort starting at `from`.
///
/// Replaces the estimate's auto entries on or after `from`; manual entries
/// and other estimates' entries are left as they are and only reduce the
/// capacity available. Returns the unallocated remainder.
pub fn allocate(
    schedule: &mut Schedule,
    id: &EstimateId,
    from: NaiveDate,
) -> Result<Effort, ScheduleError> {
    schedule.estimate(id)?;
    clear_auto(schedule, Some(id), from);
    let mut usage = day_usage(schedule);
    Ok(fill(schedule, id, from, &mut usage))
}

/// Re-runs allocation of every estimate from `from` forward.
///
/// All auto entries on or after `from` are discarded and re-placed in
/// priority order. Manual entries anywhere and auto entries before `from`
/// are preserved. Returns the total unallocated remainder.
pub fn recompute_from(schedule: &mut Schedule, from: NaiveDate) -> Effort {
    clear_auto(schedule, None, from);
    let mut usage = day_usage(schedule);
    let ids: Vec<EstimateId> = schedule
        .estimates
        .iter()
        .map(|estimate| estimate.id.clone())
        .collect();

    let mut unallocated = Effort::ZERO;
    for id in &ids {
        unallocated += fill(schedule, id, from, &mut usage);
    }
    tracing::debug!(%from, estimates = ids.len(), %unallocated, "recomputed allocation");
    unallocated
}

/// Pins an amount of the estimate to a date, then re-flows.
///
/// Re-flow starts at the earlier of `date` and `today`, so pinning a future
/// date can pull effort out of auto entries between now and then.
/// The amount is bounded by the date's capacity less other estimates' pins,
/// and by the estimate's total less the effort fixed outside that window.
/// Returns the amount actually pinned.
pub fn pin(
    schedule: &mut Schedule,
    id: &EstimateId,
    date: NaiveDate,
    amount: Effort,
    mode: PinMode,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Effort, ScheduleError> {
    let pivot = date.min(today);
    let total = schedule.estimate(id)?.total;

    let pinned_by_others: Effort = schedule
        .entries
        .values()
        .filter(|entry| {
            entry.date == date && entry.kind == EntryKind::Manual && &entry.estimate_id != id
        })
        .map(|entry| entry.amount)
        .sum();
    let room = schedule.capacity_of(date).saturating_sub(pinned_by_others);

    let mut amount = amount;
    if amount > room {
        match mode {
            PinMode::Strict => {
                return Err(ScheduleError::CapacityExceeded {
                    date,
                    requested: amount,
                    available: room,
                });
            }
            PinMode::Clamp => amount = room,
        }
    }

    let existing_manual = schedule
        .entry(id, date)
        .filter(|entry| entry.kind == EntryKind::Manual)
        .map_or(Effort::ZERO, |entry| entry.amount);
    let fixed_elsewhere = fixed_effort(schedule, id, pivot).saturating_sub(existing_manual);
    let pinnable = total.saturating_sub(fixed_elsewhere);
    if amount > pinnable {
        match mode {
            PinMode::Strict => {
                return Err(ScheduleError::PinExceedsEstimate {
                    estimate_id: id.clone(),
                    requested: amount,
                    available: pinnable,
                });
            }
            PinMode::Clamp => amount = pinnable,
        }
    }

    schedule.entries.insert(
        (id.clone(), date),
        AllocationEntry {
            estimate_id: id.clone(),
            date,
            amount,
            kind: EntryKind::Manual,
            modified_at: Some(now),
        },
    );
    recompute_from(schedule, pivot);
    tracing::debug!(estimate_id = %id, %date, %amount, "pinned allocation");
    Ok(amount)
}

/// Returns a pinned entry to the allocator, then re-flows from the earlier
/// of its date and `today`.
pub fn unpin(
    schedule: &mut Schedule,
    id: &EstimateId,
    date: NaiveDate,
    today: NaiveDate,
) -> Result<(), ScheduleError> {
    schedule.estimate(id)?;
    match schedule.entries.get_mut(&(id.clone(), date)) {
        Some(entry) if entry.kind == EntryKind::Manual => {
            entry.kind = EntryKind::Auto;
            entry.modified_at = None;
        }
        _ => {
            return Err(ScheduleError::NotPinned {
                estimate_id: id.clone(),
                date,
            });
        }
    }
    recompute_from(schedule, date.min(today));
    Ok(())
}

/// Splits `amount` of the estimate's re-flowable effort into a new child estimate.
///
/// `amount` must be strictly between zero and the effort still free to move
/// from `today` (total less manual entries and historical auto entries).
/// The parent keeps its manual entries. Returns the child's ID.
pub fn split(
    schedule: &mut Schedule,
    id: &EstimateId,
    amount: Effort,
    title: Option<String>,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<EstimateId, ScheduleError> {
    let parent = schedule.estimate(id)?.clone();
    let available = parent.total.saturating_sub(fixed_effort(schedule, id, today));
    if amount.is_zero() || amount >= available {
        return Err(ScheduleError::InvalidSplitAmount {
            estimate_id: id.clone(),
            amount,
            available,
        });
    }

    let title = match title {
        Some(title) => validate_title(title)?,
        None => format!("{} (split)", parent.title),
    };
    let child = Estimate::new(
        EstimateId::generate(),
        title,
        amount,
        parent.start_on.max(today),
        Some(id.clone()),
        now,
    )?;
    let child_id = child.id.clone();

    let parent = schedule.estimate_mut(id)?;
    parent.total = parent.total.saturating_sub(amount);
    parent.updated_at = now;
    schedule.estimates.push(child);

    recompute_from(schedule, today);
    tracing::debug!(estimate_id = %id, child_id = %child_id, %amount, "split estimate");
    Ok(child_id)
}

/// Folds a split child back into its parent.
///
/// Totals are combined and the child's entries move to the parent. On a date
/// where both have an entry, a manual entry beats an auto one; between two
/// manual entries the later-pinned one wins (the parent's on a tie); two auto
/// entries are summed. Child actuals are added to the parent's and the
/// child's own splits are re-parented. Re-flows from `today`.
pub fn merge(
    schedule: &mut Schedule,
    parent_id: &EstimateId,
    child_id: &EstimateId,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<(), ScheduleError> {
    schedule.estimate(parent_id)?;
    let child = schedule.estimate(child_id)?.clone();
    if child.parent_id.as_ref() != Some(parent_id) {
        return Err(ScheduleError::NotSiblingEstimates {
            parent_id: parent_id.clone(),
            child_id: child_id.clone(),
        });
    }

    let child_entries: Vec<AllocationEntry> = schedule.entries_of(child_id).cloned().collect();
    schedule.entries.retain(|(owner, _), _| owner != child_id);
    for mut incoming in child_entries {
        incoming.estimate_id = parent_id.clone();
        match schedule.entries.get_mut(&(parent_id.clone(), incoming.date)) {
            Some(existing) => resolve_conflict(existing, incoming),
            None => {
                schedule
                    .entries
                    .insert((parent_id.clone(), incoming.date), incoming);
            }
        }
    }

    let child_actuals: Vec<_> = schedule
        .actuals
        .iter()
        .filter(|((owner, _), _)| owner == child_id)
        .map(|(_, actual)| actual.clone())
        .collect();
    schedule.actuals.retain(|(owner, _), _| owner != child_id);
    for mut incoming in child_actuals {
        incoming.estimate_id = parent_id.clone();
        match schedule.actuals.get_mut(&(parent_id.clone(), incoming.date)) {
            Some(existing) => {
                existing.amount += incoming.amount;
                existing.recorded_at = existing.recorded_at.max(incoming.recorded_at);
            }
            None => {
                schedule
                    .actuals
                    .insert((parent_id.clone(), incoming.date), incoming);
            }
        }
    }

    for estimate in &mut schedule.estimates {
        if estimate.parent_id.as_ref() == Some(child_id) {
            estimate.parent_id = Some(parent_id.clone());
        }
    }
    schedule.estimates.retain(|estimate| &estimate.id != child_id);
    schedule.shortfalls.remove(child_id);

    let parent = schedule.estimate_mut(parent_id)?;
    parent.total += child.total;
    parent.updated_at = now;

    recompute_from(schedule, today);
    tracing::debug!(estimate_id = %parent_id, child_id = %child_id, "merged estimates");
    Ok(())
}

fn resolve_conflict(existing: &mut AllocationEntry, incoming: AllocationEntry) {
    match (existing.kind, incoming.kind) {
        (EntryKind::Auto, EntryKind::Auto) => existing.amount += incoming.amount,
        (EntryKind::Auto, EntryKind::Manual) => *existing = incoming,
        (EntryKind::Manual, EntryKind::Manual) => {
            if incoming.modified_at > existing.modified_at {
                *existing = incoming;
            }
        }
        (EntryKind::Manual, EntryKind::Auto) => {}
    }
}
