//! Estimate entity store.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::allocation::{allocate, fixed_effort, recompute_from};
use crate::error::ScheduleError;
use crate::schedule::Schedule;
use crate::types::{Effort, EstimateId, ValidationError};

/// A task with a total planned effort to be distributed over dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Estimate {
    pub id: EstimateId,
    pub title: String,
    pub total: Effort,
    /// Allocation never places effort before this date.
    pub start_on: NaiveDate,
    /// The estimate this one was split from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<EstimateId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Estimate {
    /// Creates an estimate after validating its title.
    pub fn new(
        id: EstimateId,
        title: impl Into<String>,
        total: Effort,
        start_on: NaiveDate,
        parent_id: Option<EstimateId>,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            id,
            title: validate_title(title.into())?,
            total,
            start_on,
            parent_id,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Changes applied by [`edit_estimate`]. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EstimatePatch {
    pub title: Option<String>,
    pub total: Option<Effort>,
    pub start_on: Option<NaiveDate>,
}

pub(crate) fn validate_title(title: String) -> Result<String, ValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field: "title" });
    }
    if trimmed.len() == title.len() {
        Ok(title)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Adds an estimate at the lowest priority and allocates it from `start_on`.
pub fn add_estimate(
    schedule: &mut Schedule,
    title: impl Into<String>,
    total: Effort,
    start_on: NaiveDate,
    now: DateTime<Utc>,
) -> Result<EstimateId, ScheduleError> {
    let estimate = Estimate::new(EstimateId::generate(), title, total, start_on, None, now)?;
    let id = estimate.id.clone();
    schedule.estimates.push(estimate);
    allocate(schedule, &id, start_on)?;
    tracing::debug!(estimate_id = %id, %total, %start_on, "added estimate");
    Ok(id)
}

/// Edits an estimate, re-flowing its allocation when the total or start changes.
///
/// Re-flow pivots on `today`, or on the earlier of the old and new start when
/// both lie in the future.
pub fn edit_estimate(
    schedule: &mut Schedule,
    id: &EstimateId,
    patch: EstimatePatch,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<(), ScheduleError> {
    let current = schedule.estimate(id)?.clone();
    let title = patch.title.map(validate_title).transpose()?;

    let new_start = patch.start_on.unwrap_or(current.start_on);
    let pivot = current.start_on.min(new_start).max(today);

    if let Some(total) = patch.total {
        let committed = fixed_effort(schedule, id, pivot);
        if total < committed {
            return Err(ScheduleError::TotalBelowCommitted {
                estimate_id: id.clone(),
                total,
                committed,
            });
        }
    }

    let reflow = patch.total.is_some_and(|total| total != current.total)
        || new_start != current.start_on;

    let estimate = schedule.estimate_mut(id)?;
    if let Some(title) = title {
        estimate.title = title;
    }
    if let Some(total) = patch.total {
        estimate.total = total;
    }
    estimate.start_on = new_start;
    estimate.updated_at = now;

    if reflow {
        recompute_from(schedule, pivot);
    }
    Ok(())
}

/// Deletes an estimate with its allocation and actuals.
///
/// An estimate that has been split fails with `HasDependentSplits` unless
/// `force` is set, in which case its splits are deleted recursively.
/// Returns every deleted ID.
pub fn delete_estimate(
    schedule: &mut Schedule,
    id: &EstimateId,
    force: bool,
    today: NaiveDate,
) -> Result<Vec<EstimateId>, ScheduleError> {
    schedule.estimate(id)?;
    let count = schedule.children_of(id).len();
    if count > 0 && !force {
        return Err(ScheduleError::HasDependentSplits {
            estimate_id: id.clone(),
            count,
        });
    }

    let mut doomed = vec![id.clone()];
    let mut cursor = 0;
    while cursor < doomed.len() {
        let children: Vec<EstimateId> = schedule
            .children_of(&doomed[cursor])
            .into_iter()
            .map(|child| child.id.clone())
            .filter(|child| !doomed.contains(child))
            .collect();
        doomed.extend(children);
        cursor += 1;
    }

    schedule.estimates.retain(|estimate| !doomed.contains(&estimate.id));
    schedule.entries.retain(|(owner, _), _| !doomed.contains(owner));
    schedule.actuals.retain(|(owner, _), _| !doomed.contains(owner));
    schedule.shortfalls.retain(|owner, _| !doomed.contains(owner));

    recompute_from(schedule, today);
    tracing::debug!(estimate_id = %id, deleted = doomed.len(), "deleted estimate");
    Ok(doomed)
}
