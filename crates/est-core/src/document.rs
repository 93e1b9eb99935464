//! Flat persistence document.
//!
//! Every record is a flat mapping of primitives: identifiers as strings,
//! dates as ISO calendar dates, amounts as minutes. Loading validates the
//! whole document before any of it becomes a [`Schedule`].

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::actual::ActualEntry;
use crate::allocation::AllocationEntry;
use crate::calendar::{CalendarConfig, CapacityBlock};
use crate::error::ScheduleError;
use crate::estimate::{Estimate, validate_title};
use crate::schedule::Schedule;
use crate::types::{BlockId, BlockKind, Effort, EntryKind, EstimateId};

/// Current document format version.
pub const DOCUMENT_VERSION: u32 = 1;

/// Serialized form of a whole [`Schedule`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDocument {
    pub version: u32,
    /// Estimates in priority order.
    pub estimates: Vec<EstimateRecord>,
    pub allocations: Vec<AllocationRecord>,
    pub capacity_blocks: Vec<CapacityBlockRecord>,
    pub actuals: Vec<ActualRecord>,
    #[serde(default)]
    pub shortfalls: Vec<ShortfallRecord>,
}

impl Default for StateDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            estimates: Vec::new(),
            allocations: Vec::new(),
            capacity_blocks: Vec::new(),
            actuals: Vec::new(),
            shortfalls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateRecord {
    pub id: String,
    pub title: String,
    pub total_minutes: i64,
    pub start_on: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub estimate_id: String,
    pub date: NaiveDate,
    pub amount_minutes: i64,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityBlockRecord {
    pub id: String,
    pub date: NaiveDate,
    pub kind: String,
    pub amount_minutes: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualRecord {
    pub estimate_id: String,
    pub date: NaiveDate,
    pub amount_minutes: i64,
    pub recorded_at: DateTime<Utc>,
}

/// Effort of an estimate the allocator could not place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortfallRecord {
    pub estimate_id: String,
    pub amount_minutes: i64,
}

/// A committed transaction in serialized form, used to carry undo/redo
/// history across process restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub label: String,
    pub committed_at: DateTime<Utc>,
    /// State before the transaction was applied.
    pub snapshot: StateDocument,
}

/// Both history stacks, oldest transaction first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecords {
    pub undo: Vec<HistoryRecord>,
    pub redo: Vec<HistoryRecord>,
}

fn invalid(message: impl Into<String>) -> ScheduleError {
    ScheduleError::InvalidDocument(message.into())
}

fn effort(minutes: i64, what: &str) -> Result<Effort, ScheduleError> {
    Effort::new(minutes).map_err(|err| invalid(format!("{what}: {err}")))
}

fn estimate_id(raw: &str, what: &str) -> Result<EstimateId, ScheduleError> {
    EstimateId::new(raw).map_err(|_| invalid(format!("{what}: empty estimate id")))
}

impl Schedule {
    /// Serializes the schedule into a flat document.
    pub fn to_document(&self) -> StateDocument {
        StateDocument {
            version: DOCUMENT_VERSION,
            estimates: self
                .estimates
                .iter()
                .map(|estimate| EstimateRecord {
                    id: estimate.id.to_string(),
                    title: estimate.title.clone(),
                    total_minutes: estimate.total.as_minutes(),
                    start_on: estimate.start_on,
                    parent_id: estimate.parent_id.as_ref().map(ToString::to_string),
                    created_at: estimate.created_at,
                    updated_at: estimate.updated_at,
                })
                .collect(),
            allocations: self
                .entries
                .values()
                .map(|entry| AllocationRecord {
                    estimate_id: entry.estimate_id.to_string(),
                    date: entry.date,
                    amount_minutes: entry.amount.as_minutes(),
                    kind: entry.kind.as_str().to_string(),
                    modified_at: entry.modified_at,
                })
                .collect(),
            capacity_blocks: self
                .blocks
                .iter()
                .map(|block| CapacityBlockRecord {
                    id: block.id.to_string(),
                    date: block.date,
                    kind: block.kind.to_string(),
                    amount_minutes: block.amount.as_minutes(),
                    note: block.note.clone(),
                })
                .collect(),
            actuals: self
                .actuals
                .values()
                .map(|actual| ActualRecord {
                    estimate_id: actual.estimate_id.to_string(),
                    date: actual.date,
                    amount_minutes: actual.amount.as_minutes(),
                    recorded_at: actual.recorded_at,
                })
                .collect(),
            shortfalls: self
                .shortfalls
                .iter()
                .map(|(id, amount)| ShortfallRecord {
                    estimate_id: id.to_string(),
                    amount_minutes: amount.as_minutes(),
                })
                .collect(),
        }
    }

    /// Rebuilds a schedule from a document, rejecting anything inconsistent.
    ///
    /// Fails with `InvalidDocument` on empty ids, out-of-range amounts, unknown
    /// kinds, duplicate records, parent cycles or references to estimates
    /// that do not exist.
    pub fn from_document(
        document: &StateDocument,
        calendar: CalendarConfig,
    ) -> Result<Self, ScheduleError> {
        if document.version > DOCUMENT_VERSION {
            return Err(invalid(format!(
                "unsupported document version {} (newest known is {DOCUMENT_VERSION})",
                document.version
            )));
        }

        let mut schedule = Self::new(calendar);
        let mut known: HashSet<EstimateId> = HashSet::new();

        for record in &document.estimates {
            let id = estimate_id(&record.id, "estimate")?;
            if !known.insert(id.clone()) {
                return Err(invalid(format!("duplicate estimate {id}")));
            }
            let parent_id = record
                .parent_id
                .as_deref()
                .map(|raw| estimate_id(raw, "estimate parent"))
                .transpose()?;
            let title = validate_title(record.title.clone())
                .map_err(|err| invalid(format!("estimate {id}: {err}")))?;
            let estimate = Estimate {
                id,
                title,
                total: effort(record.total_minutes, "estimate total")?,
                start_on: record.start_on,
                parent_id,
                created_at: record.created_at,
                updated_at: record.updated_at,
            };
            schedule.estimates.push(estimate);
        }

        for estimate in &schedule.estimates {
            if let Some(parent) = &estimate.parent_id {
                if parent == &estimate.id || !known.contains(parent) {
                    return Err(invalid(format!(
                        "estimate {} references unknown parent {parent}",
                        estimate.id
                    )));
                }
            }
        }
        let parents: BTreeMap<&EstimateId, &EstimateId> = schedule
            .estimates
            .iter()
            .filter_map(|estimate| estimate.parent_id.as_ref().map(|parent| (&estimate.id, parent)))
            .collect();
        for estimate in &schedule.estimates {
            let mut seen = HashSet::from([&estimate.id]);
            let mut cursor = &estimate.id;
            while let Some(&parent) = parents.get(cursor) {
                if !seen.insert(parent) {
                    return Err(invalid(format!(
                        "estimate {} is part of a parent cycle",
                        estimate.id
                    )));
                }
                cursor = parent;
            }
        }

        let resolve = |raw: &str, what: &str| -> Result<EstimateId, ScheduleError> {
            let id = estimate_id(raw, what)?;
            if known.contains(&id) {
                Ok(id)
            } else {
                Err(invalid(format!("{what} references unknown estimate {id}")))
            }
        };

        for record in &document.allocations {
            let id = resolve(&record.estimate_id, "allocation")?;
            let kind: EntryKind = record
                .kind
                .parse()
                .map_err(|err| invalid(format!("allocation: {err}")))?;
            let entry = AllocationEntry {
                estimate_id: id.clone(),
                date: record.date,
                amount: effort(record.amount_minutes, "allocation")?,
                kind,
                modified_at: record.modified_at,
            };
            if schedule.entries.insert((id.clone(), record.date), entry).is_some() {
                return Err(invalid(format!(
                    "duplicate allocation for {id} on {}",
                    record.date
                )));
            }
        }

        let mut block_ids: HashSet<BlockId> = HashSet::new();
        for record in &document.capacity_blocks {
            let id = BlockId::new(record.id.as_str())
                .map_err(|_| invalid("capacity block: empty id"))?;
            if !block_ids.insert(id.clone()) {
                return Err(invalid(format!("duplicate capacity block {id}")));
            }
            let kind: BlockKind = record
                .kind
                .parse()
                .map_err(|err| invalid(format!("capacity block {id}: {err}")))?;
            schedule.blocks.push(CapacityBlock {
                amount: effort(record.amount_minutes, "capacity block")?,
                id,
                date: record.date,
                kind,
                note: record.note.clone(),
            });
        }
        schedule.blocks.sort_by_key(|block| block.date);

        for record in &document.actuals {
            let id = resolve(&record.estimate_id, "actual")?;
            let actual = ActualEntry {
                estimate_id: id.clone(),
                date: record.date,
                amount: effort(record.amount_minutes, "actual")?,
                recorded_at: record.recorded_at,
            };
            if schedule.actuals.insert((id.clone(), record.date), actual).is_some() {
                return Err(invalid(format!("duplicate actual for {id} on {}", record.date)));
            }
        }

        let mut shortfalls: BTreeMap<EstimateId, Effort> = BTreeMap::new();
        for record in &document.shortfalls {
            let id = resolve(&record.estimate_id, "shortfall")?;
            let amount = effort(record.amount_minutes, "shortfall")?;
            if !amount.is_zero() {
                shortfalls.insert(id, amount);
            }
        }
        schedule.shortfalls = shortfalls;

        Ok(schedule)
    }
}
