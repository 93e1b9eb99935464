//! State/History manager.
//!
//! The [`Ledger`] owns the live [`Schedule`] and is the only way to mutate it
//! from outside this crate. Every mutation is an [`Intent`] applied to a
//! working copy; the copy replaces the live state only when the intent
//! succeeds, so a failed intent leaves nothing behind.

use std::collections::VecDeque;

use chrono::{DateTime, Local, NaiveDate, NaiveTime, Utc};

use crate::actual::record_actual;
use crate::allocation::{PinMode, allocate, merge, pin, recompute_from, split, unpin};
use crate::calendar::{CapacityBlock, add_capacity_block, remove_capacity_block};
use crate::document::{HistoryRecord, HistoryRecords, StateDocument};
use crate::error::ScheduleError;
use crate::estimate::{EstimatePatch, add_estimate, delete_estimate, edit_estimate};
use crate::schedule::Schedule;
use crate::types::{BlockId, BlockKind, Effort, EstimateId};

/// Default number of undoable transactions kept.
pub const DEFAULT_HISTORY_DEPTH: usize = 50;

/// Source of the current instant and the current calendar date.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
    fn today(&self) -> NaiveDate;
}

/// Wall clock; "today" is the local calendar date.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A clock pinned to a fixed date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    today: NaiveDate,
    now: DateTime<Utc>,
}

impl FixedClock {
    pub const fn new(today: NaiveDate, now: DateTime<Utc>) -> Self {
        Self { today, now }
    }

    /// A clock whose instant is midnight UTC of `today`.
    pub fn on(today: NaiveDate) -> Self {
        Self::new(today, today.and_time(NaiveTime::default()).and_utc())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn today(&self) -> NaiveDate {
        self.today
    }
}

/// A mutation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    AddEstimate {
        title: String,
        total: Effort,
        /// Defaults to today.
        start_on: Option<NaiveDate>,
    },
    EditEstimate {
        id: EstimateId,
        patch: EstimatePatch,
    },
    DeleteEstimate {
        id: EstimateId,
        force: bool,
    },
    /// Re-allocates one estimate from `from` (default today).
    Allocate {
        id: EstimateId,
        from: Option<NaiveDate>,
    },
    Recompute {
        from: NaiveDate,
    },
    Pin {
        id: EstimateId,
        date: NaiveDate,
        amount: Effort,
        mode: PinMode,
    },
    Unpin {
        id: EstimateId,
        date: NaiveDate,
    },
    Split {
        id: EstimateId,
        amount: Effort,
        title: Option<String>,
    },
    Merge {
        parent_id: EstimateId,
        child_id: EstimateId,
    },
    AddCapacityBlock {
        date: NaiveDate,
        kind: BlockKind,
        amount: Effort,
        note: Option<String>,
    },
    RemoveCapacityBlock {
        id: BlockId,
    },
    RecordActual {
        id: EstimateId,
        date: NaiveDate,
        amount: Effort,
        accumulate: bool,
    },
    /// Replaces the whole state with an imported document.
    ReplaceState(StateDocument),
}

impl Intent {
    /// Short human-readable description used as the transaction label.
    pub fn label(&self) -> String {
        match self {
            Self::AddEstimate { title, total, .. } => format!("add estimate \"{title}\" ({total})"),
            Self::EditEstimate { id, .. } => format!("edit estimate {id}"),
            Self::DeleteEstimate { id, .. } => format!("delete estimate {id}"),
            Self::Allocate { id, .. } => format!("allocate {id}"),
            Self::Recompute { from } => format!("recompute from {from}"),
            Self::Pin {
                id, date, amount, ..
            } => format!("pin {amount} of {id} on {date}"),
            Self::Unpin { id, date } => format!("unpin {id} on {date}"),
            Self::Split { id, amount, .. } => format!("split {amount} off {id}"),
            Self::Merge {
                parent_id,
                child_id,
            } => format!("merge {child_id} into {parent_id}"),
            Self::AddCapacityBlock {
                date, kind, amount, ..
            } => format!("block {amount} of {kind} on {date}"),
            Self::RemoveCapacityBlock { id } => format!("remove block {id}"),
            Self::RecordActual {
                id, date, amount, ..
            } => format!("record {amount} actual for {id} on {date}"),
            Self::ReplaceState(_) => "import state".to_string(),
        }
    }
}

/// Result of a successfully applied intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    EstimateAdded(EstimateId),
    EstimateSplit(EstimateId),
    EstimatesDeleted(Vec<EstimateId>),
    /// Total effort left unallocated after the pass.
    Allocated(Effort),
    /// The amount actually pinned, which may be clamped.
    Pinned(Effort),
    BlockAdded(BlockId),
    BlockRemoved(CapacityBlock),
    /// The amount now recorded for the date.
    ActualRecorded(Effort),
    Updated,
    Replaced,
}

/// A committed transaction: its label and the state before it was applied.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub label: String,
    pub committed_at: DateTime<Utc>,
    snapshot: Schedule,
}

/// What happened to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Commit,
    Undo,
    Redo,
}

/// Passed to subscribers after each commit, undo and redo.
#[derive(Debug)]
pub struct CommitNotice<'a> {
    pub change: Change,
    pub label: &'a str,
    pub state: &'a Schedule,
}

type Subscriber = Box<dyn FnMut(&CommitNotice<'_>)>;

/// Owner of the live schedule and its undo/redo history.
pub struct Ledger {
    state: Schedule,
    undo: VecDeque<Transaction>,
    redo: Vec<Transaction>,
    history_depth: usize,
    clock: Box<dyn Clock>,
    subscribers: Vec<Subscriber>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("state", &self.state)
            .field("undo", &self.undo.len())
            .field("redo", &self.redo.len())
            .field("history_depth", &self.history_depth)
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

impl Ledger {
    pub fn new(state: Schedule, clock: impl Clock + 'static) -> Self {
        Self {
            state,
            undo: VecDeque::new(),
            redo: Vec::new(),
            history_depth: DEFAULT_HISTORY_DEPTH,
            clock: Box::new(clock),
            subscribers: Vec::new(),
        }
    }

    /// Sets how many undoable transactions are kept, dropping the oldest.
    #[must_use]
    pub fn with_history_depth(mut self, depth: usize) -> Self {
        self.history_depth = depth;
        self.trim();
        self
    }

    pub const fn state(&self) -> &Schedule {
        &self.state
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Registers a callback run after every commit, undo and redo.
    pub fn subscribe(&mut self, subscriber: impl FnMut(&CommitNotice<'_>) + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    /// Applies an intent as one transaction.
    ///
    /// On error the live state is left exactly as it was.
    pub fn dispatch(&mut self, intent: Intent) -> Result<Outcome, ScheduleError> {
        let label = intent.label();
        let today = self.clock.today();
        let now = self.clock.now();

        let mut working = self.state.clone();
        let outcome = match apply(&mut working, intent, today, now) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(%label, error = %err, "transaction rolled back");
                return Err(err);
            }
        };

        let previous = std::mem::replace(&mut self.state, working);
        self.undo.push_back(Transaction {
            label: label.clone(),
            committed_at: now,
            snapshot: previous,
        });
        self.redo.clear();
        self.trim();
        tracing::debug!(%label, undo_depth = self.undo.len(), "committed transaction");
        self.notify(Change::Commit, &label);
        Ok(outcome)
    }

    /// Reverts the latest transaction. Returns its label, or `None` when
    /// there is nothing to undo.
    pub fn undo(&mut self) -> Option<String> {
        let transaction = self.undo.pop_back()?;
        let label = self.swap(transaction, Change::Undo);
        Some(label)
    }

    /// Re-applies the latest undone transaction.
    pub fn redo(&mut self) -> Option<String> {
        let transaction = self.redo.pop()?;
        let label = self.swap(transaction, Change::Redo);
        Some(label)
    }

    /// Installs the transaction's snapshot and files the replaced state on
    /// the opposite stack.
    fn swap(&mut self, transaction: Transaction, change: Change) -> String {
        let Transaction {
            label,
            committed_at,
            snapshot,
        } = transaction;
        let replaced = std::mem::replace(&mut self.state, snapshot);
        let inverse = Transaction {
            label: label.clone(),
            committed_at,
            snapshot: replaced,
        };
        match change {
            Change::Redo => self.undo.push_back(inverse),
            Change::Undo | Change::Commit => self.redo.push(inverse),
        }
        tracing::debug!(%label, ?change, "moved through history");
        self.notify(change, &label);
        label
    }

    /// Undoable transactions, oldest first.
    pub fn undo_stack(&self) -> impl Iterator<Item = &Transaction> {
        self.undo.iter()
    }

    /// Redoable transactions, oldest first; the last one is redone next.
    pub fn redo_stack(&self) -> impl Iterator<Item = &Transaction> {
        self.redo.iter()
    }

    /// Serializes both history stacks.
    pub fn history_records(&self) -> HistoryRecords {
        let record = |transaction: &Transaction| HistoryRecord {
            label: transaction.label.clone(),
            committed_at: transaction.committed_at,
            snapshot: transaction.snapshot.to_document(),
        };
        HistoryRecords {
            undo: self.undo.iter().map(record).collect(),
            redo: self.redo.iter().map(record).collect(),
        }
    }

    /// Replaces both history stacks with previously saved records.
    pub fn restore_history(&mut self, records: &HistoryRecords) -> Result<(), ScheduleError> {
        let calendar = *self.state.calendar();
        let load = |record: &HistoryRecord| -> Result<Transaction, ScheduleError> {
            Ok(Transaction {
                label: record.label.clone(),
                committed_at: record.committed_at,
                snapshot: Schedule::from_document(&record.snapshot, calendar)?,
            })
        };
        let undo = records.undo.iter().map(load).collect::<Result<VecDeque<_>, _>>()?;
        let redo = records.redo.iter().map(load).collect::<Result<Vec<_>, _>>()?;
        self.undo = undo;
        self.redo = redo;
        self.trim();
        Ok(())
    }

    fn trim(&mut self) {
        while self.undo.len() > self.history_depth {
            self.undo.pop_front();
        }
    }

    fn notify(&mut self, change: Change, label: &str) {
        let notice = CommitNotice {
            change,
            label,
            state: &self.state,
        };
        for subscriber in &mut self.subscribers {
            subscriber(&notice);
        }
    }
}

fn apply(
    schedule: &mut Schedule,
    intent: Intent,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Outcome, ScheduleError> {
    match intent {
        Intent::AddEstimate {
            title,
            total,
            start_on,
        } => add_estimate(schedule, title, total, start_on.unwrap_or(today), now)
            .map(Outcome::EstimateAdded),
        Intent::EditEstimate { id, patch } => {
            edit_estimate(schedule, &id, patch, today, now).map(|()| Outcome::Updated)
        }
        Intent::DeleteEstimate { id, force } => {
            delete_estimate(schedule, &id, force, today).map(Outcome::EstimatesDeleted)
        }
        Intent::Allocate { id, from } => {
            allocate(schedule, &id, from.unwrap_or(today)).map(Outcome::Allocated)
        }
        Intent::Recompute { from } => Ok(Outcome::Allocated(recompute_from(schedule, from))),
        Intent::Pin {
            id,
            date,
            amount,
            mode,
        } => pin(schedule, &id, date, amount, mode, today, now).map(Outcome::Pinned),
        Intent::Unpin { id, date } => unpin(schedule, &id, date, today).map(|()| Outcome::Updated),
        Intent::Split { id, amount, title } => {
            split(schedule, &id, amount, title, today, now).map(Outcome::EstimateSplit)
        }
        Intent::Merge {
            parent_id,
            child_id,
        } => merge(schedule, &parent_id, &child_id, today, now).map(|()| Outcome::Updated),
        Intent::AddCapacityBlock {
            date,
            kind,
            amount,
            note,
        } => Ok(Outcome::BlockAdded(add_capacity_block(
            schedule, date, kind, amount, note,
        ))),
        Intent::RemoveCapacityBlock { id } => {
            remove_capacity_block(schedule, &id).map(Outcome::BlockRemoved)
        }
        Intent::RecordActual {
            id,
            date,
            amount,
            accumulate,
        } => record_actual(schedule, &id, date, amount, accumulate, now)
            .map(Outcome::ActualRecorded),
        Intent::ReplaceState(document) => {
            *schedule = Schedule::from_document(&document, *schedule.calendar())?;
            Ok(Outcome::Replaced)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 5 + d).unwrap()
    }

    fn ledger() -> Ledger {
        Ledger::new(Schedule::default(), FixedClock::on(day(1)))
    }

    fn add(ledger: &mut Ledger, title: &str, hours: u32) -> EstimateId {
        match ledger
            .dispatch(Intent::AddEstimate {
                title: title.to_string(),
                total: Effort::from_hours(hours),
                start_on: None,
            })
            .unwrap()
        {
            Outcome::EstimateAdded(id) => id,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn add_defaults_start_to_today() {
        let mut ledger = ledger();
        let id = add(&mut ledger, "Design doc", 10);
        assert_eq!(ledger.state().estimate(&id).unwrap().start_on, day(1));
        assert_eq!(ledger.undo_stack().count(), 1);
    }

    #[test]
    fn failed_intent_leaves_state_untouched() {
        let mut ledger = ledger();
        let id = add(&mut ledger, "Design doc", 10);
        let before = ledger.state().clone();

        let err = ledger
            .dispatch(Intent::Split {
                id,
                amount: Effort::from_hours(40),
                title: None,
            })
            .unwrap_err();

        assert!(matches!(err, ScheduleError::InvalidSplitAmount { .. }));
        assert_eq!(ledger.state(), &before);
        assert_eq!(ledger.undo_stack().count(), 1);
    }

    #[test]
    fn undo_then_redo_restores_every_state() {
        let mut ledger = ledger();
        let empty = ledger.state().clone();

        let id = add(&mut ledger, "Design doc", 10);
        ledger
            .dispatch(Intent::Pin {
                id: id.clone(),
                date: day(1),
                amount: Effort::from_hours(3),
                mode: PinMode::Strict,
            })
            .unwrap();
        ledger
            .dispatch(Intent::AddCapacityBlock {
                date: day(2),
                kind: BlockKind::Vacation,
                amount: Effort::from_hours(8),
                note: None,
            })
            .unwrap();
        ledger
            .dispatch(Intent::Split {
                id,
                amount: Effort::from_hours(2),
                title: Some("Review".to_string()),
            })
            .unwrap();
        let latest = ledger.state().clone();

        for _ in 0..4 {
            assert!(ledger.undo().is_some());
        }
        assert_eq!(ledger.state(), &empty);
        assert_eq!(ledger.undo(), None);

        for _ in 0..4 {
            assert!(ledger.redo().is_some());
        }
        assert_eq!(ledger.state(), &latest);
        assert_eq!(ledger.redo(), None);
    }

    #[test]
    fn new_commit_clears_redo() {
        let mut ledger = ledger();
        add(&mut ledger, "First", 4);
        assert_eq!(ledger.undo().as_deref(), Some("add estimate \"First\" (4h)"));
        assert_eq!(ledger.redo_stack().count(), 1);

        add(&mut ledger, "Second", 4);
        assert_eq!(ledger.redo_stack().count(), 0);
        assert_eq!(ledger.redo(), None);
    }

    #[test]
    fn history_depth_drops_oldest() {
        let mut ledger = ledger().with_history_depth(2);
        add(&mut ledger, "First", 1);
        add(&mut ledger, "Second", 1);
        add(&mut ledger, "Third", 1);

        let labels: Vec<&str> = ledger.undo_stack().map(|t| t.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["add estimate \"Second\" (1h)", "add estimate \"Third\" (1h)"]
        );
        assert!(ledger.undo().is_some());
        assert!(ledger.undo().is_some());
        assert_eq!(ledger.undo(), None);
        assert_eq!(ledger.state().estimates().len(), 1);
    }

    #[test]
    fn subscribers_see_commits_undos_and_redos() {
        let seen: Rc<RefCell<Vec<(Change, String, usize)>>> = Rc::default();
        let mut ledger = ledger();
        let sink = Rc::clone(&seen);
        ledger.subscribe(move |notice| {
            sink.borrow_mut().push((
                notice.change,
                notice.label.to_string(),
                notice.state.estimates().len(),
            ));
        });

        add(&mut ledger, "Design doc", 2);
        ledger.undo();
        ledger.redo();
        // Rejected intents notify nobody.
        let _ = ledger.dispatch(Intent::Recompute { from: day(1) });
        let _ = ledger.dispatch(Intent::Unpin {
            id: EstimateId::new("ghost").unwrap(),
            date: day(1),
        });

        let label = "add estimate \"Design doc\" (2h)".to_string();
        assert_eq!(
            *seen.borrow(),
            vec![
                (Change::Commit, label.clone(), 1),
                (Change::Undo, label.clone(), 0),
                (Change::Redo, label, 1),
                (Change::Commit, "recompute from 2025-01-06".to_string(), 1),
            ]
        );
    }

    #[test]
    fn replace_state_is_undoable() {
        let mut other = ledger();
        add(&mut other, "Imported", 5);
        let document = other.state().to_document();

        let mut ledger = ledger();
        add(&mut ledger, "Old", 2);
        let before = ledger.state().clone();

        assert_eq!(
            ledger.dispatch(Intent::ReplaceState(document)),
            Ok(Outcome::Replaced)
        );
        assert_eq!(ledger.state(), other.state());

        assert_eq!(ledger.undo().as_deref(), Some("import state"));
        assert_eq!(ledger.state(), &before);
    }

    #[test]
    fn history_survives_serialization() {
        let mut ledger = ledger();
        add(&mut ledger, "First", 2);
        add(&mut ledger, "Second", 3);
        ledger.undo();
        let records = ledger.history_records();
        let json = serde_json::to_string(&records).unwrap();

        let mut restored = Ledger::new(ledger.state().clone(), FixedClock::on(day(1)));
        restored
            .restore_history(&serde_json::from_str(&json).unwrap())
            .unwrap();

        assert_eq!(restored.redo().as_deref(), Some("add estimate \"Second\" (3h)"));
        assert_eq!(restored.state().estimates().len(), 2);
        assert!(restored.undo().is_some());
        assert!(restored.undo().is_some());
        assert!(restored.state().estimates().is_empty());
    }
}
