//! The loaded state of one `est` invocation.
//!
//! Loads the stored schedule and history into a [`Ledger`], routes every
//! mutation through it, and saves after each commit. A failed save is
//! reported as a warning; the in-memory state is kept.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use est_core::{
    BlockId, EstimateId, FixedClock, Intent, Ledger, Outcome, Schedule, ScheduleError, SystemClock,
};
use est_db::{Database, DbError};

use crate::Config;

pub struct Workspace {
    db: Database,
    ledger: Ledger,
}

impl Workspace {
    /// Opens the configured database, creating its directory if necessary.
    pub fn open(config: &Config, today: Option<NaiveDate>) -> Result<Self> {
        if let Some(parent) = config.database_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create database directory")?;
        }
        let db = Database::open(&config.database_path).with_context(|| {
            format!("failed to open {}", config.database_path.display())
        })?;
        Self::from_database(db, config, today)
    }

    /// Loads state and history from an open database.
    ///
    /// `today` pins the ledger's clock to a date; `None` uses the system clock.
    pub fn from_database(db: Database, config: &Config, today: Option<NaiveDate>) -> Result<Self> {
        let document = db.load_document().context("failed to load state")?;
        let state = Schedule::from_document(&document, config.calendar())
            .context("stored state is invalid")?;

        let ledger = match today {
            Some(today) => Ledger::new(state, FixedClock::new(today, Utc::now())),
            None => Ledger::new(state, SystemClock),
        };
        let mut ledger = ledger.with_history_depth(config.history_depth);

        let history = db.load_history().context("failed to load history")?;
        ledger
            .restore_history(&history)
            .context("stored history is invalid")?;

        ledger.subscribe(|notice| {
            tracing::debug!(
                change = ?notice.change,
                label = notice.label,
                estimates = notice.state.estimates().len(),
                "state changed"
            );
        });

        Ok(Self { db, ledger })
    }

    pub const fn state(&self) -> &Schedule {
        self.ledger.state()
    }

    pub const fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn today(&self) -> NaiveDate {
        self.ledger.today()
    }

    /// Dispatches an intent and saves the result.
    pub fn apply(&mut self, intent: Intent) -> Result<Outcome, ScheduleError> {
        let outcome = self.ledger.dispatch(intent)?;
        self.persist();
        Ok(outcome)
    }

    pub fn undo(&mut self) -> Option<String> {
        let label = self.ledger.undo()?;
        self.persist();
        Some(label)
    }

    pub fn redo(&mut self) -> Option<String> {
        let label = self.ledger.redo()?;
        self.persist();
        Some(label)
    }

    fn persist(&mut self) {
        if let Err(err) = self.save() {
            let err = ScheduleError::PersistenceWriteFailed {
                message: err.to_string(),
            };
            tracing::error!(error = %err, "changes are kept in memory only");
            eprintln!("warning: {err}");
        }
    }

    fn save(&mut self) -> Result<(), DbError> {
        self.db.save_document(&self.ledger.state().to_document())?;
        self.db.save_history(&self.ledger.history_records())
    }

    /// Resolves a full estimate ID or a unique prefix of one.
    pub fn resolve_estimate(&self, prefix: &str) -> Result<EstimateId> {
        let ids: Vec<&str> = self
            .state()
            .estimates()
            .iter()
            .map(|estimate| estimate.id.as_str())
            .collect();
        let id = resolve_prefix(&ids, prefix)
            .ok_or_else(|| ScheduleError::UnknownEstimateId(prefix.to_string()))??;
        Ok(EstimateId::new(id)?)
    }

    /// Resolves a full capacity block ID or a unique prefix of one.
    pub fn resolve_block(&self, prefix: &str) -> Result<BlockId> {
        let ids: Vec<&str> = self
            .state()
            .capacity_blocks()
            .iter()
            .map(|block| block.id.as_str())
            .collect();
        let Some(id) = resolve_prefix(&ids, prefix) else {
            anyhow::bail!("unknown capacity block: {prefix}");
        };
        Ok(BlockId::new(id?)?)
    }
}

/// Finds the single ID equal to or starting with `prefix`.
///
/// Returns `None` when nothing matches and an error when several do.
fn resolve_prefix<'a>(ids: &[&'a str], prefix: &str) -> Option<Result<&'a str>> {
    if prefix.is_empty() {
        return None;
    }
    if let Some(exact) = ids.iter().find(|id| **id == prefix) {
        return Some(Ok(*exact));
    }
    let matches: Vec<&str> = ids
        .iter()
        .copied()
        .filter(|id| id.starts_with(prefix))
        .collect();
    match matches.as_slice() {
        [] => None,
        [id] => Some(Ok(*id)),
        many => Some(Err(anyhow::anyhow!(
            "ambiguous ID prefix {prefix}: matches {} entries",
            many.len()
        ))),
    }
}
