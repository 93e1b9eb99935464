//! Storage layer for the work estimator.
//!
//! Persists the flat [`StateDocument`] and the undo/redo history using
//! `rusqlite`. Each save replaces the stored state wholesale inside one
//! SQLite transaction, so a failed save leaves the previous state intact.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` instance can be moved between threads but cannot be shared
//! across threads without external synchronization.
//!
//! # Schema
//!
//! Dates are stored as TEXT `YYYY-MM-DD`; timestamps as TEXT RFC 3339 in UTC
//! with as many fractional digits as needed to round-trip exactly.
//! Amounts are INTEGER minutes. Estimates carry a `seq` column holding
//! their allocation priority.
//!
//! History snapshots are stored as JSON-encoded [`StateDocument`]s in the
//! `history` table, one row per transaction, keyed by stack and position.

use std::path::Path;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use est_core::document::{
    ActualRecord, AllocationRecord, CapacityBlockRecord, DOCUMENT_VERSION, EstimateRecord,
    ShortfallRecord,
};
use est_core::{HistoryRecord, HistoryRecords, StateDocument};
use rusqlite::{Connection, Transaction, params};
use thiserror::Error;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A history snapshot could not be encoded or decoded.
    #[error("invalid history snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
    /// A stored date or timestamp could not be parsed.
    #[error("invalid {column} value: {value}")]
    Parse {
        column: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A history row names a stack other than `undo` or `redo`.
    #[error("unknown history stack: {0}")]
    UnknownStack(String),
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            -- seq: allocation priority, lower claims capacity first
            CREATE TABLE IF NOT EXISTS estimates (
                id TEXT PRIMARY KEY,
                seq INTEGER NOT NULL,
                title TEXT NOT NULL,
                total_minutes INTEGER NOT NULL CHECK (total_minutes >= 0),
                start_on TEXT NOT NULL,
                parent_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (parent_id) REFERENCES estimates(id)
                    ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED
            );

            CREATE INDEX IF NOT EXISTS idx_estimates_seq ON estimates(seq);

            CREATE TABLE IF NOT EXISTS allocations (
                estimate_id TEXT NOT NULL,
                date TEXT NOT NULL,
                amount_minutes INTEGER NOT NULL CHECK (amount_minutes >= 0),
                kind TEXT NOT NULL CHECK (kind IN ('auto', 'manual')),
                modified_at TEXT,
                PRIMARY KEY (estimate_id, date),
                FOREIGN KEY (estimate_id) REFERENCES estimates(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_allocations_date ON allocations(date);

            CREATE TABLE IF NOT EXISTS capacity_blocks (
                id TEXT PRIMARY KEY,
                date TEXT NOT NULL,
                kind TEXT NOT NULL,
                amount_minutes INTEGER NOT NULL CHECK (amount_minutes >= 0),
                note TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_capacity_blocks_date ON capacity_blocks(date);

            CREATE TABLE IF NOT EXISTS actuals (
                estimate_id TEXT NOT NULL,
                date TEXT NOT NULL,
                amount_minutes INTEGER NOT NULL CHECK (amount_minutes >= 0),
                recorded_at TEXT NOT NULL,
                PRIMARY KEY (estimate_id, date),
                FOREIGN KEY (estimate_id) REFERENCES estimates(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS shortfalls (
                estimate_id TEXT PRIMARY KEY,
                amount_minutes INTEGER NOT NULL CHECK (amount_minutes >= 0),
                FOREIGN KEY (estimate_id) REFERENCES estimates(id) ON DELETE CASCADE
            );

            -- snapshot: JSON state document from before the transaction
            CREATE TABLE IF NOT EXISTS history (
                stack TEXT NOT NULL CHECK (stack IN ('undo', 'redo')),
                position INTEGER NOT NULL,
                label TEXT NOT NULL,
                committed_at TEXT NOT NULL,
                snapshot TEXT NOT NULL,
                PRIMARY KEY (stack, position)
            );
            ",
        )?;
        Ok(())
    }

    /// Replaces the stored state with `document`.
    pub fn save_document(&mut self, document: &StateDocument) -> Result<(), DbError> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(
            "
            DELETE FROM shortfalls;
            DELETE FROM actuals;
            DELETE FROM allocations;
            DELETE FROM capacity_blocks;
            DELETE FROM estimates;
            ",
        )?;
        write_document(&tx, document)?;
        tx.commit()?;
        tracing::debug!(
            estimates = document.estimates.len(),
            allocations = document.allocations.len(),
            "saved state"
        );
        Ok(())
    }

    /// Loads the stored state. An empty database yields an empty document.
    pub fn load_document(&self) -> Result<StateDocument, DbError> {
        let document = StateDocument {
            version: DOCUMENT_VERSION,
            estimates: self.load_estimates()?,
            allocations: self.load_allocations()?,
            capacity_blocks: self.load_capacity_blocks()?,
            actuals: self.load_actuals()?,
            shortfalls: self.load_shortfalls()?,
        };
        tracing::debug!(estimates = document.estimates.len(), "loaded state");
        Ok(document)
    }

    /// Replaces the stored undo/redo history.
    pub fn save_history(&mut self, history: &HistoryRecords) -> Result<(), DbError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM history", [])?;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO history (stack, position, label, committed_at, snapshot)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ",
            )?;
            for (stack, records) in [("undo", &history.undo), ("redo", &history.redo)] {
                for (position, record) in records.iter().enumerate() {
                    stmt.execute(params![
                        stack,
                        i64::try_from(position).unwrap_or(i64::MAX),
                        record.label,
                        format_timestamp(record.committed_at),
                        serde_json::to_string(&record.snapshot)?,
                    ])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Loads the stored undo/redo history, oldest transaction first.
    pub fn load_history(&self) -> Result<HistoryRecords, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT stack, label, committed_at, snapshot
            FROM history
            ORDER BY stack, position
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut history = HistoryRecords::default();
        for row in rows {
            let (stack, label, committed_at, snapshot) = row?;
            let record = HistoryRecord {
                label,
                committed_at: parse_timestamp(&committed_at, "committed_at")?,
                snapshot: serde_json::from_str(&snapshot)?,
            };
            match stack.as_str() {
                "undo" => history.undo.push(record),
                "redo" => history.redo.push(record),
                _ => return Err(DbError::UnknownStack(stack)),
            }
        }
        Ok(history)
    }

    fn load_estimates(&self) -> Result<Vec<EstimateRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, title, total_minutes, start_on, parent_id, created_at, updated_at
            FROM estimates
            ORDER BY seq
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut estimates = Vec::new();
        for row in rows {
            let (id, title, total_minutes, start_on, parent_id, created_at, updated_at) = row?;
            estimates.push(EstimateRecord {
                id,
                title,
                total_minutes,
                start_on: parse_date(&start_on, "start_on")?,
                parent_id,
                created_at: parse_timestamp(&created_at, "created_at")?,
                updated_at: parse_timestamp(&updated_at, "updated_at")?,
            });
        }
        Ok(estimates)
    }

    fn load_allocations(&self) -> Result<Vec<AllocationRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT estimate_id, date, amount_minutes, kind, modified_at
            FROM allocations
            ORDER BY estimate_id, date
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut allocations = Vec::new();
        for row in rows {
            let (estimate_id, date, amount_minutes, kind, modified_at) = row?;
            allocations.push(AllocationRecord {
                estimate_id,
                date: parse_date(&date, "date")?,
                amount_minutes,
                kind,
                modified_at: modified_at
                    .map(|value| parse_timestamp(&value, "modified_at"))
                    .transpose()?,
            });
        }
        Ok(allocations)
    }

    fn load_capacity_blocks(&self) -> Result<Vec<CapacityBlockRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, date, kind, amount_minutes, note
            FROM capacity_blocks
            ORDER BY date, rowid
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut blocks = Vec::new();
        for row in rows {
            let (id, date, kind, amount_minutes, note) = row?;
            blocks.push(CapacityBlockRecord {
                id,
                date: parse_date(&date, "date")?,
                kind,
                amount_minutes,
                note,
            });
        }
        Ok(blocks)
    }

    fn load_actuals(&self) -> Result<Vec<ActualRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT estimate_id, date, amount_minutes, recorded_at
            FROM actuals
            ORDER BY estimate_id, date
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut actuals = Vec::new();
        for row in rows {
            let (estimate_id, date, amount_minutes, recorded_at) = row?;
            actuals.push(ActualRecord {
                estimate_id,
                date: parse_date(&date, "date")?,
                amount_minutes,
                recorded_at: parse_timestamp(&recorded_at, "recorded_at")?,
            });
        }
        Ok(actuals)
    }

    fn load_shortfalls(&self) -> Result<Vec<ShortfallRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT estimate_id, amount_minutes FROM shortfalls ORDER BY estimate_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ShortfallRecord {
                estimate_id: row.get(0)?,
                amount_minutes: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn write_document(tx: &Transaction<'_>, document: &StateDocument) -> Result<(), DbError> {
    let mut stmt = tx.prepare(
        "
        INSERT INTO estimates
            (id, seq, title, total_minutes, start_on, parent_id, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ",
    )?;
    for (seq, estimate) in document.estimates.iter().enumerate() {
        stmt.execute(params![
            estimate.id,
            i64::try_from(seq).unwrap_or(i64::MAX),
            estimate.title,
            estimate.total_minutes,
            format_date(estimate.start_on),
            estimate.parent_id,
            format_timestamp(estimate.created_at),
            format_timestamp(estimate.updated_at),
        ])?;
    }

    let mut stmt = tx.prepare(
        "
        INSERT INTO allocations (estimate_id, date, amount_minutes, kind, modified_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ",
    )?;
    for entry in &document.allocations {
        stmt.execute(params![
            entry.estimate_id,
            format_date(entry.date),
            entry.amount_minutes,
            entry.kind,
            entry.modified_at.map(format_timestamp),
        ])?;
    }

    let mut stmt = tx.prepare(
        "
        INSERT INTO capacity_blocks (id, date, kind, amount_minutes, note)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ",
    )?;
    for block in &document.capacity_blocks {
        stmt.execute(params![
            block.id,
            format_date(block.date),
            block.kind,
            block.amount_minutes,
            block.note,
        ])?;
    }

    let mut stmt = tx.prepare(
        "
        INSERT INTO actuals (estimate_id, date, amount_minutes, recorded_at)
        VALUES (?1, ?2, ?3, ?4)
        ",
    )?;
    for actual in &document.actuals {
        stmt.execute(params![
            actual.estimate_id,
            format_date(actual.date),
            actual.amount_minutes,
            format_timestamp(actual.recorded_at),
        ])?;
    }

    let mut stmt =
        tx.prepare("INSERT INTO shortfalls (estimate_id, amount_minutes) VALUES (?1, ?2)")?;
    for shortfall in &document.shortfalls {
        stmt.execute(params![shortfall.estimate_id, shortfall.amount_minutes])?;
    }
    Ok(())
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(value: &str, column: &'static str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|source| DbError::Parse {
        column,
        value: value.to_string(),
        source,
    })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_timestamp(value: &str, column: &'static str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::Parse {
            column,
            value: value.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use chrono::TimeZone;
    use est_core::{
        BlockKind, CalendarConfig, Effort, FixedClock, Intent, Ledger, Outcome, PinMode, Schedule,
    };

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 5 + d).unwrap()
    }

    /// A ledger with every kind of record and some history.
    fn populated_ledger() -> Ledger {
        let now = Utc.with_ymd_and_hms(2025, 1, 6, 9, 30, 15).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        let mut ledger = Ledger::new(Schedule::default(), FixedClock::new(day(1), now));
        let Ok(Outcome::EstimateAdded(id)) = ledger.dispatch(Intent::AddEstimate {
            title: "Design doc".to_string(),
            total: Effort::from_hours(10),
            start_on: None,
        }) else {
            panic!("add failed");
        };
        ledger
            .dispatch(Intent::Pin {
                id: id.clone(),
                date: day(2),
                amount: Effort::from_mins(90),
                mode: PinMode::Strict,
            })
            .unwrap();
        ledger
            .dispatch(Intent::Split {
                id: id.clone(),
                amount: Effort::from_hours(2),
                title: None,
            })
            .unwrap();
        ledger
            .dispatch(Intent::AddCapacityBlock {
                date: day(3),
                kind: BlockKind::OtherWork,
                amount: Effort::from_hours(3),
                note: Some("on call".to_string()),
            })
            .unwrap();
        ledger
            .dispatch(Intent::RecordActual {
                id,
                date: day(1),
                amount: Effort::from_hours(7),
                accumulate: false,
            })
            .unwrap();
        ledger.undo();
        ledger
    }

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn schema_matches_data_model() {
        let db = Database::open_in_memory().expect("open in-memory db");

        assert_eq!(
            table_columns(&db.conn, "estimates"),
            vec![
                "id",
                "seq",
                "title",
                "total_minutes",
                "start_on",
                "parent_id",
                "created_at",
                "updated_at",
            ]
        );
        assert_eq!(
            table_columns(&db.conn, "allocations"),
            vec!["estimate_id", "date", "amount_minutes", "kind", "modified_at"]
        );
        assert_eq!(
            table_columns(&db.conn, "history"),
            vec!["stack", "position", "label", "committed_at", "snapshot"]
        );
        assert!(index_names(&db.conn, "allocations").contains("idx_allocations_date"));
        assert!(index_names(&db.conn, "capacity_blocks").contains("idx_capacity_blocks_date"));
    }

    #[test]
    fn empty_database_loads_empty_document() {
        let db = Database::open_in_memory().expect("open in-memory db");
        assert_eq!(db.load_document().unwrap(), StateDocument::default());
        assert_eq!(db.load_history().unwrap(), HistoryRecords::default());
    }

    #[test]
    fn document_round_trips_losslessly() {
        let ledger = populated_ledger();
        let document = ledger.state().to_document();
        let mut db = Database::open_in_memory().expect("open in-memory db");

        db.save_document(&document).unwrap();
        let loaded = db.load_document().unwrap();

        let restored = Schedule::from_document(&loaded, CalendarConfig::default()).unwrap();
        assert_eq!(&restored, ledger.state());
    }

    #[test]
    fn save_replaces_previous_state() {
        let ledger = populated_ledger();
        let mut db = Database::open_in_memory().expect("open in-memory db");
        db.save_document(&ledger.state().to_document()).unwrap();

        db.save_document(&StateDocument::default()).unwrap();

        let count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM allocations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
        assert!(db.load_document().unwrap().estimates.is_empty());
    }

    #[test]
    fn estimates_load_in_priority_order() {
        let ledger = populated_ledger();
        let mut db = Database::open_in_memory().expect("open in-memory db");
        db.save_document(&ledger.state().to_document()).unwrap();

        let titles: Vec<String> = db
            .load_document()
            .unwrap()
            .estimates
            .into_iter()
            .map(|estimate| estimate.title)
            .collect();
        assert_eq!(titles, vec!["Design doc", "Design doc (split)"]);
    }

    #[test]
    fn history_round_trips() {
        let ledger = populated_ledger();
        let history = ledger.history_records();
        assert_eq!(history.undo.len(), 4);
        assert_eq!(history.redo.len(), 1);

        let mut db = Database::open_in_memory().expect("open in-memory db");
        db.save_history(&history).unwrap();
        assert_eq!(db.load_history().unwrap(), history);

        db.save_history(&HistoryRecords::default()).unwrap();
        assert_eq!(db.load_history().unwrap(), HistoryRecords::default());
    }

    #[test]
    fn file_database_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("est.db");
        let document = populated_ledger().state().to_document();

        {
            let mut db = Database::open(&path).unwrap();
            db.save_document(&document).unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert_eq!(db.load_document().unwrap().estimates, document.estimates);
    }

    fn table_columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .expect("prepare table_info");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query table_info");
        rows.map(|row| row.expect("table_info row")).collect()
    }

    fn index_names(conn: &Connection, table: &str) -> HashSet<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA index_list({table})"))
            .expect("prepare index_list");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query index_list");
        rows.map(|row| row.expect("index_list row")).collect()
    }
}
