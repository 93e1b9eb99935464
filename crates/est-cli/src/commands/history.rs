//! History commands: `est undo`, `est redo` and `est history`.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use est_core::{Ledger, Transaction};
use serde::Serialize;

use crate::workspace::Workspace;

pub fn undo<W: Write>(writer: &mut W, workspace: &mut Workspace) -> Result<()> {
    match workspace.undo() {
        Some(label) => writeln!(writer, "Undid: {label}")?,
        None => writeln!(writer, "Nothing to undo.")?,
    }
    Ok(())
}

pub fn redo<W: Write>(writer: &mut W, workspace: &mut Workspace) -> Result<()> {
    match workspace.redo() {
        Some(label) => writeln!(writer, "Redid: {label}")?,
        None => writeln!(writer, "Nothing to redo.")?,
    }
    Ok(())
}

/// A transaction as listed by `est history`.
#[derive(Debug, Serialize)]
pub struct HistoryEntry<'a> {
    pub label: &'a str,
    pub committed_at: DateTime<Utc>,
}

/// JSON output structure.
#[derive(Debug, Serialize)]
pub struct JsonHistory<'a> {
    /// Oldest first; the last entry is undone next.
    pub undo: Vec<HistoryEntry<'a>>,
    /// Oldest first; the last entry is redone next.
    pub redo: Vec<HistoryEntry<'a>>,
}

fn entry(transaction: &Transaction) -> HistoryEntry<'_> {
    HistoryEntry {
        label: &transaction.label,
        committed_at: transaction.committed_at,
    }
}

fn entries(ledger: &Ledger) -> JsonHistory<'_> {
    JsonHistory {
        undo: ledger.undo_stack().map(entry).collect(),
        redo: ledger.redo_stack().map(entry).collect(),
    }
}

/// Format history for human-readable output, most recent first.
pub fn format_history(history: &JsonHistory<'_>) -> String {
    let mut output = String::new();

    if history.undo.is_empty() && history.redo.is_empty() {
        writeln!(output, "No history.").unwrap();
        return output;
    }

    if !history.redo.is_empty() {
        writeln!(output, "REDO").unwrap();
        for entry in history.redo.iter().rev() {
            writeln!(
                output,
                "  {}  {}",
                entry.committed_at.format("%Y-%m-%d %H:%M"),
                entry.label
            )
            .unwrap();
        }
        writeln!(output).unwrap();
    }

    writeln!(output, "UNDO").unwrap();
    if history.undo.is_empty() {
        writeln!(output, "  (none)").unwrap();
    }
    for entry in history.undo.iter().rev() {
        writeln!(
            output,
            "  {}  {}",
            entry.committed_at.format("%Y-%m-%d %H:%M"),
            entry.label
        )
        .unwrap();
    }

    output
}

pub fn list<W: Write>(writer: &mut W, workspace: &Workspace, json: bool) -> Result<()> {
    let history = entries(workspace.ledger());
    if json {
        let output =
            serde_json::to_string_pretty(&history).context("failed to serialize history")?;
        writeln!(writer, "{output}")?;
    } else {
        write!(writer, "{}", format_history(&history))?;
    }
    Ok(())
}
