//! `est grid`: allocation per estimate and day.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use est_core::{DaySummary, EntryKind, Schedule};
use serde::Serialize;

use super::util::{parse_date, short_id, truncate};
use crate::workspace::Workspace;

const TITLE_WIDTH: usize = 20;

/// Dates `from` up to, not including, `from + days`.
fn dates(from: NaiveDate, days: u32) -> Vec<NaiveDate> {
    from.iter_days().take(days as usize).collect()
}

/// Format the grid for human-readable output.
///
/// One row per estimate with allocation in range, one column per date.
/// Pinned entries are marked with `*`.
pub fn format_grid(schedule: &Schedule, from: NaiveDate, days: u32) -> String {
    let mut output = String::new();
    let dates = dates(from, days);
    let Some(last) = dates.last() else {
        writeln!(output, "No days to show.").unwrap();
        return output;
    };

    writeln!(
        output,
        "GRID {} to {}",
        from.format("%Y-%m-%d"),
        last.format("%Y-%m-%d")
    )
    .unwrap();
    writeln!(output).unwrap();

    let estimates = schedule.estimates_in_range(from, *last + Duration::days(1));
    if estimates.is_empty() {
        writeln!(output, "Nothing allocated in this range.").unwrap();
        writeln!(output).unwrap();
    } else {
        write!(output, "{:<8}  {:<TITLE_WIDTH$}", "ID", "Estimate").unwrap();
        for date in &dates {
            write!(output, "  {:>9}", date.format("%a %m-%d").to_string()).unwrap();
        }
        writeln!(output).unwrap();
        write!(output, "────────  {}", "─".repeat(TITLE_WIDTH)).unwrap();
        for _ in &dates {
            write!(output, "  ─────────").unwrap();
        }
        writeln!(output).unwrap();

        for estimate in &estimates {
            write!(
                output,
                "{:<8}  {:<TITLE_WIDTH$}",
                short_id(estimate.id.as_str()),
                truncate(&estimate.title, TITLE_WIDTH)
            )
            .unwrap();
            for date in &dates {
                let cell = schedule
                    .entry(&estimate.id, *date)
                    .map_or_else(
                        || ".".to_string(),
                        |entry| match entry.kind {
                            EntryKind::Manual => format!("{}*", entry.amount),
                            EntryKind::Auto => entry.amount.to_string(),
                        },
                    );
                write!(output, "  {cell:>9}").unwrap();
            }
            writeln!(output).unwrap();
        }
        writeln!(output).unwrap();
    }

    write!(output, "{:<8}  {:<TITLE_WIDTH$}", "", "Allocated").unwrap();
    for date in &dates {
        write!(output, "  {:>9}", schedule.allocated_on(*date).to_string()).unwrap();
    }
    writeln!(output).unwrap();
    write!(output, "{:<8}  {:<TITLE_WIDTH$}", "", "Capacity").unwrap();
    for date in &dates {
        write!(output, "  {:>9}", schedule.capacity_of(*date).to_string()).unwrap();
    }
    writeln!(output).unwrap();

    output
}

/// JSON output structure.
#[derive(Debug, Serialize)]
pub struct JsonGrid {
    pub from: NaiveDate,
    pub days: Vec<DaySummary>,
}

pub fn run<W: Write>(
    writer: &mut W,
    workspace: &Workspace,
    from: Option<&str>,
    days: u32,
) -> Result<()> {
    let from = resolve_from(workspace, from)?;
    write!(writer, "{}", format_grid(workspace.state(), from, days))?;
    Ok(())
}

pub fn run_json<W: Write>(
    writer: &mut W,
    workspace: &Workspace,
    from: Option<&str>,
    days: u32,
) -> Result<()> {
    let from = resolve_from(workspace, from)?;
    let grid = JsonGrid {
        from,
        days: dates(from, days)
            .into_iter()
            .map(|date| workspace.state().day(date))
            .collect(),
    };
    let output = serde_json::to_string_pretty(&grid).context("failed to serialize grid")?;
    writeln!(writer, "{output}")?;
    Ok(())
}

fn resolve_from(workspace: &Workspace, from: Option<&str>) -> Result<NaiveDate> {
    match from {
        Some(s) => parse_date(s, workspace.today()),
        None => Ok(workspace.today()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixtures::{day, schedule};
    use insta::assert_snapshot;

    #[test]
    fn test_format_grid_week() {
        let schedule = schedule();
        assert_snapshot!(format_grid(&schedule, day(1), 5), @r"
        GRID 2025-01-06 to 2025-01-10

        ID        Estimate              Mon 01-06  Tue 01-07  Wed 01-08  Thu 01-09  Fri 01-10
        ────────  ────────────────────  ─────────  ─────────  ─────────  ─────────  ─────────
        a1b2c3d4  Design doc                  3h*         7h          .          .          .
        e5f6a7b8  Review                       4h          .          .          .          .

                  Allocated                    7h         7h         0h         0h         0h
                  Capacity                     8h         8h         4h         8h         8h
        ");
    }

    #[test]
    fn test_format_grid_empty_range() {
        let schedule = schedule();
        assert_snapshot!(format_grid(&schedule, day(6), 2), @r"
        GRID 2025-01-11 to 2025-01-12

        Nothing allocated in this range.

                  Allocated                    0h         0h
                  Capacity                     0h         0h
        ");
    }

    #[test]
    fn test_day_summaries_follow_priority() {
        let schedule = schedule();
        let summary = schedule.day(day(1));
        assert_eq!(summary.entries.len(), 2);
        assert_eq!(summary.entries[0].kind, EntryKind::Manual);
        assert_eq!(summary.free.to_string(), "1h");
    }
}
