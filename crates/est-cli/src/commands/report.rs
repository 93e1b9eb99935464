//! `est report`: planned versus actual effort.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use est_core::{EstimateVariance, variance_report};
use serde::Serialize;

use super::util::{format_signed, parse_date, short_id, truncate};
use crate::workspace::Workspace;

/// Format the variance report for human-readable output.
pub fn format_report(rows: &[EstimateVariance], through: NaiveDate) -> String {
    let mut output = String::new();

    writeln!(output, "VARIANCE through {}", through.format("%Y-%m-%d")).unwrap();
    writeln!(output).unwrap();

    if rows.is_empty() {
        writeln!(output, "No estimates.").unwrap();
        return output;
    }

    writeln!(
        output,
        "{:<8}  {:<22}  {:>7}  {:>7}  {:>7}  {:>8}",
        "ID", "Title", "Total", "Planned", "Actual", "Variance"
    )
    .unwrap();
    writeln!(
        output,
        "────────  ──────────────────────  ───────  ───────  ───────  ────────"
    )
    .unwrap();

    let mut overruns = 0;
    for row in rows {
        let marker = if row.is_overrun() {
            overruns += 1;
            "  overrun"
        } else {
            ""
        };
        writeln!(
            output,
            "{:<8}  {:<22}  {:>7}  {:>7}  {:>7}  {:>8}{marker}",
            short_id(row.estimate_id.as_str()),
            truncate(&row.title, 22),
            row.total.to_string(),
            row.planned_to_date.to_string(),
            row.actual_to_date.to_string(),
            format_signed(row.variance_minutes),
        )
        .unwrap();
    }

    if overruns > 0 {
        writeln!(output).unwrap();
        writeln!(
            output,
            "{overruns} estimate(s) ran over plan. Consider raising their totals with 'est estimate edit'."
        )
        .unwrap();
    }

    output
}

/// JSON output structure.
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub through: NaiveDate,
    pub estimates: &'a [EstimateVariance],
}

pub fn run<W: Write>(
    writer: &mut W,
    workspace: &Workspace,
    through: Option<&str>,
    json: bool,
) -> Result<()> {
    let through = match through {
        Some(s) => parse_date(s, workspace.today())?,
        None => workspace.today(),
    };
    let rows = variance_report(workspace.state(), through);

    if json {
        let report = JsonReport {
            through,
            estimates: &rows,
        };
        let output = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
        writeln!(writer, "{output}")?;
    } else {
        write!(writer, "{}", format_report(&rows, through))?;
    }
    Ok(())
}
