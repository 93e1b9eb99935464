//! Estimate commands: `est estimate add|edit|rm|list` and `est show`.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use est_core::{
    ActualEntry, AllocationBalance, AllocationEntry, EntryKind, Estimate, EstimateId,
    EstimatePatch, Intent, Outcome, Schedule,
};
use serde::Serialize;

use super::util::{parse_date, parse_effort, short_id, truncate};
use crate::workspace::Workspace;

// ========== Mutations ==========

pub fn add<W: Write>(
    writer: &mut W,
    workspace: &mut Workspace,
    title: &str,
    total: &str,
    start: Option<&str>,
) -> Result<()> {
    let total = parse_effort(total)?;
    let start_on = start
        .map(|s| parse_date(s, workspace.today()))
        .transpose()?;

    let outcome = workspace.apply(Intent::AddEstimate {
        title: title.to_string(),
        total,
        start_on,
    })?;
    let Outcome::EstimateAdded(id) = outcome else {
        anyhow::bail!("unexpected outcome: {outcome:?}");
    };

    writeln!(writer, "Added estimate {} ({total})", short_id(id.as_str()))?;
    warn_shortfall(writer, workspace.state(), &id)?;
    Ok(())
}

pub fn edit<W: Write>(
    writer: &mut W,
    workspace: &mut Workspace,
    id: &str,
    title: Option<&str>,
    total: Option<&str>,
    start: Option<&str>,
) -> Result<()> {
    if title.is_none() && total.is_none() && start.is_none() {
        anyhow::bail!("nothing to change: pass --title, --total or --start");
    }
    let id = workspace.resolve_estimate(id)?;
    let patch = EstimatePatch {
        title: title.map(String::from),
        total: total.map(parse_effort).transpose()?,
        start_on: start
            .map(|s| parse_date(s, workspace.today()))
            .transpose()?,
    };

    workspace.apply(Intent::EditEstimate {
        id: id.clone(),
        patch,
    })?;
    writeln!(writer, "Updated estimate {}", short_id(id.as_str()))?;
    warn_shortfall(writer, workspace.state(), &id)?;
    Ok(())
}

pub fn remove<W: Write>(
    writer: &mut W,
    workspace: &mut Workspace,
    id: &str,
    force: bool,
) -> Result<()> {
    let id = workspace.resolve_estimate(id)?;
    let outcome = workspace.apply(Intent::DeleteEstimate { id, force })?;
    if let Outcome::EstimatesDeleted(deleted) = outcome {
        for id in &deleted {
            writeln!(writer, "Deleted estimate {}", short_id(id.as_str()))?;
        }
    }
    Ok(())
}

/// Prints the unallocated remainder of an estimate, if it has one.
pub(crate) fn warn_shortfall<W: Write>(
    writer: &mut W,
    schedule: &Schedule,
    id: &EstimateId,
) -> Result<()> {
    let shortfall = schedule.shortfall(id);
    if !shortfall.is_zero() {
        writeln!(
            writer,
            "Warning: {shortfall} of {} could not be allocated within the horizon.",
            short_id(id.as_str())
        )?;
    }
    Ok(())
}

// ========== Listing ==========

/// An estimate with its allocation balance.
#[derive(Debug, Serialize)]
pub struct EstimateRow<'a> {
    #[serde(flatten)]
    pub estimate: &'a Estimate,
    pub balance: AllocationBalance,
}

fn rows(schedule: &Schedule) -> Result<Vec<EstimateRow<'_>>> {
    schedule
        .estimates()
        .iter()
        .map(|estimate| {
            Ok(EstimateRow {
                estimate,
                balance: schedule.balance(&estimate.id)?,
            })
        })
        .collect()
}

/// Format estimates for human-readable output.
pub fn format_estimates(rows: &[EstimateRow<'_>]) -> String {
    let mut output = String::new();

    if rows.is_empty() {
        writeln!(output, "No estimates.").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "Hint: Run 'est estimate add <title> <total>' to add one.").unwrap();
        return output;
    }

    writeln!(
        output,
        "{:<8}  {:<22}  {:>7}  {:>9}  {:>7}  {:>11}  {:<10}  Parent",
        "ID", "Title", "Total", "Allocated", "Pinned", "Unallocated", "Start"
    )
    .unwrap();
    writeln!(
        output,
        "────────  ──────────────────────  ───────  ─────────  ───────  ───────────  ──────────  ────────"
    )
    .unwrap();

    for row in rows {
        let estimate = row.estimate;
        let parent = estimate
            .parent_id
            .as_ref()
            .map_or_else(|| "-".to_string(), |id| short_id(id.as_str()));
        writeln!(
            output,
            "{:<8}  {:<22}  {:>7}  {:>9}  {:>7}  {:>11}  {:<10}  {}",
            short_id(estimate.id.as_str()),
            truncate(&estimate.title, 22),
            estimate.total.to_string(),
            row.balance.allocated.to_string(),
            row.balance.manual.to_string(),
            row.balance.unallocated.to_string(),
            estimate.start_on.format("%Y-%m-%d").to_string(),
            parent,
        )
        .unwrap();
    }

    output
}

pub fn list<W: Write>(writer: &mut W, workspace: &Workspace, json: bool) -> Result<()> {
    let rows = rows(workspace.state())?;
    if json {
        let output = serde_json::to_string_pretty(&rows).context("failed to serialize estimates")?;
        writeln!(writer, "{output}")?;
    } else {
        write!(writer, "{}", format_estimates(&rows))?;
    }
    Ok(())
}

// ========== Detail ==========

/// Everything known about one estimate.
#[derive(Debug, Serialize)]
pub struct EstimateDetail<'a> {
    #[serde(flatten)]
    pub estimate: &'a Estimate,
    pub balance: AllocationBalance,
    pub allocations: Vec<&'a AllocationEntry>,
    pub actuals: Vec<&'a ActualEntry>,
    pub splits: Vec<&'a EstimateId>,
}

pub fn detail<'a>(schedule: &'a Schedule, id: &EstimateId) -> Result<EstimateDetail<'a>> {
    Ok(EstimateDetail {
        estimate: schedule.estimate(id)?,
        balance: schedule.balance(id)?,
        allocations: schedule.allocation_grid_for(id)?,
        actuals: schedule.actuals_for(id)?,
        splits: schedule
            .children_of(id)
            .into_iter()
            .map(|child| &child.id)
            .collect(),
    })
}

/// Format one estimate for human-readable output.
pub fn format_detail(detail: &EstimateDetail<'_>) -> String {
    let mut output = String::new();
    let estimate = detail.estimate;

    writeln!(output, "{} {}", short_id(estimate.id.as_str()), estimate.title).unwrap();
    writeln!(output, "  ID:          {}", estimate.id).unwrap();
    writeln!(output, "  Total:       {}", estimate.total).unwrap();
    writeln!(output, "  Start:       {}", estimate.start_on.format("%Y-%m-%d")).unwrap();
    if let Some(parent) = &estimate.parent_id {
        writeln!(output, "  Split from:  {}", short_id(parent.as_str())).unwrap();
    }
    if !detail.splits.is_empty() {
        let splits: Vec<String> = detail
            .splits
            .iter()
            .map(|id| short_id(id.as_str()))
            .collect();
        writeln!(output, "  Splits:      {}", splits.join(", ")).unwrap();
    }
    writeln!(
        output,
        "  Allocated:   {} ({} pinned)",
        detail.balance.allocated, detail.balance.manual
    )
    .unwrap();
    if !detail.balance.unallocated.is_zero() {
        writeln!(output, "  Unallocated: {}", detail.balance.unallocated).unwrap();
    }

    writeln!(output).unwrap();
    writeln!(output, "ALLOCATION").unwrap();
    if detail.allocations.is_empty() {
        writeln!(output, "  (none)").unwrap();
    }
    for entry in &detail.allocations {
        let marker = if entry.kind == EntryKind::Manual {
            "  pinned"
        } else {
            ""
        };
        writeln!(
            output,
            "  {}  {:>7}{marker}",
            entry.date.format("%a %Y-%m-%d"),
            entry.amount.to_string()
        )
        .unwrap();
    }

    writeln!(output).unwrap();
    writeln!(output, "ACTUALS").unwrap();
    if detail.actuals.is_empty() {
        writeln!(output, "  (none)").unwrap();
    }
    for actual in &detail.actuals {
        writeln!(
            output,
            "  {}  {:>7}",
            actual.date.format("%a %Y-%m-%d"),
            actual.amount.to_string()
        )
        .unwrap();
    }

    output
}

pub fn show<W: Write>(writer: &mut W, workspace: &Workspace, id: &str, json: bool) -> Result<()> {
    let id = workspace.resolve_estimate(id)?;
    let detail = detail(workspace.state(), &id)?;
    if json {
        let output =
            serde_json::to_string_pretty(&detail).context("failed to serialize estimate")?;
        writeln!(writer, "{output}")?;
    } else {
        write!(writer, "{}", format_detail(&detail))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixtures::{DESIGN_ID, REVIEW_ID, schedule};
    use insta::assert_snapshot;

    #[test]
    fn test_format_estimates_empty() {
        assert_snapshot!(format_estimates(&[]), @r"
        No estimates.

        Hint: Run 'est estimate add <title> <total>' to add one.
        ");
    }

    #[test]
    fn test_format_estimates_lists_balances() {
        let schedule = schedule();
        let rows = rows(&schedule).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].balance.manual, est_core::Effort::from_hours(3));

        assert_snapshot!(format_estimates(&rows), @r"
        ID        Title                     Total  Allocated   Pinned  Unallocated  Start       Parent
        ────────  ──────────────────────  ───────  ─────────  ───────  ───────────  ──────────  ────────
        a1b2c3d4  Design doc                  10h        10h       3h           0h  2025-01-06  -
        e5f6a7b8  Review                       4h         4h       0h           0h  2025-01-06  a1b2c3d4
        ");
    }

    #[test]
    fn test_format_detail() {
        let schedule = schedule();
        let design = EstimateId::new(DESIGN_ID).unwrap();
        let detail = detail(&schedule, &design).unwrap();
        assert_eq!(detail.splits.len(), 1);
        assert_eq!(detail.splits[0].as_str(), REVIEW_ID);

        assert_snapshot!(format_detail(&detail), @r"
        a1b2c3d4 Design doc
          ID:          a1b2c3d4-0000-4000-8000-000000000001
          Total:       10h
          Start:       2025-01-06
          Splits:      e5f6a7b8
          Allocated:   10h (3h pinned)

        ALLOCATION
          Mon 2025-01-06       3h  pinned
          Tue 2025-01-07       7h

        ACTUALS
          Mon 2025-01-06   2h 30m
        ");
    }

    #[test]
    fn test_detail_json_is_flat() {
        let schedule = schedule();
        let review = EstimateId::new(REVIEW_ID).unwrap();
        let detail = detail(&schedule, &review).unwrap();
        let json: serde_json::Value = serde_json::to_value(&detail).unwrap();

        assert_eq!(json["title"], "Review");
        assert_eq!(json["total"], 240);
        assert_eq!(json["parent_id"], DESIGN_ID);
        assert_eq!(json["balance"]["allocated"], 240);
        assert_eq!(json["allocations"][0]["kind"], "auto");
    }
}
