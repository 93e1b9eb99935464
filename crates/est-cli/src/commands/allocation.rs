//! Allocation commands: `est allocate`, `pin`, `unpin`, `split`, `merge`
//! and `recompute`.

use std::io::Write;

use anyhow::Result;
use est_core::{Intent, Outcome, PinMode};

use super::estimate::warn_shortfall;
use super::util::{parse_date, parse_effort, short_id};
use crate::workspace::Workspace;

/// Prints the total effort left unallocated after a pass, if any.
fn report_unallocated<W: Write>(writer: &mut W, outcome: &Outcome) -> Result<()> {
    if let Outcome::Allocated(unallocated) = outcome {
        if !unallocated.is_zero() {
            writeln!(
                writer,
                "Warning: {unallocated} could not be allocated within the horizon."
            )?;
        }
    }
    Ok(())
}

pub fn allocate<W: Write>(
    writer: &mut W,
    workspace: &mut Workspace,
    id: &str,
    from: Option<&str>,
) -> Result<()> {
    let id = workspace.resolve_estimate(id)?;
    let from = from.map(|s| parse_date(s, workspace.today())).transpose()?;
    let outcome = workspace.apply(Intent::Allocate {
        id: id.clone(),
        from,
    })?;
    writeln!(writer, "Allocated {}", short_id(id.as_str()))?;
    report_unallocated(writer, &outcome)
}

pub fn recompute<W: Write>(
    writer: &mut W,
    workspace: &mut Workspace,
    from: Option<&str>,
) -> Result<()> {
    let from = match from {
        Some(s) => parse_date(s, workspace.today())?,
        None => workspace.today(),
    };
    let outcome = workspace.apply(Intent::Recompute { from })?;
    writeln!(writer, "Recomputed allocation from {}", from.format("%Y-%m-%d"))?;
    report_unallocated(writer, &outcome)
}

pub fn pin<W: Write>(
    writer: &mut W,
    workspace: &mut Workspace,
    id: &str,
    date: &str,
    amount: &str,
    clamp: bool,
) -> Result<()> {
    let id = workspace.resolve_estimate(id)?;
    let date = parse_date(date, workspace.today())?;
    let requested = parse_effort(amount)?;
    let mode = if clamp { PinMode::Clamp } else { PinMode::Strict };

    let outcome = workspace.apply(Intent::Pin {
        id: id.clone(),
        date,
        amount: requested,
        mode,
    })?;
    if let Outcome::Pinned(pinned) = outcome {
        write!(
            writer,
            "Pinned {pinned} of {} on {}",
            short_id(id.as_str()),
            date.format("%Y-%m-%d")
        )?;
        if pinned < requested {
            write!(writer, " (clamped from {requested})")?;
        }
        writeln!(writer)?;
    }
    warn_shortfall(writer, workspace.state(), &id)
}

pub fn unpin<W: Write>(
    writer: &mut W,
    workspace: &mut Workspace,
    id: &str,
    date: &str,
) -> Result<()> {
    let id = workspace.resolve_estimate(id)?;
    let date = parse_date(date, workspace.today())?;
    workspace.apply(Intent::Unpin {
        id: id.clone(),
        date,
    })?;
    writeln!(
        writer,
        "Unpinned {} on {}",
        short_id(id.as_str()),
        date.format("%Y-%m-%d")
    )?;
    Ok(())
}

pub fn split<W: Write>(
    writer: &mut W,
    workspace: &mut Workspace,
    id: &str,
    amount: &str,
    title: Option<&str>,
) -> Result<()> {
    let id = workspace.resolve_estimate(id)?;
    let amount = parse_effort(amount)?;
    let outcome = workspace.apply(Intent::Split {
        id: id.clone(),
        amount,
        title: title.map(String::from),
    })?;
    let Outcome::EstimateSplit(child) = outcome else {
        anyhow::bail!("unexpected outcome: {outcome:?}");
    };
    writeln!(
        writer,
        "Split {amount} off {} into {}",
        short_id(id.as_str()),
        short_id(child.as_str())
    )?;
    warn_shortfall(writer, workspace.state(), &child)
}

pub fn merge<W: Write>(
    writer: &mut W,
    workspace: &mut Workspace,
    parent: &str,
    child: &str,
) -> Result<()> {
    let parent_id = workspace.resolve_estimate(parent)?;
    let child_id = workspace.resolve_estimate(child)?;
    workspace.apply(Intent::Merge {
        parent_id: parent_id.clone(),
        child_id: child_id.clone(),
    })?;
    writeln!(
        writer,
        "Merged {} into {}",
        short_id(child_id.as_str()),
        short_id(parent_id.as_str())
    )?;
    Ok(())
}
