//! Capacity block commands: `est block add|rm|list`.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use est_core::{BlockKind, CapacityBlock, Intent, Outcome};

use super::util::{parse_date, parse_effort, short_id, truncate};
use crate::workspace::Workspace;

pub fn add<W: Write>(
    writer: &mut W,
    workspace: &mut Workspace,
    date: &str,
    amount: Option<&str>,
    kind: &str,
    note: Option<&str>,
) -> Result<()> {
    let date = parse_date(date, workspace.today())?;
    let kind: BlockKind = kind.parse()?;
    let amount = match amount {
        Some(amount) => parse_effort(amount)?,
        None => workspace.state().calendar().workday_capacity,
    };

    let outcome = workspace.apply(Intent::AddCapacityBlock {
        date,
        kind,
        amount,
        note: note.map(String::from),
    })?;
    let Outcome::BlockAdded(id) = outcome else {
        anyhow::bail!("unexpected outcome: {outcome:?}");
    };
    writeln!(
        writer,
        "Added {kind} block {} ({amount} on {})",
        short_id(id.as_str()),
        date.format("%Y-%m-%d")
    )?;
    Ok(())
}

pub fn remove<W: Write>(writer: &mut W, workspace: &mut Workspace, id: &str) -> Result<()> {
    let id = workspace.resolve_block(id)?;
    let outcome = workspace.apply(Intent::RemoveCapacityBlock { id })?;
    if let Outcome::BlockRemoved(block) = outcome {
        writeln!(
            writer,
            "Removed {} block {} on {}",
            block.kind,
            short_id(block.id.as_str()),
            block.date.format("%Y-%m-%d")
        )?;
    }
    Ok(())
}

/// Format capacity blocks for human-readable output.
pub fn format_blocks(blocks: &[CapacityBlock]) -> String {
    let mut output = String::new();

    if blocks.is_empty() {
        writeln!(output, "No vacation or other-work blocks.").unwrap();
        return output;
    }

    writeln!(
        output,
        "{:<8}  {:<14}  {:<10}  {:>7}  Note",
        "ID", "Date", "Kind", "Amount"
    )
    .unwrap();
    writeln!(
        output,
        "────────  ──────────────  ──────────  ───────  ────────────────────"
    )
    .unwrap();
    for block in blocks {
        let line = format!(
            "{:<8}  {:<14}  {:<10}  {:>7}  {}",
            short_id(block.id.as_str()),
            block.date.format("%a %Y-%m-%d").to_string(),
            block.kind.as_str(),
            block.amount.to_string(),
            truncate(block.note.as_deref().unwrap_or(""), 20),
        );
        writeln!(output, "{}", line.trim_end()).unwrap();
    }

    output
}

pub fn list<W: Write>(writer: &mut W, workspace: &Workspace, json: bool) -> Result<()> {
    let blocks = workspace.state().capacity_blocks();
    if json {
        let output =
            serde_json::to_string_pretty(blocks).context("failed to serialize capacity blocks")?;
        writeln!(writer, "{output}")?;
    } else {
        write!(writer, "{}", format_blocks(blocks))?;
    }
    Ok(())
}
