//! `est actual`: record effort actually spent.

use std::io::Write;

use anyhow::Result;
use est_core::{Intent, Outcome};

use super::util::{parse_date, parse_effort, short_id};
use crate::workspace::Workspace;

pub fn run<W: Write>(
    writer: &mut W,
    workspace: &mut Workspace,
    id: &str,
    date: &str,
    amount: &str,
    accumulate: bool,
) -> Result<()> {
    let id = workspace.resolve_estimate(id)?;
    let date = parse_date(date, workspace.today())?;
    let amount = parse_effort(amount)?;

    let outcome = workspace.apply(Intent::RecordActual {
        id: id.clone(),
        date,
        amount,
        accumulate,
    })?;
    if let Outcome::ActualRecorded(recorded) = outcome {
        writeln!(
            writer,
            "Recorded {recorded} on {} for {}",
            date.format("%Y-%m-%d"),
            short_id(id.as_str())
        )?;
    }
    Ok(())
}
