//! `est export` and `est import`: the whole state as one JSON document.

use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use est_core::{Intent, StateDocument};

use crate::workspace::Workspace;

/// Writes the current state as pretty-printed JSON.
pub fn export<W: Write>(writer: &mut W, workspace: &Workspace) -> Result<()> {
    let document = workspace.state().to_document();
    let output = serde_json::to_string_pretty(&document).context("failed to serialize state")?;
    writeln!(writer, "{output}")?;
    Ok(())
}

/// Replaces the current state with a document read from `path`, or stdin
/// when `path` is `-`.
///
/// The replacement is a single transaction, so `est undo` restores the
/// previous state.
pub fn import<W: Write>(writer: &mut W, workspace: &mut Workspace, path: &Path) -> Result<()> {
    let input = if path == Path::new("-") {
        let mut input = String::new();
        io::stdin()
            .read_to_string(&mut input)
            .context("failed to read stdin")?;
        input
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?
    };
    import_str(writer, workspace, &input)
}

fn import_str<W: Write>(writer: &mut W, workspace: &mut Workspace, input: &str) -> Result<()> {
    let document: StateDocument =
        serde_json::from_str(input).context("input is not a valid state document")?;
    let estimates = document.estimates.len();
    let blocks = document.capacity_blocks.len();

    workspace.apply(Intent::ReplaceState(document))?;
    writeln!(
        writer,
        "Imported {estimates} estimate(s) and {blocks} capacity block(s)"
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use chrono::NaiveDate;
    use est_core::{Effort, Outcome};
    use est_db::Database;

    fn workspace() -> Workspace {
        let today = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        let db = Database::open_in_memory().unwrap();
        Workspace::from_database(db, &Config::default(), Some(today)).unwrap()
    }

    #[test]
    fn test_export_then_import_into_fresh_workspace() {
        let mut source = workspace();
        let Outcome::EstimateAdded(id) = source
            .apply(Intent::AddEstimate {
                title: "Design doc".to_string(),
                total: Effort::from_hours(10),
                start_on: None,
            })
            .unwrap()
        else {
            panic!("add failed");
        };

        let mut exported = Vec::new();
        export(&mut exported, &source).unwrap();

        let mut target = workspace();
        let mut output = Vec::new();
        import_str(&mut output, &mut target, std::str::from_utf8(&exported).unwrap()).unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "Imported 1 estimate(s) and 0 capacity block(s)\n"
        );
        assert_eq!(target.state().to_document(), source.state().to_document());
        assert_eq!(target.state().balance(&id).unwrap().allocated, Effort::from_hours(10));
    }

    #[test]
    fn test_import_is_undoable() {
        let mut target = workspace();
        let mut output = Vec::new();
        import_str(&mut output, &mut target, r#"{"version":1,"estimates":[],"allocations":[],"capacity_blocks":[],"actuals":[]}"#).unwrap();

        assert_eq!(target.undo().as_deref(), Some("import state"));
    }

    #[test]
    fn test_import_rejects_invalid_document_and_keeps_state() {
        let mut target = workspace();
        target
            .apply(Intent::AddEstimate {
                title: "Keep me".to_string(),
                total: Effort::from_hours(1),
                start_on: None,
            })
            .unwrap();

        let input = r#"{
            "version": 1,
            "estimates": [],
            "allocations": [{"estimate_id": "missing", "date": "2025-01-06", "amount_minutes": 60, "kind": "auto"}],
            "capacity_blocks": [],
            "actuals": []
        }"#;
        let mut output = Vec::new();
        assert!(import_str(&mut output, &mut target, input).is_err());
        assert!(import_str(&mut output, &mut target, "not json").is_err());
        assert_eq!(target.state().estimates().len(), 1);
    }
}
