use std::io::{self, Write};

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use est_cli::commands::{actual, allocation, block, estimate, grid, history, report, transfer, util};
use est_cli::{BlockAction, Cli, Commands, Config, EstimateAction, Workspace};

/// Load config and open the workspace it points at.
fn open_workspace(cli: &Cli) -> Result<Workspace> {
    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let today = cli
        .today
        .as_deref()
        .map(|s| util::parse_date(s, Local::now().date_naive()))
        .transpose()
        .context("invalid --today")?;
    Workspace::open(&config, today)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        // No subcommand, show help
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let mut workspace = open_workspace(&cli)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let ws = &mut workspace;

    match command {
        Commands::Estimate(action) => match action {
            EstimateAction::Add {
                title,
                total,
                start,
            } => estimate::add(&mut out, ws, title, total, start.as_deref())?,
            EstimateAction::Edit {
                id,
                title,
                total,
                start,
            } => estimate::edit(
                &mut out,
                ws,
                id,
                title.as_deref(),
                total.as_deref(),
                start.as_deref(),
            )?,
            EstimateAction::Rm { id, force } => estimate::remove(&mut out, ws, id, *force)?,
            EstimateAction::List { json } => estimate::list(&mut out, ws, *json)?,
        },
        Commands::Show { id, json } => estimate::show(&mut out, ws, id, *json)?,
        Commands::Allocate { id, from } => allocation::allocate(&mut out, ws, id, from.as_deref())?,
        Commands::Pin {
            id,
            date,
            amount,
            clamp,
        } => allocation::pin(&mut out, ws, id, date, amount, *clamp)?,
        Commands::Unpin { id, date } => allocation::unpin(&mut out, ws, id, date)?,
        Commands::Split { id, amount, title } => {
            allocation::split(&mut out, ws, id, amount, title.as_deref())?;
        }
        Commands::Merge { parent, child } => allocation::merge(&mut out, ws, parent, child)?,
        Commands::Recompute { from } => allocation::recompute(&mut out, ws, from.as_deref())?,
        Commands::Block(action) => match action {
            BlockAction::Add {
                date,
                amount,
                kind,
                note,
            } => block::add(&mut out, ws, date, amount.as_deref(), kind, note.as_deref())?,
            BlockAction::Rm { id } => block::remove(&mut out, ws, id)?,
            BlockAction::List { json } => block::list(&mut out, ws, *json)?,
        },
        Commands::Actual {
            id,
            date,
            amount,
            add,
        } => actual::run(&mut out, ws, id, date, amount, *add)?,
        Commands::Grid { from, days, json } => {
            if *json {
                grid::run_json(&mut out, ws, from.as_deref(), *days)?;
            } else {
                grid::run(&mut out, ws, from.as_deref(), *days)?;
            }
        }
        Commands::Report { through, json } => report::run(&mut out, ws, through.as_deref(), *json)?,
        Commands::Undo => history::undo(&mut out, ws)?,
        Commands::Redo => history::redo(&mut out, ws)?,
        Commands::History { json } => history::list(&mut out, ws, *json)?,
        Commands::Export => transfer::export(&mut out, ws)?,
        Commands::Import { file } => transfer::import(&mut out, ws, file)?,
    }

    out.flush()?;
    Ok(())
}
