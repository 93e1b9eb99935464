//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Work estimation and scheduling.
///
/// Spreads estimated effort over working days, keeps pinned days fixed and
/// compares the plan against the effort actually spent.
#[derive(Debug, Parser)]
#[command(name = "est", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Treat this date as today (YYYY-MM-DD, +Nd, -Nd, ...).
    #[arg(long, global = true)]
    pub today: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage estimates.
    #[command(subcommand)]
    Estimate(EstimateAction),

    /// Show an estimate with its allocation and actuals.
    Show {
        /// Estimate ID or unique ID prefix.
        id: String,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Re-allocate one estimate from a date.
    Allocate {
        /// Estimate ID or unique ID prefix.
        id: String,

        /// First date to allocate on (default: today).
        #[arg(long)]
        from: Option<String>,
    },

    /// Pin an amount of an estimate to a date.
    Pin {
        /// Estimate ID or unique ID prefix.
        id: String,

        /// Date to pin.
        date: String,

        /// Amount to pin (e.g., 3h, 90m).
        amount: String,

        /// Reduce the amount to what fits instead of failing.
        #[arg(long)]
        clamp: bool,
    },

    /// Return a pinned date to automatic allocation.
    Unpin {
        /// Estimate ID or unique ID prefix.
        id: String,

        /// Pinned date.
        date: String,
    },

    /// Split part of an estimate into a new estimate.
    Split {
        /// Estimate ID or unique ID prefix.
        id: String,

        /// Amount to move to the new estimate.
        amount: String,

        /// Title of the new estimate (default: "<title> (split)").
        #[arg(long)]
        title: Option<String>,
    },

    /// Fold a split estimate back into the estimate it came from.
    Merge {
        /// Parent estimate ID or prefix.
        parent: String,

        /// Child estimate ID or prefix.
        child: String,
    },

    /// Re-run allocation of every estimate from a date.
    Recompute {
        /// First date to re-flow (default: today).
        #[arg(long)]
        from: Option<String>,
    },

    /// Manage vacation and other-work blocks.
    #[command(subcommand)]
    Block(BlockAction),

    /// Record effort actually spent on an estimate.
    Actual {
        /// Estimate ID or unique ID prefix.
        id: String,

        /// Date the effort was spent on.
        date: String,

        /// Amount spent.
        amount: String,

        /// Add to the amount already recorded instead of replacing it.
        #[arg(long)]
        add: bool,
    },

    /// Show allocation per estimate and day.
    Grid {
        /// First date shown (default: today).
        #[arg(long)]
        from: Option<String>,

        /// Number of days shown.
        #[arg(long, default_value = "7")]
        days: u32,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Compare planned and actual effort.
    Report {
        /// Last date included (default: today).
        #[arg(long)]
        through: Option<String>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Revert the latest change.
    Undo,

    /// Re-apply the latest undone change.
    Redo,

    /// List undoable and redoable changes.
    History {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Write the full state as JSON to stdout.
    Export,

    /// Replace the full state with a JSON document (undoable).
    Import {
        /// Path to the document, or "-" for stdin.
        file: PathBuf,
    },
}

/// Estimate subcommands.
#[derive(Debug, Subcommand)]
pub enum EstimateAction {
    /// Add an estimate and allocate it.
    Add {
        /// Title of the estimate.
        title: String,

        /// Total effort (e.g., 10, 10h, 1h30m).
        total: String,

        /// First date effort may be allocated on (default: today).
        #[arg(long)]
        start: Option<String>,
    },

    /// Change an estimate's title, total or start date.
    Edit {
        /// Estimate ID or unique ID prefix.
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        total: Option<String>,

        #[arg(long)]
        start: Option<String>,
    },

    /// Delete an estimate.
    Rm {
        /// Estimate ID or unique ID prefix.
        id: String,

        /// Also delete estimates split from it.
        #[arg(long)]
        force: bool,
    },

    /// List estimates in priority order.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Capacity block subcommands.
#[derive(Debug, Subcommand)]
pub enum BlockAction {
    /// Take time out of a day.
    Add {
        /// Date of the block.
        date: String,

        /// Amount taken out (default: a full working day).
        #[arg(long)]
        amount: Option<String>,

        /// Kind of block: vacation or other-work.
        #[arg(long, default_value = "vacation")]
        kind: String,

        /// Free-form note.
        #[arg(long)]
        note: Option<String>,
    },

    /// Remove a block.
    Rm {
        /// Block ID or unique ID prefix.
        id: String,
    },

    /// List blocks by date.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}
