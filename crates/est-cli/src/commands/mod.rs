//! CLI subcommand implementations.

pub mod actual;
pub mod allocation;
pub mod block;
pub mod estimate;
pub mod grid;
pub mod history;
pub mod report;
pub mod transfer;
pub mod util;
