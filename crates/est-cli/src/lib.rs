//! Work estimator CLI library.
//!
//! This crate provides the CLI interface for the work estimator.

mod cli;
pub mod commands;
mod config;
pub mod workspace;

pub use cli::{BlockAction, Cli, Commands, EstimateAction};
pub use config::Config;
pub use workspace::Workspace;
