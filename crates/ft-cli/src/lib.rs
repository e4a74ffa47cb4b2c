//! Focus tracker CLI library.
//!
//! This crate provides the CLI interface for the focus tracker.

mod cli;
pub mod commands;
mod config;

pub use cli::{
    Cli, Commands, FocusAction, SessionRange, SummaryPeriod, TaskAction, TaskScope, TimelineRange,
};
pub use config::Config;
