//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};

use ft_core::session::FocusMode;
use ft_core::task::{Project, TaskKind};

/// Personal focus tracker.
///
/// Tracks tasks and timed focus sessions, and derives daily/weekly
/// summaries, streaks, and suggestions from them.
#[derive(Debug, Parser)]
#[command(name = "ft", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Act as this user instead of the configured one.
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage tasks.
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// Manage focus sessions.
    Focus {
        #[command(subcommand)]
        action: FocusAction,
    },

    /// Show daily or weekly summaries.
    Summary {
        #[command(subcommand)]
        period: SummaryPeriod,
    },

    /// Show weekly insights: streaks, averages, and suggestions.
    Insights {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the activity timeline, grouped by day.
    Timeline {
        /// Time range to show.
        #[arg(long, value_enum, default_value_t = TimelineRange::Week)]
        range: TimelineRange,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Task subcommands.
#[derive(Debug, Subcommand)]
pub enum TaskAction {
    /// Create a task.
    Add {
        /// Task title.
        title: String,

        /// Optional longer description.
        #[arg(long)]
        description: Option<String>,

        /// Project the task belongs to.
        #[arg(long, default_value = "Personal")]
        project: Project,

        /// Kind of work.
        #[arg(long, default_value = "study")]
        kind: TaskKind,

        /// Deadline as an RFC 3339 timestamp (e.g. 2026-02-05T18:00:00Z).
        #[arg(long)]
        deadline: Option<DateTime<Utc>>,
    },

    /// List tasks.
    List {
        /// Which tasks to show.
        #[arg(long, value_enum, default_value_t = TaskScope::All)]
        scope: TaskScope,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Edit a task's fields.
    Edit {
        /// Task ID.
        id: String,

        /// New title.
        #[arg(long)]
        title: Option<String>,

        /// New description.
        #[arg(long)]
        description: Option<String>,

        /// New project.
        #[arg(long)]
        project: Option<Project>,

        /// New kind.
        #[arg(long)]
        kind: Option<TaskKind>,

        /// New deadline as an RFC 3339 timestamp.
        #[arg(long, conflicts_with = "clear_deadline")]
        deadline: Option<DateTime<Utc>>,

        /// Remove the deadline.
        #[arg(long)]
        clear_deadline: bool,
    },

    /// Toggle a task's completion.
    Done {
        /// Task ID.
        id: String,
    },

    /// Delete a task.
    Delete {
        /// Task ID.
        id: String,
    },
}

/// Focus session subcommands.
#[derive(Debug, Subcommand)]
pub enum FocusAction {
    /// Start a focus session. Fails while another session is active.
    Start {
        /// Focus mode.
        #[arg(long, default_value = "study")]
        mode: FocusMode,

        /// Project to focus on.
        #[arg(long, default_value = "Personal")]
        project: Project,

        /// Planned length in minutes.
        #[arg(long)]
        planned: Option<u32>,
    },

    /// End the active focus session.
    End {
        /// Session ID; defaults to the active session.
        #[arg(long)]
        id: Option<String>,

        /// Rate the session from 1 to 5.
        #[arg(long)]
        rating: Option<i64>,

        /// Attach a note.
        #[arg(long)]
        note: Option<String>,
    },

    /// Show the active session, if any.
    Active,

    /// List sessions in a range.
    List {
        /// Time range to show.
        #[arg(long, value_enum, default_value_t = SessionRange::Week)]
        range: SessionRange,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Summary periods.
#[derive(Debug, Subcommand)]
pub enum SummaryPeriod {
    /// Today's summary.
    Daily {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Trailing-week summary.
    Weekly {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Task list scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TaskScope {
    /// All tasks.
    All,
    /// Tasks created today or due today.
    Today,
    /// Tasks due within the next seven days.
    Week,
}

/// Session list ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SessionRange {
    /// Sessions started today.
    Today,
    /// Sessions started in the trailing seven days.
    Week,
}

/// Timeline ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TimelineRange {
    /// Today's events.
    Today,
    /// The trailing seven days.
    Week,
    /// The trailing thirty days.
    Month,
}
