//! Daily and weekly summary commands.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::Result;
use chrono::{FixedOffset, Utc};

use ft_core::summary::{DailySummary, WeeklySummary, daily_summary, weekly_summary};
use ft_core::types::UserId;
use ft_core::window;
use ft_db::Database;

use crate::commands::format_duration;
use crate::commands::task::format_instant;
use crate::config::Config;

pub fn daily<W: Write>(
    writer: &mut W,
    db: &Database,
    user: &UserId,
    json: bool,
    config: &Config,
) -> Result<()> {
    let offset = window::reference_offset(config.utc_offset_minutes);
    let tasks = db.list_tasks(user)?;
    let sessions = db.list_sessions(user)?;
    let summary = daily_summary(&tasks, &sessions, Utc::now(), offset);

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&summary)?)?;
    } else {
        write!(writer, "{}", format_daily(&summary, offset))?;
    }
    Ok(())
}

pub fn weekly<W: Write>(
    writer: &mut W,
    db: &Database,
    user: &UserId,
    json: bool,
) -> Result<()> {
    let tasks = db.list_tasks(user)?;
    let sessions = db.list_sessions(user)?;
    let summary = weekly_summary(&tasks, &sessions, Utc::now());

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&summary)?)?;
    } else {
        write!(writer, "{}", format_weekly(&summary))?;
    }
    Ok(())
}

/// Renders the daily summary for humans.
pub fn format_daily(summary: &DailySummary, offset: FixedOffset) -> String {
    let mut output = String::new();
    writeln!(output, "TODAY").unwrap();
    writeln!(output, "─────").unwrap();
    writeln!(
        output,
        "Tasks completed:  {} of {}",
        summary.tasks_completed, summary.tasks_total
    )
    .unwrap();
    writeln!(
        output,
        "Focus sessions:   {} ({} focused)",
        summary.sessions_count,
        format_duration(summary.minutes_focused)
    )
    .unwrap();

    writeln!(output).unwrap();
    if summary.upcoming_deadlines.is_empty() {
        writeln!(output, "No upcoming deadlines.").unwrap();
    } else {
        writeln!(output, "Upcoming deadlines:").unwrap();
        for task in &summary.upcoming_deadlines {
            // Filtered on deadline, so it is always present here.
            let due = task
                .deadline
                .map(|deadline| format_instant(deadline, offset))
                .unwrap_or_default();
            writeln!(output, "  {}  due {due}", task.title).unwrap();
        }
    }
    output
}

/// Renders the weekly summary for humans.
pub fn format_weekly(summary: &WeeklySummary) -> String {
    let mut output = String::new();
    writeln!(output, "THIS WEEK").unwrap();
    writeln!(output, "─────────").unwrap();
    writeln!(
        output,
        "Focus time:       {} over {} sessions",
        format_duration(summary.minutes_focused),
        summary.sessions_count
    )
    .unwrap();
    writeln!(
        output,
        "Tasks:            {} created, {} completed ({}%)",
        summary.tasks_created, summary.tasks_completed, summary.completion_rate
    )
    .unwrap();
    if let Some(most_active) = summary.most_active_project {
        writeln!(
            output,
            "Most active:      {} ({} sessions)",
            most_active.project, most_active.sessions
        )
        .unwrap();
    }
    if let Some(rating) = summary.average_rating {
        writeln!(output, "Average rating:   {rating:.1}").unwrap();
    }
    output
}
