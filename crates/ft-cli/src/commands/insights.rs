//! Weekly insights command: streaks, averages, and suggestions.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::Result;
use chrono::Utc;

use ft_core::insights::{WeeklyInsights, weekly_insights};
use ft_core::types::UserId;
use ft_core::window;
use ft_db::Database;

use crate::commands::format_duration;
use crate::config::Config;

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    user: &UserId,
    json: bool,
    config: &Config,
) -> Result<()> {
    let offset = window::reference_offset(config.utc_offset_minutes);
    let tasks = db.list_tasks(user)?;
    let sessions = db.list_sessions(user)?;
    let insights = weekly_insights(
        &tasks,
        &sessions,
        Utc::now(),
        offset,
        config.max_suggestions,
    );

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&insights)?)?;
    } else {
        write!(writer, "{}", format_insights(&insights))?;
    }
    Ok(())
}

/// Renders the weekly insights for humans.
pub fn format_insights(insights: &WeeklyInsights) -> String {
    let mut output = String::new();
    writeln!(output, "WEEKLY INSIGHTS").unwrap();
    writeln!(output, "───────────────").unwrap();
    writeln!(
        output,
        "Focus time:       {:.1}h over {} sessions (avg {})",
        insights.total_focus_hours,
        insights.sessions_count,
        format_duration(insights.avg_session_duration)
    )
    .unwrap();
    writeln!(
        output,
        "Days with focus:  {} of 7",
        insights.days_with_focus
    )
    .unwrap();
    match insights.streak {
        0 => writeln!(output, "Streak:           none").unwrap(),
        1 => writeln!(output, "Streak:           1 day").unwrap(),
        days => writeln!(output, "Streak:           {days} days").unwrap(),
    }
    writeln!(
        output,
        "Tasks:            {} created, {} completed ({}%)",
        insights.tasks_created, insights.tasks_completed, insights.completion_rate
    )
    .unwrap();
    if let Some(project) = insights.most_active_project {
        writeln!(output, "Most active:      {project}").unwrap();
    }
    if let Some(rating) = insights.avg_session_rating {
        writeln!(output, "Average rating:   {rating:.1}").unwrap();
    }

    if !insights.suggestions.is_empty() {
        writeln!(output).unwrap();
        writeln!(output, "Suggestions:").unwrap();
        for suggestion in &insights.suggestions {
            writeln!(output, "  - {suggestion}").unwrap();
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use ft_core::task::Project;
    use insta::assert_snapshot;

    #[test]
    fn format_insights_renders_all_sections() {
        let insights = WeeklyInsights {
            total_focus_hours: 5.3,
            sessions_count: 8,
            avg_session_duration: 40,
            tasks_created: 6,
            tasks_completed: 4,
            completion_rate: 67,
            most_active_project: Some(Project::Poly),
            days_with_focus: 5,
            avg_session_rating: Some(4.2),
            streak: 3,
            suggestions: vec!["You have a multi-day streak going.".to_string()],
        };
        assert_snapshot!(format_insights(&insights).trim_end(), @r"
        WEEKLY INSIGHTS
        ───────────────
        Focus time:       5.3h over 8 sessions (avg 40m)
        Days with focus:  5 of 7
        Streak:           3 days
        Tasks:            6 created, 4 completed (67%)
        Most active:      Poly
        Average rating:   4.2

        Suggestions:
          - You have a multi-day streak going.
        ");
    }

    #[test]
    fn format_insights_empty_week() {
        let insights = WeeklyInsights {
            total_focus_hours: 0.0,
            sessions_count: 0,
            avg_session_duration: 0,
            tasks_created: 0,
            tasks_completed: 0,
            completion_rate: 0,
            most_active_project: None,
            days_with_focus: 0,
            avg_session_rating: None,
            streak: 0,
            suggestions: vec![],
        };
        let output = format_insights(&insights);
        assert!(output.contains("Streak:           none"));
        assert!(!output.contains("Most active"));
        assert!(!output.contains("Suggestions"));
    }

    #[test]
    fn run_on_empty_database_suggests_consistency() {
        let db = Database::open_in_memory().unwrap();
        let sami = UserId::new("sami").unwrap();
        let config = Config::default();

        let mut output = Vec::new();
        run(&mut output, &db, &sami, false, &config).unwrap();
        let printed = String::from_utf8(output).unwrap();
        assert!(printed.contains("consistency"));
    }
}
