//! Timeline command: the activity log grouped by day.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::Result;
use chrono::{FixedOffset, Utc};

use ft_core::timeline::{DayGroup, TimelineEvent, TimelineEventKind, group_by_day};
use ft_core::types::UserId;
use ft_core::window::{self, TimeWindow};
use ft_db::Database;

use crate::cli::TimelineRange;
use crate::config::Config;

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    user: &UserId,
    range: TimelineRange,
    json: bool,
    config: &Config,
) -> Result<()> {
    let now = Utc::now();
    let offset = window::reference_offset(config.utc_offset_minutes);
    let time_window = match range {
        TimelineRange::Today => TimeWindow::day_of(now, offset),
        TimelineRange::Week => TimeWindow::trailing_days(now, 7),
        TimelineRange::Month => TimeWindow::trailing_days(now, 30),
    };
    let events = db.list_events_in(user, time_window)?;
    let groups = group_by_day(events, offset);

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&groups)?)?;
    } else {
        write!(writer, "{}", format_timeline(&groups, offset))?;
    }
    Ok(())
}

/// Renders day groups: one dated header per day, events beneath it.
pub fn format_timeline(groups: &[DayGroup], offset: FixedOffset) -> String {
    if groups.is_empty() {
        return "No activity in this range.\n".to_string();
    }
    let mut output = String::new();
    for (i, group) in groups.iter().enumerate() {
        if i > 0 {
            writeln!(output).unwrap();
        }
        writeln!(output, "{}", group.day.format("%Y-%m-%d")).unwrap();
        for event in &group.events {
            let time = event.created_at.with_timezone(&offset).format("%H:%M");
            writeln!(output, "  {time}  {}", describe(event)).unwrap();
        }
    }
    output
}

/// One-line description of an event from its kind and frozen metadata.
fn describe(event: &TimelineEvent) -> String {
    let meta = &event.metadata;
    let title = meta["title"].as_str().unwrap_or("?");
    let project = meta["project"].as_str().unwrap_or("?");
    match event.kind {
        TimelineEventKind::TaskCreated => {
            let kind = meta["type"].as_str().unwrap_or("?");
            format!("Created task: {title} ({project}/{kind})")
        }
        TimelineEventKind::TaskCompleted => format!("Completed task: {title} ({project})"),
        TimelineEventKind::TaskDeleted => format!("Deleted task: {title} ({project})"),
        TimelineEventKind::FocusStarted => {
            let mode = meta["mode"].as_str().unwrap_or("?");
            match meta["planned_minutes"].as_i64() {
                Some(planned) => {
                    format!("Started {mode} session on {project} ({planned} min planned)")
                }
                None => format!("Started {mode} session on {project}"),
            }
        }
        TimelineEventKind::FocusEnded => {
            let mode = meta["mode"].as_str().unwrap_or("?");
            let minutes = meta["actual_minutes"].as_i64().unwrap_or(0);
            match meta["rating"].as_i64() {
                Some(rating) => {
                    format!("Finished {mode} session on {project} ({minutes} min, rated {rating}/5)")
                }
                None => format!("Finished {mode} session on {project} ({minutes} min)"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ft_core::types::EventId;
    use insta::assert_snapshot;
    use serde_json::json;

    fn event(kind: TimelineEventKind, created_at: &str, metadata: serde_json::Value) -> TimelineEvent {
        TimelineEvent {
            id: EventId::new(format!("event-{created_at}")).unwrap(),
            user_id: UserId::new("sami").unwrap(),
            kind,
            created_at: created_at.parse().unwrap(),
            metadata,
        }
    }

    #[test]
    fn formats_grouped_days_newest_first() {
        let events = vec![
            event(
                TimelineEventKind::TaskCreated,
                "2026-02-02T09:00:00Z",
                json!({"title": "write summary", "project": "Personal", "type": "code"}),
            ),
            event(
                TimelineEventKind::FocusStarted,
                "2026-02-03T10:00:00Z",
                json!({"mode": "coding", "project": "Oureon", "planned_minutes": 45}),
            ),
            event(
                TimelineEventKind::FocusEnded,
                "2026-02-03T10:45:00Z",
                json!({"mode": "coding", "project": "Oureon", "actual_minutes": 45, "rating": 4}),
            ),
        ];
        let groups = group_by_day(events, window::utc());
        assert_snapshot!(format_timeline(&groups, window::utc()).trim_end(), @r"
        2026-02-03
          10:00  Started coding session on Oureon (45 min planned)
          10:45  Finished coding session on Oureon (45 min, rated 4/5)

        2026-02-02
          09:00  Created task: write summary (Personal/code)
        ");
    }

    #[test]
    fn empty_timeline_has_placeholder() {
        assert_eq!(
            format_timeline(&[], window::utc()),
            "No activity in this range.\n"
        );
    }

    #[test]
    fn describes_deleted_task_from_frozen_metadata() {
        let event = event(
            TimelineEventKind::TaskDeleted,
            "2026-02-03T09:00:00Z",
            json!({"title": "scrapped idea", "project": "GA"}),
        );
        assert_eq!(describe(&event), "Deleted task: scrapped idea (GA)");
    }

    #[test]
    fn run_groups_database_events() {
        let mut db = Database::open_in_memory().unwrap();
        let sami = UserId::new("sami").unwrap();
        let config = Config::default();

        let task = db
            .create_task(
                &sami,
                &ft_core::task::NewTask {
                    title: "trace the timeline".to_string(),
                    description: None,
                    project: ft_core::task::Project::Personal,
                    kind: ft_core::task::TaskKind::Code,
                    deadline: None,
                },
            )
            .unwrap();
        db.delete_task(&sami, &task.id).unwrap();

        let mut output = Vec::new();
        run(&mut output, &db, &sami, TimelineRange::Today, false, &config).unwrap();
        let printed = String::from_utf8(output).unwrap();
        assert!(printed.contains("Created task: trace the timeline"));
        assert!(printed.contains("Deleted task: trace the timeline"));
    }
}
