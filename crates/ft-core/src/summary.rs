//! Daily and weekly summary aggregation.
//!
//! Every function here is a pure reduction over record snapshots and a
//! caller-supplied `now`; nothing is incrementally maintained. Active
//! sessions contribute zero minutes until they end — unfinished work earns
//! no partial credit in any total.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::Serialize;

use crate::session::FocusSession;
use crate::task::{Project, Task};
use crate::window::TimeWindow;

/// How many upcoming deadlines a daily summary lists.
pub const UPCOMING_DEADLINE_LIMIT: usize = 5;

/// How far ahead a deadline counts as upcoming.
pub const UPCOMING_DEADLINE_HORIZON_DAYS: i64 = 3;

/// One day's activity at a glance.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DailySummary {
    /// Tasks completed today (by completion instant).
    pub tasks_completed: usize,
    /// Tasks of today: created today or due today.
    pub tasks_total: usize,
    /// Sessions started today, active ones included.
    pub sessions_count: usize,
    /// Minutes from today's ended sessions.
    pub minutes_focused: i64,
    /// Up to five incomplete tasks due within three days, soonest first.
    pub upcoming_deadlines: Vec<Task>,
}

/// Trailing seven-day activity.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WeeklySummary {
    pub minutes_focused: i64,
    pub sessions_count: usize,
    pub tasks_created: usize,
    pub tasks_completed: usize,
    /// Percentage of created tasks completed, in `[0, 100]`; 0 when nothing
    /// was created this week.
    pub completion_rate: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_active_project: Option<MostActiveProject>,
    /// Mean rating over this week's rated sessions, one decimal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_rating: Option<f64>,
}

/// The project with the most sessions this week.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct MostActiveProject {
    pub project: Project,
    pub sessions: usize,
}

/// Computes the summary for the day containing `now` in the reference offset.
#[must_use]
pub fn daily_summary(
    tasks: &[Task],
    sessions: &[FocusSession],
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> DailySummary {
    let window = TimeWindow::day_of(now, offset);

    let tasks_completed = tasks
        .iter()
        .filter(|task| task.completed_at.is_some_and(|at| window.contains(at)))
        .count();

    // A task is "of today" if created today or due today, not both.
    let tasks_total = tasks
        .iter()
        .filter(|task| {
            window.contains(task.created_at)
                || task.deadline.is_some_and(|deadline| window.contains(deadline))
        })
        .count();

    let todays_sessions: Vec<&FocusSession> = sessions
        .iter()
        .filter(|session| window.contains(session.started_at))
        .collect();
    let minutes_focused = ended_minutes(todays_sessions.iter().copied());

    let horizon = now + Duration::days(UPCOMING_DEADLINE_HORIZON_DAYS);
    let mut upcoming: Vec<Task> = tasks
        .iter()
        .filter(|task| !task.completed)
        .filter(|task| {
            task.deadline
                .is_some_and(|deadline| deadline >= now && deadline <= horizon)
        })
        .cloned()
        .collect();
    upcoming.sort_by_key(|task| task.deadline);
    upcoming.truncate(UPCOMING_DEADLINE_LIMIT);

    DailySummary {
        tasks_completed,
        tasks_total,
        sessions_count: todays_sessions.len(),
        minutes_focused,
        upcoming_deadlines: upcoming,
    }
}

/// Computes the trailing-week summary ending at `now`.
#[must_use]
pub fn weekly_summary(
    tasks: &[Task],
    sessions: &[FocusSession],
    now: DateTime<Utc>,
) -> WeeklySummary {
    let window = TimeWindow::trailing_days(now, 7);

    let weekly_sessions: Vec<&FocusSession> = sessions
        .iter()
        .filter(|session| window.contains(session.started_at))
        .collect();

    let minutes_focused = ended_minutes(weekly_sessions.iter().copied());

    let tasks_created = tasks
        .iter()
        .filter(|task| window.contains(task.created_at))
        .count();
    let tasks_completed = tasks
        .iter()
        .filter(|task| task.completed_at.is_some_and(|at| window.contains(at)))
        .count();

    WeeklySummary {
        minutes_focused,
        sessions_count: weekly_sessions.len(),
        tasks_created,
        tasks_completed,
        completion_rate: completion_rate(tasks_completed, tasks_created),
        most_active_project: most_active_project(&weekly_sessions),
        average_rating: average_rating(&weekly_sessions),
    }
}

/// Total minutes over ended sessions; active sessions contribute nothing.
pub(crate) fn ended_minutes<'a>(sessions: impl Iterator<Item = &'a FocusSession>) -> i64 {
    sessions
        .filter_map(FocusSession::duration_minutes)
        .sum()
}

/// Percentage of created tasks completed, rounded; 0 when none were created.
///
/// Clamped to 100: tasks created before the window can be completed inside
/// it, pushing the raw ratio past one.
#[expect(clippy::cast_possible_truncation, reason = "clamped to 100")]
pub(crate) fn completion_rate(completed: usize, created: usize) -> u8 {
    if created == 0 {
        return 0;
    }
    let rate = (100 * completed + created / 2) / created;
    rate.min(100) as u8
}

/// The project with the highest session count; ties break to the
/// lexicographically first project name.
fn most_active_project(sessions: &[&FocusSession]) -> Option<MostActiveProject> {
    let mut counts: Vec<(Project, usize)> = Vec::new();
    for session in sessions {
        match counts.iter_mut().find(|(project, _)| *project == session.project) {
            Some((_, count)) => *count += 1,
            None => counts.push((session.project, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
    counts
        .first()
        .map(|&(project, sessions)| MostActiveProject { project, sessions })
}

/// Mean rating over rated sessions, rounded to one decimal.
fn average_rating(sessions: &[&FocusSession]) -> Option<f64> {
    let ratings: Vec<i64> = sessions
        .iter()
        .filter_map(|session| session.rating.map(i64::from))
        .collect();
    if ratings.is_empty() {
        return None;
    }
    #[expect(clippy::cast_precision_loss, reason = "rating sums are tiny")]
    let mean = ratings.iter().sum::<i64>() as f64 / ratings.len() as f64;
    Some((mean * 10.0).round() / 10.0)
}
