//! Streaks, weekly insights, and rule-based suggestions.
//!
//! Everything here is derived from summary output plus per-day session
//! existence; no raw re-querying, no randomness, no I/O. Suggestions are a
//! fixed decision table evaluated in priority order against a metrics
//! snapshot, so each rule is unit-testable with synthetic inputs.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::Serialize;

use crate::session::FocusSession;
use crate::summary::{self, WeeklySummary};
use crate::task::{Project, Task};
use crate::window::{self, TimeWindow};

/// Default cap on returned suggestions.
pub const DEFAULT_MAX_SUGGESTIONS: usize = 3;

/// Weekly analytics with streaks and suggestions.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WeeklyInsights {
    /// Total ended-session focus time this week, in hours (one decimal).
    pub total_focus_hours: f64,
    pub sessions_count: usize,
    /// Mean ended-session length this week, whole minutes.
    pub avg_session_duration: i64,
    pub tasks_created: usize,
    pub tasks_completed: usize,
    pub completion_rate: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_active_project: Option<Project>,
    /// Distinct days with at least one ended session, 0–7.
    pub days_with_focus: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_session_rating: Option<f64>,
    /// Consecutive days with an ended session, ending today or yesterday.
    pub streak: usize,
    pub suggestions: Vec<String>,
}

/// The metrics snapshot the suggestion rules read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InsightMetrics {
    pub tasks_created: usize,
    pub completion_rate: u8,
    pub days_with_focus: usize,
    pub ended_sessions: usize,
    pub avg_session_duration: i64,
    pub avg_session_rating: Option<f64>,
    pub streak: usize,
}

/// Distinct reference-timezone days in the trailing week with an ended
/// session. A session counts toward the day it started.
#[must_use]
pub fn days_with_focus(
    sessions: &[FocusSession],
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> usize {
    let window = TimeWindow::trailing_days(now, 7);
    let days: BTreeSet<NaiveDate> = sessions
        .iter()
        .filter(|session| !session.is_active())
        .filter(|session| window.contains(session.started_at))
        .map(|session| window::local_day(session.started_at, offset))
        .collect();
    days.len()
}

/// Length of the run of consecutive days with an ended session, anchored at
/// today or yesterday. One day of grace: a streak survives today being empty
/// as long as yesterday was not; two empty days reset it to zero.
#[must_use]
pub fn streak(sessions: &[FocusSession], now: DateTime<Utc>, offset: FixedOffset) -> usize {
    let days: BTreeSet<NaiveDate> = sessions
        .iter()
        .filter(|session| !session.is_active())
        .map(|session| window::local_day(session.started_at, offset))
        .collect();

    let today = window::local_day(now, offset);
    let yesterday = today - Duration::days(1);
    let anchor = if days.contains(&today) {
        today
    } else if days.contains(&yesterday) {
        yesterday
    } else {
        return 0;
    };

    let mut length = 0;
    let mut day = anchor;
    while days.contains(&day) {
        length += 1;
        day -= Duration::days(1);
    }
    length
}

/// Mean duration over ended sessions, rounded to the nearest whole minute;
/// zero when there are none.
#[must_use]
#[expect(clippy::cast_possible_wrap, reason = "session counts are tiny")]
pub fn avg_session_duration(sessions: &[FocusSession]) -> i64 {
    let durations: Vec<i64> = sessions
        .iter()
        .filter_map(FocusSession::duration_minutes)
        .collect();
    if durations.is_empty() {
        return 0;
    }
    let count = durations.len() as i64;
    let sum: i64 = durations.iter().sum();
    (sum + count / 2).div_euclid(count)
}

/// Assembles the full weekly insight view.
#[must_use]
pub fn weekly_insights(
    tasks: &[Task],
    sessions: &[FocusSession],
    now: DateTime<Utc>,
    offset: FixedOffset,
    max_suggestions: usize,
) -> WeeklyInsights {
    let summary = summary::weekly_summary(tasks, sessions, now);

    let window = TimeWindow::trailing_days(now, 7);
    let weekly_sessions: Vec<FocusSession> = sessions
        .iter()
        .filter(|session| window.contains(session.started_at))
        .cloned()
        .collect();
    let ended_sessions = weekly_sessions
        .iter()
        .filter(|session| !session.is_active())
        .count();

    let days_with_focus = days_with_focus(sessions, now, offset);
    let streak = streak(sessions, now, offset);
    let avg_session_duration = avg_session_duration(&weekly_sessions);

    let metrics = InsightMetrics {
        tasks_created: summary.tasks_created,
        completion_rate: summary.completion_rate,
        days_with_focus,
        ended_sessions,
        avg_session_duration,
        avg_session_rating: summary.average_rating,
        streak,
    };

    WeeklyInsights {
        total_focus_hours: total_hours(&summary),
        sessions_count: summary.sessions_count,
        avg_session_duration,
        tasks_created: summary.tasks_created,
        tasks_completed: summary.tasks_completed,
        completion_rate: summary.completion_rate,
        most_active_project: summary.most_active_project.map(|m| m.project),
        days_with_focus,
        avg_session_rating: summary.average_rating,
        streak,
        suggestions: suggestions(&metrics, max_suggestions),
    }
}

/// One suggestion rule: a predicate over the metrics and the message shown
/// when it fires.
struct SuggestionRule {
    applies: fn(&InsightMetrics) -> bool,
    message: &'static str,
}

/// The fixed rule set, highest priority first.
const RULES: &[SuggestionRule] = &[
    SuggestionRule {
        applies: |m| m.tasks_created > 0 && m.completion_rate < 50,
        message: "Under half of the tasks you created this week got done. \
                  Try splitting work into smaller tasks.",
    },
    SuggestionRule {
        applies: |m| m.days_with_focus < 3,
        message: "You focused on fewer than three days this week. \
                  Short daily sessions build consistency.",
    },
    SuggestionRule {
        applies: |m| m.ended_sessions > 0 && m.avg_session_duration < 15,
        message: "Your focus sessions average under 15 minutes. \
                  Try settling into longer blocks.",
    },
    SuggestionRule {
        applies: |m| m.avg_session_rating.is_some_and(|rating| rating < 3.0),
        message: "Your session ratings are trending low. \
                  Review what keeps breaking your focus.",
    },
    SuggestionRule {
        applies: |m| m.streak >= 3,
        message: "You have a multi-day streak going. \
                  Start a session today to keep it alive.",
    },
];

/// Evaluates the rule table in order, returning at most `max` messages.
#[must_use]
pub fn suggestions(metrics: &InsightMetrics, max: usize) -> Vec<String> {
    RULES
        .iter()
        .filter(|rule| (rule.applies)(metrics))
        .take(max)
        .map(|rule| rule.message.to_string())
        .collect()
}

fn total_hours(summary: &WeeklySummary) -> f64 {
    #[expect(clippy::cast_precision_loss, reason = "weekly minute totals are small")]
    let hours = summary.minutes_focused as f64 / 60.0;
    (hours * 10.0).round() / 10.0
}
