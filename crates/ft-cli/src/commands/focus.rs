//! Focus session subcommands: start, end, active, list.

use std::io::Write;

use anyhow::{Result, bail};
use chrono::Utc;
use serde::Serialize;

use ft_core::session::{FocusMode, FocusSession};
use ft_core::task::Project;
use ft_core::types::{Rating, SessionId, UserId};
use ft_core::window::{self, TimeWindow};
use ft_db::Database;

use crate::cli::SessionRange;
use crate::commands::format_duration;
use crate::config::Config;

pub fn start<W: Write>(
    writer: &mut W,
    db: &mut Database,
    user: &UserId,
    mode: FocusMode,
    project: Project,
    planned: Option<u32>,
) -> Result<()> {
    let session = db.start_session(user, mode, project, planned)?;
    match session.planned_minutes {
        Some(minutes) => writeln!(
            writer,
            "Started {mode} session on {project} ({minutes} min planned)"
        )?,
        None => writeln!(writer, "Started {mode} session on {project}")?,
    }
    Ok(())
}

pub fn end<W: Write>(
    writer: &mut W,
    db: &mut Database,
    user: &UserId,
    id: Option<&str>,
    rating: Option<i64>,
    note: Option<&str>,
) -> Result<()> {
    // Rating is validated before anything is written.
    let rating = rating.map(Rating::new).transpose()?;
    let session_id = match id {
        Some(id) => SessionId::new(id)?,
        None => match db.active_session(user)? {
            Some(session) => session.id,
            None => bail!("no active session to end"),
        },
    };

    let session = db.end_session(user, &session_id, rating, note)?;
    let minutes = session.duration_minutes().unwrap_or(0);
    match session.rating {
        Some(rating) => writeln!(
            writer,
            "Ended {} session: {} (rated {rating}/5)",
            session.mode,
            format_duration(minutes)
        )?,
        None => writeln!(
            writer,
            "Ended {} session: {}",
            session.mode,
            format_duration(minutes)
        )?,
    }
    Ok(())
}

pub fn active<W: Write>(writer: &mut W, db: &Database, user: &UserId) -> Result<()> {
    match db.active_session(user)? {
        Some(session) => {
            // Elapsed time is computed here from started_at; the store keeps
            // no running counter.
            let elapsed = Utc::now()
                .signed_duration_since(session.started_at)
                .num_minutes();
            writeln!(
                writer,
                "Active {} session on {} ({} elapsed)",
                session.mode,
                session.project,
                format_duration(elapsed)
            )?;
            if let Some(planned) = session.planned_minutes {
                writeln!(writer, "Planned: {planned} min")?;
            }
        }
        None => writeln!(writer, "No active session.")?,
    }
    Ok(())
}

/// JSON payload for `focus list --json`.
#[derive(Debug, Serialize)]
struct SessionList {
    sessions: Vec<FocusSession>,
    count: usize,
    total_minutes: i64,
}

pub fn list<W: Write>(
    writer: &mut W,
    db: &Database,
    user: &UserId,
    range: SessionRange,
    json: bool,
    config: &Config,
) -> Result<()> {
    let now = Utc::now();
    let offset = window::reference_offset(config.utc_offset_minutes);
    let time_window = match range {
        SessionRange::Today => TimeWindow::day_of(now, offset),
        SessionRange::Week => TimeWindow::trailing_days(now, 7),
    };
    let sessions = db.list_sessions_started_in(user, time_window)?;
    // Ended sessions only; an active session has earned nothing yet.
    let total_minutes: i64 = sessions
        .iter()
        .filter_map(FocusSession::duration_minutes)
        .sum();

    if json {
        let payload = SessionList {
            count: sessions.len(),
            total_minutes,
            sessions,
        };
        writeln!(writer, "{}", serde_json::to_string_pretty(&payload)?)?;
        return Ok(());
    }

    if sessions.is_empty() {
        writeln!(writer, "No sessions in this range.")?;
        return Ok(());
    }
    writeln!(
        writer,
        "{} sessions, {} focused",
        sessions.len(),
        format_duration(total_minutes)
    )?;
    for session in &sessions {
        writeln!(writer, "{}", format_session_line(session))?;
    }
    Ok(())
}

fn format_session_line(session: &FocusSession) -> String {
    let when = session.started_at.format("%Y-%m-%d %H:%M");
    match session.duration_minutes() {
        Some(minutes) => {
            let mut line = format!(
                "{when}  {} on {}  {}",
                session.mode,
                session.project,
                format_duration(minutes)
            );
            if let Some(rating) = session.rating {
                line.push_str(&format!("  rated {rating}/5"));
            }
            line
        }
        None => format!("{when}  {} on {}  (active)", session.mode, session.project),
    }
}
