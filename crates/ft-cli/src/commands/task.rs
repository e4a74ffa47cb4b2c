//! Task subcommands: add, list, edit, done, delete.

use std::io::Write;

use anyhow::{Result, bail};
use chrono::{DateTime, Duration, FixedOffset, Utc};

use ft_core::task::{NewTask, Task, TaskPatch};
use ft_core::types::{TaskId, UserId};
use ft_core::window::{self, TimeWindow};
use ft_db::Database;

use crate::cli::TaskScope;
use crate::config::Config;

pub fn add<W: Write>(
    writer: &mut W,
    db: &mut Database,
    user: &UserId,
    new_task: &NewTask,
) -> Result<()> {
    let task = db.create_task(user, new_task)?;
    writeln!(writer, "Created task {}: {}", task.id, task.title)?;
    Ok(())
}

pub fn list<W: Write>(
    writer: &mut W,
    db: &Database,
    user: &UserId,
    scope: TaskScope,
    json: bool,
    config: &Config,
) -> Result<()> {
    let now = Utc::now();
    let offset = window::reference_offset(config.utc_offset_minutes);
    let tasks = match scope {
        TaskScope::All => db.list_tasks(user)?,
        TaskScope::Today => db.list_tasks_of_day(user, TimeWindow::day_of(now, offset))?,
        TaskScope::Week => db.list_tasks_due_between(user, now, now + Duration::days(7))?,
    };

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&tasks)?)?;
        return Ok(());
    }

    if tasks.is_empty() {
        writeln!(writer, "No tasks.")?;
        return Ok(());
    }
    for task in &tasks {
        writeln!(writer, "{}", format_task_line(task, offset))?;
    }
    Ok(())
}

pub fn edit<W: Write>(
    writer: &mut W,
    db: &mut Database,
    user: &UserId,
    id: &str,
    patch: &TaskPatch,
) -> Result<()> {
    if patch.is_empty() {
        bail!("nothing to change; pass at least one field flag");
    }
    let id = TaskId::new(id)?;
    let task = db.update_task(user, &id, patch)?;
    writeln!(writer, "Updated task {}: {}", task.id, task.title)?;
    Ok(())
}

pub fn done<W: Write>(writer: &mut W, db: &mut Database, user: &UserId, id: &str) -> Result<()> {
    let id = TaskId::new(id)?;
    let task = db.toggle_task(user, &id)?;
    let state = if task.completed { "completed" } else { "incomplete" };
    writeln!(writer, "Task marked as {state}: {}", task.title)?;
    Ok(())
}

pub fn delete<W: Write>(writer: &mut W, db: &mut Database, user: &UserId, id: &str) -> Result<()> {
    let id = TaskId::new(id)?;
    let task = db.delete_task(user, &id)?;
    writeln!(writer, "Deleted task: {}", task.title)?;
    Ok(())
}

/// One human-readable task line: checkbox, title, project/kind, deadline.
fn format_task_line(task: &Task, offset: FixedOffset) -> String {
    let check = if task.completed { "x" } else { " " };
    let mut line = format!(
        "[{check}] {}  {}  ({}/{})",
        task.id, task.title, task.project, task.kind
    );
    if let Some(deadline) = task.deadline {
        line.push_str(&format!("  due {}", format_instant(deadline, offset)));
    }
    line
}

pub(crate) fn format_instant(instant: DateTime<Utc>, offset: FixedOffset) -> String {
    instant
        .with_timezone(&offset)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}
