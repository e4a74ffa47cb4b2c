//! Storage layer for the focus tracker.
//!
//! Provides persistence for tasks, focus sessions, and timeline events using
//! `rusqlite`, and implements the session-lifecycle write path.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but
//! not `Sync`. A `Database` instance can be moved between threads but cannot
//! be shared across threads without external synchronization.
//!
//! # Single Active Session
//!
//! At most one focus session per user may be active (`ended_at IS NULL`).
//! The invariant is enforced with a single conditional
//! `INSERT ... SELECT ... WHERE NOT EXISTS` statement — never a separate
//! check followed by an insert — plus a partial unique index on
//! `(user_id) WHERE ended_at IS NULL`. Ending a session is likewise one
//! conditional `UPDATE ... WHERE ended_at IS NULL`; the not-found versus
//! already-ended distinction is resolved by a read only after the mutation
//! has already refused.
//!
//! # Schema
//!
//! Timestamps are stored as TEXT in RFC 3339 format with millisecond
//! precision (e.g. `2026-02-03T10:30:00.000Z`). Every stored timestamp goes
//! through [`format_timestamp`], so lexicographic ordering matches
//! chronological ordering and range queries can compare TEXT directly.
//! Timeline event metadata is a JSON TEXT column; its shape per event kind
//! is owned by `ft_core::timeline::metadata`.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use uuid::Uuid;

use ft_core::session::{FocusMode, FocusSession};
use ft_core::task::{NewTask, Project, Task, TaskKind, TaskPatch};
use ft_core::timeline::{self, TimelineEvent, TimelineEventKind};
use ft_core::types::{
    EventId, Rating, SessionId, TaskId, UserId, ValidationError, validate_planned_minutes,
    validate_title,
};
use ft_core::window::TimeWindow;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Domain validation failed before any write.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The user already has an active session; end it before starting another.
    #[error("an active session already exists; end it before starting a new one")]
    ActiveSessionExists,
    /// The session does not exist or is not owned by the caller.
    #[error("focus session not found")]
    SessionNotFound,
    /// The session has already been ended.
    #[error("this session has already ended")]
    SessionAlreadyEnded,
    /// The task does not exist or is not owned by the caller.
    #[error("task not found")]
    TaskNotFound,
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp for record {record_id}: {timestamp}")]
    TimestampParse {
        record_id: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored field no longer matches the domain vocabulary.
    #[error("invalid record {record_id}: {message}")]
    InvalidRecord { record_id: String, message: String },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety and the
/// single-active-session write path.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection
    /// closes.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                project TEXT NOT NULL,
                kind TEXT NOT NULL,
                deadline TEXT,
                completed INTEGER NOT NULL DEFAULT 0,
                completed_at TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_user_completed ON tasks(user_id, completed);
            CREATE INDEX IF NOT EXISTS idx_tasks_user_deadline ON tasks(user_id, deadline);

            CREATE TABLE IF NOT EXISTS focus_sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                mode TEXT NOT NULL,
                project TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                planned_minutes INTEGER,
                rating INTEGER,
                note TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_user_started ON focus_sessions(user_id, started_at);

            -- At most one active session per user.
            CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_user_active
                ON focus_sessions(user_id) WHERE ended_at IS NULL;

            -- Append-only audit log; rows are never updated or deleted.
            CREATE TABLE IF NOT EXISTS timeline_events (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                created_at TEXT NOT NULL,
                metadata TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_user_created ON timeline_events(user_id, created_at);
            ",
        )?;
        Ok(())
    }

    // ========== Tasks ==========

    /// Creates a task and its `TASK_CREATED` timeline event.
    pub fn create_task(&mut self, user: &UserId, new_task: &NewTask) -> Result<Task, StoreError> {
        self.create_task_at(user, new_task, Utc::now())
    }

    /// Like [`Self::create_task`] with an explicit creation instant.
    pub fn create_task_at(
        &mut self,
        user: &UserId,
        new_task: &NewTask,
        now: DateTime<Utc>,
    ) -> Result<Task, StoreError> {
        let title = validate_title(&new_task.title)?;
        let task = Task {
            id: TaskId::new(Uuid::new_v4().to_string())?,
            user_id: user.clone(),
            title,
            description: new_task.description.clone(),
            project: new_task.project,
            kind: new_task.kind,
            deadline: new_task.deadline,
            completed: false,
            completed_at: None,
            created_at: now,
        };

        let tx = self.conn.transaction()?;
        tx.execute(
            "
            INSERT INTO tasks
            (id, user_id, title, description, project, kind, deadline, completed, completed_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0, NULL, ?)
            ",
            params![
                task.id.as_str(),
                task.user_id.as_str(),
                task.title,
                task.description,
                task.project.as_str(),
                task.kind.as_str(),
                task.deadline.map(format_timestamp),
                format_timestamp(task.created_at),
            ],
        )?;
        append_event(
            &tx,
            user,
            TimelineEventKind::TaskCreated,
            now,
            &timeline::metadata::task_created(&task),
        )?;
        tx.commit()?;

        tracing::debug!(task_id = %task.id, "task created");
        Ok(task)
    }

    /// Lists all of a user's tasks, newest first.
    pub fn list_tasks(&self, user: &UserId) -> Result<Vec<Task>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {TASK_COLUMNS}
            FROM tasks
            WHERE user_id = ?
            ORDER BY created_at DESC, id ASC
            "
        ))?;
        let rows = stmt.query_map(params![user.as_str()], task_row)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(task_from_row(row?)?);
        }
        Ok(tasks)
    }

    /// Tasks created in the window or with a deadline in it, newest first.
    ///
    /// The union, not the intersection: a task is "of the day" if it was
    /// created that day or is due that day.
    pub fn list_tasks_of_day(
        &self,
        user: &UserId,
        window: TimeWindow,
    ) -> Result<Vec<Task>, StoreError> {
        let start = format_timestamp(window.start);
        let end = format_timestamp(window.end);
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {TASK_COLUMNS}
            FROM tasks
            WHERE user_id = ?1
              AND ((created_at >= ?2 AND created_at < ?3)
                OR (deadline IS NOT NULL AND deadline >= ?2 AND deadline < ?3))
            ORDER BY created_at DESC, id ASC
            "
        ))?;
        let rows = stmt.query_map(params![user.as_str(), start, end], task_row)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(task_from_row(row?)?);
        }
        Ok(tasks)
    }

    /// Tasks with a deadline in `[start, end]`, soonest deadline first.
    pub fn list_tasks_due_between(
        &self,
        user: &UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Task>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {TASK_COLUMNS}
            FROM tasks
            WHERE user_id = ?1
              AND deadline IS NOT NULL AND deadline >= ?2 AND deadline <= ?3
            ORDER BY deadline ASC, id ASC
            "
        ))?;
        let rows = stmt.query_map(
            params![
                user.as_str(),
                format_timestamp(start),
                format_timestamp(end)
            ],
            task_row,
        )?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(task_from_row(row?)?);
        }
        Ok(tasks)
    }

    /// Applies a partial update to a task the user owns.
    pub fn update_task(
        &mut self,
        user: &UserId,
        id: &TaskId,
        patch: &TaskPatch,
    ) -> Result<Task, StoreError> {
        let mut task = self.get_task(user, id)?.ok_or(StoreError::TaskNotFound)?;

        if let Some(title) = &patch.title {
            task.title = validate_title(title)?;
        }
        if let Some(description) = &patch.description {
            task.description = Some(description.clone());
        }
        if let Some(project) = patch.project {
            task.project = project;
        }
        if let Some(kind) = patch.kind {
            task.kind = kind;
        }
        if let Some(deadline) = patch.deadline {
            task.deadline = deadline;
        }

        self.conn.execute(
            "
            UPDATE tasks
            SET title = ?, description = ?, project = ?, kind = ?, deadline = ?
            WHERE id = ? AND user_id = ?
            ",
            params![
                task.title,
                task.description,
                task.project.as_str(),
                task.kind.as_str(),
                task.deadline.map(format_timestamp),
                id.as_str(),
                user.as_str(),
            ],
        )?;
        Ok(task)
    }

    /// Toggles a task's completion flag.
    ///
    /// `completed_at` is stamped iff the task is now complete and cleared
    /// otherwise. A `TASK_COMPLETED` timeline event is appended only on the
    /// incomplete-to-complete transition.
    pub fn toggle_task(&mut self, user: &UserId, id: &TaskId) -> Result<Task, StoreError> {
        self.toggle_task_at(user, id, Utc::now())
    }

    /// Like [`Self::toggle_task`] with an explicit completion instant.
    pub fn toggle_task_at(
        &mut self,
        user: &UserId,
        id: &TaskId,
        now: DateTime<Utc>,
    ) -> Result<Task, StoreError> {
        let tx = self.conn.transaction()?;
        let mut task = get_task_tx(&tx, user, id)?.ok_or(StoreError::TaskNotFound)?;

        task.completed = !task.completed;
        task.completed_at = task.completed.then_some(now);

        tx.execute(
            "UPDATE tasks SET completed = ?, completed_at = ? WHERE id = ? AND user_id = ?",
            params![
                i32::from(task.completed),
                task.completed_at.map(format_timestamp),
                id.as_str(),
                user.as_str(),
            ],
        )?;
        if task.completed {
            append_event(
                &tx,
                user,
                TimelineEventKind::TaskCompleted,
                now,
                &timeline::metadata::task_completed(&task),
            )?;
        }
        tx.commit()?;

        tracing::debug!(task_id = %id, completed = task.completed, "task toggled");
        Ok(task)
    }

    /// Hard-deletes a task and appends a `TASK_DELETED` event.
    ///
    /// Earlier events for the task remain in the timeline.
    pub fn delete_task(&mut self, user: &UserId, id: &TaskId) -> Result<Task, StoreError> {
        self.delete_task_at(user, id, Utc::now())
    }

    /// Like [`Self::delete_task`] with an explicit deletion instant.
    pub fn delete_task_at(
        &mut self,
        user: &UserId,
        id: &TaskId,
        now: DateTime<Utc>,
    ) -> Result<Task, StoreError> {
        let tx = self.conn.transaction()?;
        let task = get_task_tx(&tx, user, id)?.ok_or(StoreError::TaskNotFound)?;

        tx.execute(
            "DELETE FROM tasks WHERE id = ? AND user_id = ?",
            params![id.as_str(), user.as_str()],
        )?;
        append_event(
            &tx,
            user,
            TimelineEventKind::TaskDeleted,
            now,
            &timeline::metadata::task_deleted(&task),
        )?;
        tx.commit()?;

        tracing::debug!(task_id = %id, "task deleted");
        Ok(task)
    }

    fn get_task(&self, user: &UserId, id: &TaskId) -> Result<Option<Task>, StoreError> {
        get_task_tx(&self.conn, user, id)
    }

    // ========== Focus Sessions ==========

    /// Starts a focus session, failing if the user already has one active.
    pub fn start_session(
        &mut self,
        user: &UserId,
        mode: FocusMode,
        project: Project,
        planned_minutes: Option<u32>,
    ) -> Result<FocusSession, StoreError> {
        self.start_session_at(user, mode, project, planned_minutes, Utc::now())
    }

    /// Like [`Self::start_session`] with an explicit start instant.
    pub fn start_session_at(
        &mut self,
        user: &UserId,
        mode: FocusMode,
        project: Project,
        planned_minutes: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<FocusSession, StoreError> {
        let planned_minutes = planned_minutes
            .map(|minutes| validate_planned_minutes(i64::from(minutes)))
            .transpose()?;

        let session = FocusSession {
            id: SessionId::new(Uuid::new_v4().to_string())?,
            user_id: user.clone(),
            mode,
            project,
            started_at: now,
            ended_at: None,
            planned_minutes,
            rating: None,
            note: None,
        };

        let tx = self.conn.transaction()?;
        // Conditional insert: creates the row only while no session for this
        // user is active. One statement, so two racing starts cannot both
        // pass the check.
        let inserted = tx.execute(
            "
            INSERT INTO focus_sessions
            (id, user_id, mode, project, started_at, ended_at, planned_minutes, rating, note)
            SELECT ?1, ?2, ?3, ?4, ?5, NULL, ?6, NULL, NULL
            WHERE NOT EXISTS (
                SELECT 1 FROM focus_sessions WHERE user_id = ?2 AND ended_at IS NULL
            )
            ",
            params![
                session.id.as_str(),
                user.as_str(),
                mode.as_str(),
                project.as_str(),
                format_timestamp(now),
                planned_minutes.map(i64::from),
            ],
        )?;
        if inserted == 0 {
            return Err(StoreError::ActiveSessionExists);
        }
        append_event(
            &tx,
            user,
            TimelineEventKind::FocusStarted,
            now,
            &timeline::metadata::focus_started(&session),
        )?;
        tx.commit()?;

        tracing::debug!(session_id = %session.id, mode = %mode, "focus session started");
        Ok(session)
    }

    /// Ends a session the user owns, recording optional rating and note.
    ///
    /// Fails with [`StoreError::SessionNotFound`] for a missing or foreign
    /// session and [`StoreError::SessionAlreadyEnded`] for a second end —
    /// the two are distinct so callers can tell "never existed" from
    /// "already finished".
    pub fn end_session(
        &mut self,
        user: &UserId,
        id: &SessionId,
        rating: Option<Rating>,
        note: Option<&str>,
    ) -> Result<FocusSession, StoreError> {
        self.end_session_at(user, id, rating, note, Utc::now())
    }

    /// Like [`Self::end_session`] with an explicit end instant.
    pub fn end_session_at(
        &mut self,
        user: &UserId,
        id: &SessionId,
        rating: Option<Rating>,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<FocusSession, StoreError> {
        let tx = self.conn.transaction()?;
        // MAX() on RFC 3339 TEXT is chronological, so ended_at never
        // precedes started_at even when the caller's clock lags.
        let updated = tx.execute(
            "
            UPDATE focus_sessions
            SET ended_at = MAX(?1, started_at), rating = ?2, note = ?3
            WHERE id = ?4 AND user_id = ?5 AND ended_at IS NULL
            ",
            params![
                format_timestamp(now),
                rating.map(i64::from),
                note,
                id.as_str(),
                user.as_str(),
            ],
        )?;
        if updated == 0 {
            // The mutation already refused; this read only classifies why.
            let exists: Option<String> = tx
                .query_row(
                    "SELECT id FROM focus_sessions WHERE id = ? AND user_id = ?",
                    params![id.as_str(), user.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(match exists {
                Some(_) => StoreError::SessionAlreadyEnded,
                None => StoreError::SessionNotFound,
            });
        }

        let session =
            get_session_tx(&tx, user, id)?.ok_or(StoreError::SessionNotFound)?;
        append_event(
            &tx,
            user,
            TimelineEventKind::FocusEnded,
            now,
            &timeline::metadata::focus_ended(&session),
        )?;
        tx.commit()?;

        tracing::debug!(
            session_id = %id,
            minutes = session.duration_minutes(),
            "focus session ended"
        );
        Ok(session)
    }

    /// The user's active session, if any. Pure read.
    pub fn active_session(&self, user: &UserId) -> Result<Option<FocusSession>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {SESSION_COLUMNS}
            FROM focus_sessions
            WHERE user_id = ? AND ended_at IS NULL
            "
        ))?;
        let row = stmt
            .query_row(params![user.as_str()], session_row)
            .optional()?;
        row.map(session_from_row).transpose()
    }

    /// Lists all of a user's sessions, newest first.
    pub fn list_sessions(&self, user: &UserId) -> Result<Vec<FocusSession>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {SESSION_COLUMNS}
            FROM focus_sessions
            WHERE user_id = ?
            ORDER BY started_at DESC, id ASC
            "
        ))?;
        let rows = stmt.query_map(params![user.as_str()], session_row)?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(session_from_row(row?)?);
        }
        Ok(sessions)
    }

    /// Sessions started inside the window, newest first.
    pub fn list_sessions_started_in(
        &self,
        user: &UserId,
        window: TimeWindow,
    ) -> Result<Vec<FocusSession>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {SESSION_COLUMNS}
            FROM focus_sessions
            WHERE user_id = ? AND started_at >= ? AND started_at < ?
            ORDER BY started_at DESC, id ASC
            "
        ))?;
        let rows = stmt.query_map(
            params![
                user.as_str(),
                format_timestamp(window.start),
                format_timestamp(window.end)
            ],
            session_row,
        )?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(session_from_row(row?)?);
        }
        Ok(sessions)
    }

    // ========== Timeline ==========

    /// Timeline events inside the window, oldest first.
    pub fn list_events_in(
        &self,
        user: &UserId,
        window: TimeWindow,
    ) -> Result<Vec<TimelineEvent>, StoreError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, user_id, kind, created_at, metadata
            FROM timeline_events
            WHERE user_id = ? AND created_at >= ? AND created_at < ?
            ORDER BY created_at ASC, id ASC
            ",
        )?;
        let rows = stmt.query_map(
            params![
                user.as_str(),
                format_timestamp(window.start),
                format_timestamp(window.end)
            ],
            |row| {
                Ok(RawEvent {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    kind: row.get(2)?,
                    created_at: row.get(3)?,
                    metadata: row.get(4)?,
                })
            },
        )?;
        let mut events = Vec::new();
        for row in rows {
            events.push(event_from_row(row?)?);
        }
        Ok(events)
    }
}

const TASK_COLUMNS: &str =
    "id, user_id, title, description, project, kind, deadline, completed, completed_at, created_at";

const SESSION_COLUMNS: &str =
    "id, user_id, mode, project, started_at, ended_at, planned_minutes, rating, note";

/// Appends one immutable audit-log row inside the caller's transaction.
fn append_event(
    conn: &Connection,
    user: &UserId,
    kind: TimelineEventKind,
    now: DateTime<Utc>,
    metadata: &serde_json::Value,
) -> Result<(), StoreError> {
    conn.execute(
        "
        INSERT INTO timeline_events (id, user_id, kind, created_at, metadata)
        VALUES (?, ?, ?, ?, ?)
        ",
        params![
            Uuid::new_v4().to_string(),
            user.as_str(),
            kind.as_str(),
            format_timestamp(now),
            metadata.to_string(),
        ],
    )?;
    Ok(())
}

#[derive(Debug)]
struct RawTask {
    id: String,
    user_id: String,
    title: String,
    description: Option<String>,
    project: String,
    kind: String,
    deadline: Option<String>,
    completed: bool,
    completed_at: Option<String>,
    created_at: String,
}

#[derive(Debug)]
struct RawSession {
    id: String,
    user_id: String,
    mode: String,
    project: String,
    started_at: String,
    ended_at: Option<String>,
    planned_minutes: Option<i64>,
    rating: Option<i64>,
    note: Option<String>,
}

#[derive(Debug)]
struct RawEvent {
    id: String,
    user_id: String,
    kind: String,
    created_at: String,
    metadata: String,
}

fn task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawTask> {
    Ok(RawTask {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        project: row.get(4)?,
        kind: row.get(5)?,
        deadline: row.get(6)?,
        completed: row.get(7)?,
        completed_at: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn session_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSession> {
    Ok(RawSession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        mode: row.get(2)?,
        project: row.get(3)?,
        started_at: row.get(4)?,
        ended_at: row.get(5)?,
        planned_minutes: row.get(6)?,
        rating: row.get(7)?,
        note: row.get(8)?,
    })
}

fn get_task_tx(
    conn: &Connection,
    user: &UserId,
    id: &TaskId,
) -> Result<Option<Task>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ? AND user_id = ?"
    ))?;
    let row = stmt
        .query_row(params![id.as_str(), user.as_str()], task_row)
        .optional()?;
    row.map(task_from_row).transpose()
}

fn get_session_tx(
    conn: &Connection,
    user: &UserId,
    id: &SessionId,
) -> Result<Option<FocusSession>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SESSION_COLUMNS} FROM focus_sessions WHERE id = ? AND user_id = ?"
    ))?;
    let row = stmt
        .query_row(params![id.as_str(), user.as_str()], session_row)
        .optional()?;
    row.map(session_from_row).transpose()
}

fn task_from_row(raw: RawTask) -> Result<Task, StoreError> {
    let project: Project = parse_field(&raw.id, &raw.project)?;
    let kind: TaskKind = parse_field(&raw.id, &raw.kind)?;
    Ok(Task {
        project,
        kind,
        title: raw.title,
        description: raw.description,
        deadline: raw
            .deadline
            .map(|t| parse_timestamp(&t, &raw.id))
            .transpose()?,
        completed: raw.completed,
        completed_at: raw
            .completed_at
            .map(|t| parse_timestamp(&t, &raw.id))
            .transpose()?,
        created_at: parse_timestamp(&raw.created_at, &raw.id)?,
        user_id: UserId::new(raw.user_id)?,
        id: TaskId::new(raw.id)?,
    })
}

fn session_from_row(raw: RawSession) -> Result<FocusSession, StoreError> {
    let mode: FocusMode = parse_field(&raw.id, &raw.mode)?;
    let project: Project = parse_field(&raw.id, &raw.project)?;
    let planned_minutes = raw
        .planned_minutes
        .map(|minutes| {
            validate_planned_minutes(minutes).map_err(|err| StoreError::InvalidRecord {
                record_id: raw.id.clone(),
                message: err.to_string(),
            })
        })
        .transpose()?;
    let rating = raw
        .rating
        .map(|value| {
            Rating::new(value).map_err(|err| StoreError::InvalidRecord {
                record_id: raw.id.clone(),
                message: err.to_string(),
            })
        })
        .transpose()?;
    Ok(FocusSession {
        mode,
        project,
        started_at: parse_timestamp(&raw.started_at, &raw.id)?,
        ended_at: raw
            .ended_at
            .map(|t| parse_timestamp(&t, &raw.id))
            .transpose()?,
        planned_minutes,
        rating,
        note: raw.note,
        user_id: UserId::new(raw.user_id)?,
        id: SessionId::new(raw.id)?,
    })
}

fn event_from_row(raw: RawEvent) -> Result<TimelineEvent, StoreError> {
    let kind: TimelineEventKind = parse_field(&raw.id, &raw.kind)?;
    let metadata =
        serde_json::from_str(&raw.metadata).map_err(|err| StoreError::InvalidRecord {
            record_id: raw.id.clone(),
            message: format!("metadata is not valid JSON: {err}"),
        })?;
    Ok(TimelineEvent {
        kind,
        metadata,
        created_at: parse_timestamp(&raw.created_at, &raw.id)?,
        user_id: UserId::new(raw.user_id)?,
        id: EventId::new(raw.id)?,
    })
}

fn parse_field<T>(record_id: &str, value: &str) -> Result<T, StoreError>
where
    T: std::str::FromStr<Err = ValidationError>,
{
    value.parse().map_err(|err: ValidationError| {
        StoreError::InvalidRecord {
            record_id: record_id.to_string(),
            message: err.to_string(),
        }
    })
}

fn parse_timestamp(timestamp: &str, record_id: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| StoreError::TimestampParse {
            record_id: record_id.to_string(),
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn instant(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn user(name: &str) -> UserId {
        UserId::new(name).unwrap()
    }

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            description: None,
            project: Project::Personal,
            kind: TaskKind::Study,
            deadline: None,
        }
    }

    fn count_active(db: &Database, user: &UserId) -> i64 {
        db.conn
            .query_row(
                "SELECT COUNT(*) FROM focus_sessions WHERE user_id = ? AND ended_at IS NULL",
                params![user.as_str()],
                |row| row.get(0),
            )
            .unwrap()
    }

    // ========== Session Lifecycle Tests ==========

    #[test]
    fn start_then_end_session_flow() {
        let mut db = Database::open_in_memory().unwrap();
        let sami = user("sami");
        let t0 = instant("2026-02-03T09:00:00Z");

        let session = db
            .start_session_at(&sami, FocusMode::Study, Project::Personal, Some(25), t0)
            .unwrap();
        assert!(session.is_active());
        assert_eq!(session.planned_minutes, Some(25));

        // A second start 10 seconds later conflicts.
        let err = db
            .start_session_at(
                &sami,
                FocusMode::Coding,
                Project::Ga,
                None,
                t0 + Duration::seconds(10),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::ActiveSessionExists));
        assert_eq!(count_active(&db, &sami), 1);

        let ended = db
            .end_session_at(
                &sami,
                &session.id,
                Some(Rating::new(4).unwrap()),
                None,
                t0 + Duration::minutes(30),
            )
            .unwrap();
        assert!(!ended.is_active());
        assert_eq!(ended.duration_minutes(), Some(30));
        assert_eq!(ended.rating, Some(Rating::new(4).unwrap()));
        assert_eq!(db.active_session(&sami).unwrap(), None);
    }

    #[test]
    fn at_most_one_active_session_per_user() {
        let mut db = Database::open_in_memory().unwrap();
        let sami = user("sami");
        let t0 = instant("2026-02-03T09:00:00Z");

        db.start_session_at(&sami, FocusMode::Study, Project::Personal, None, t0)
            .unwrap();
        for attempt in 1..=3 {
            let result = db.start_session_at(
                &sami,
                FocusMode::Study,
                Project::Personal,
                None,
                t0 + Duration::minutes(attempt),
            );
            assert!(result.is_err(), "attempt {attempt} should conflict");
        }
        assert_eq!(count_active(&db, &sami), 1);
    }

    #[test]
    fn users_do_not_share_active_state() {
        let mut db = Database::open_in_memory().unwrap();
        let t0 = instant("2026-02-03T09:00:00Z");

        db.start_session_at(&user("sami"), FocusMode::Study, Project::Poly, None, t0)
            .unwrap();
        // Another user's active session does not block this one.
        let session = db
            .start_session_at(&user("lena"), FocusMode::Coding, Project::Ga, None, t0)
            .unwrap();
        assert!(session.is_active());
    }

    #[test]
    fn start_after_end_succeeds() {
        let mut db = Database::open_in_memory().unwrap();
        let sami = user("sami");
        let t0 = instant("2026-02-03T09:00:00Z");

        let first = db
            .start_session_at(&sami, FocusMode::Study, Project::Personal, None, t0)
            .unwrap();
        db.end_session_at(&sami, &first.id, None, None, t0 + Duration::minutes(20))
            .unwrap();
        let second = db
            .start_session_at(
                &sami,
                FocusMode::Review,
                Project::Poly,
                None,
                t0 + Duration::minutes(25),
            )
            .unwrap();
        assert!(second.is_active());
        assert_eq!(
            db.active_session(&sami).unwrap().map(|s| s.id),
            Some(second.id)
        );
    }

    #[test]
    fn end_is_not_idempotent() {
        let mut db = Database::open_in_memory().unwrap();
        let sami = user("sami");
        let t0 = instant("2026-02-03T09:00:00Z");

        let session = db
            .start_session_at(&sami, FocusMode::Study, Project::Personal, None, t0)
            .unwrap();
        db.end_session_at(&sami, &session.id, None, None, t0 + Duration::minutes(10))
            .unwrap();

        let err = db
            .end_session_at(&sami, &session.id, None, None, t0 + Duration::minutes(11))
            .unwrap_err();
        assert!(matches!(err, StoreError::SessionAlreadyEnded));
    }

    #[test]
    fn end_distinguishes_missing_from_foreign_sessions() {
        let mut db = Database::open_in_memory().unwrap();
        let sami = user("sami");
        let t0 = instant("2026-02-03T09:00:00Z");

        let missing = SessionId::new("no-such-session").unwrap();
        let err = db
            .end_session_at(&sami, &missing, None, None, t0)
            .unwrap_err();
        assert!(matches!(err, StoreError::SessionNotFound));

        // Another user's session looks like not-found, not already-ended.
        let lena_session = db
            .start_session_at(&user("lena"), FocusMode::Study, Project::Ga, None, t0)
            .unwrap();
        let err = db
            .end_session_at(&sami, &lena_session.id, None, None, t0)
            .unwrap_err();
        assert!(matches!(err, StoreError::SessionNotFound));
    }

    #[test]
    fn ended_at_never_precedes_started_at() {
        let mut db = Database::open_in_memory().unwrap();
        let sami = user("sami");
        let t0 = instant("2026-02-03T09:00:00Z");

        let session = db
            .start_session_at(&sami, FocusMode::Study, Project::Personal, None, t0)
            .unwrap();
        // Lagging caller clock: end "before" the start.
        let ended = db
            .end_session_at(
                &sami,
                &session.id,
                None,
                None,
                t0 - Duration::seconds(30),
            )
            .unwrap();
        assert_eq!(ended.ended_at, Some(t0));
        assert_eq!(ended.duration_minutes(), Some(0));
    }

    #[test]
    fn end_records_note_and_rating() {
        let mut db = Database::open_in_memory().unwrap();
        let sami = user("sami");
        let t0 = instant("2026-02-03T09:00:00Z");

        let session = db
            .start_session_at(&sami, FocusMode::Exam, Project::Poly, Some(50), t0)
            .unwrap();
        let ended = db
            .end_session_at(
                &sami,
                &session.id,
                Some(Rating::new(5).unwrap()),
                Some("mock exam, no phone"),
                t0 + Duration::minutes(50),
            )
            .unwrap();
        assert_eq!(ended.note.as_deref(), Some("mock exam, no phone"));

        let fetched = db.list_sessions(&sami).unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0], ended);
    }

    #[test]
    fn start_rejects_zero_planned_minutes() {
        let mut db = Database::open_in_memory().unwrap();
        let sami = user("sami");
        let err = db
            .start_session_at(
                &sami,
                FocusMode::Study,
                Project::Personal,
                Some(0),
                instant("2026-02-03T09:00:00Z"),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        // Nothing was written.
        assert_eq!(db.list_sessions(&sami).unwrap().len(), 0);
    }

    #[test]
    fn list_sessions_started_in_window_newest_first() {
        let mut db = Database::open_in_memory().unwrap();
        let sami = user("sami");

        for day in ["01", "03", "05"] {
            let start = instant(&format!("2026-02-{day}T09:00:00Z"));
            let session = db
                .start_session_at(&sami, FocusMode::Study, Project::Personal, None, start)
                .unwrap();
            db.end_session_at(&sami, &session.id, None, None, start + Duration::minutes(30))
                .unwrap();
        }

        let window = TimeWindow {
            start: instant("2026-02-02T00:00:00Z"),
            end: instant("2026-02-06T00:00:00Z"),
        };
        let sessions = db.list_sessions_started_in(&sami, window).unwrap();
        assert_eq!(sessions.len(), 2);
        assert!(sessions[0].started_at > sessions[1].started_at);
    }

    // ========== Task Tests ==========

    #[test]
    fn create_task_trims_and_validates_title() {
        let mut db = Database::open_in_memory().unwrap();
        let sami = user("sami");

        let task = db
            .create_task_at(
                &sami,
                &new_task("  finish lab report  "),
                instant("2026-02-03T09:00:00Z"),
            )
            .unwrap();
        assert_eq!(task.title, "finish lab report");
        assert!(!task.completed);
        assert_eq!(task.completed_at, None);

        let err = db
            .create_task_at(&sami, &new_task("   "), instant("2026-02-03T09:01:00Z"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn toggle_keeps_completed_and_completed_at_in_step() {
        let mut db = Database::open_in_memory().unwrap();
        let sami = user("sami");
        let t0 = instant("2026-02-03T09:00:00Z");

        let task = db.create_task_at(&sami, &new_task("revise"), t0).unwrap();

        let done = db
            .toggle_task_at(&sami, &task.id, t0 + Duration::hours(2))
            .unwrap();
        assert!(done.completed);
        assert_eq!(done.completed_at, Some(t0 + Duration::hours(2)));
        assert!(done.completed_at.unwrap() >= done.created_at);

        let undone = db
            .toggle_task_at(&sami, &task.id, t0 + Duration::hours(3))
            .unwrap();
        assert!(!undone.completed);
        assert_eq!(undone.completed_at, None);
    }

    #[test]
    fn toggle_missing_task_is_not_found() {
        let mut db = Database::open_in_memory().unwrap();
        let err = db
            .toggle_task_at(
                &user("sami"),
                &TaskId::new("nope").unwrap(),
                instant("2026-02-03T09:00:00Z"),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::TaskNotFound));
    }

    #[test]
    fn update_task_applies_patch_fields() {
        let mut db = Database::open_in_memory().unwrap();
        let sami = user("sami");
        let t0 = instant("2026-02-03T09:00:00Z");

        let task = db.create_task_at(&sami, &new_task("draft essay"), t0).unwrap();
        let deadline = instant("2026-02-05T18:00:00Z");
        let patch = TaskPatch {
            title: Some("draft essay intro".to_string()),
            project: Some(Project::Ga),
            deadline: Some(Some(deadline)),
            ..TaskPatch::default()
        };

        let updated = db.update_task(&sami, &task.id, &patch).unwrap();
        assert_eq!(updated.title, "draft essay intro");
        assert_eq!(updated.project, Project::Ga);
        assert_eq!(updated.deadline, Some(deadline));
        assert_eq!(updated.kind, task.kind, "unpatched fields untouched");

        // Clearing the deadline is expressible.
        let cleared = db
            .update_task(
                &sami,
                &task.id,
                &TaskPatch {
                    deadline: Some(None),
                    ..TaskPatch::default()
                },
            )
            .unwrap();
        assert_eq!(cleared.deadline, None);

        let listed = db.list_tasks(&sami).unwrap();
        assert_eq!(listed[0], cleared);
    }

    #[test]
    fn tasks_are_owner_scoped() {
        let mut db = Database::open_in_memory().unwrap();
        let t0 = instant("2026-02-03T09:00:00Z");
        let task = db
            .create_task_at(&user("sami"), &new_task("private"), t0)
            .unwrap();

        let err = db
            .toggle_task_at(&user("lena"), &task.id, t0)
            .unwrap_err();
        assert!(matches!(err, StoreError::TaskNotFound));
        assert!(db.list_tasks(&user("lena")).unwrap().is_empty());
    }

    #[test]
    fn list_tasks_of_day_unions_created_and_due() {
        let mut db = Database::open_in_memory().unwrap();
        let sami = user("sami");

        db.create_task_at(&sami, &new_task("created today"), instant("2026-02-03T08:00:00Z"))
            .unwrap();
        db.create_task_at(
            &sami,
            &NewTask {
                deadline: Some(instant("2026-02-03T18:00:00Z")),
                ..new_task("due today")
            },
            instant("2026-01-20T08:00:00Z"),
        )
        .unwrap();
        db.create_task_at(&sami, &new_task("old, no deadline"), instant("2026-01-20T09:00:00Z"))
            .unwrap();

        let window = TimeWindow {
            start: instant("2026-02-03T00:00:00Z"),
            end: instant("2026-02-04T00:00:00Z"),
        };
        let tasks = db.list_tasks_of_day(&sami, window).unwrap();
        let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["created today", "due today"]);
    }

    #[test]
    fn list_tasks_due_between_orders_by_deadline() {
        let mut db = Database::open_in_memory().unwrap();
        let sami = user("sami");
        let t0 = instant("2026-02-01T08:00:00Z");

        for (title, due) in [
            ("later", "2026-02-06T12:00:00Z"),
            ("soon", "2026-02-04T12:00:00Z"),
            ("outside", "2026-02-20T12:00:00Z"),
        ] {
            db.create_task_at(
                &sami,
                &NewTask {
                    deadline: Some(instant(due)),
                    ..new_task(title)
                },
                t0,
            )
            .unwrap();
        }

        let tasks = db
            .list_tasks_due_between(
                &sami,
                instant("2026-02-03T00:00:00Z"),
                instant("2026-02-10T00:00:00Z"),
            )
            .unwrap();
        let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["soon", "later"]);
    }

    // ========== Timeline Tests ==========

    fn events_in_feb(db: &Database, user: &UserId) -> Vec<TimelineEvent> {
        db.list_events_in(
            user,
            TimeWindow {
                start: instant("2026-02-01T00:00:00Z"),
                end: instant("2026-03-01T00:00:00Z"),
            },
        )
        .unwrap()
    }

    #[test]
    fn mutations_append_timeline_events() {
        let mut db = Database::open_in_memory().unwrap();
        let sami = user("sami");
        let t0 = instant("2026-02-03T09:00:00Z");

        let task = db.create_task_at(&sami, &new_task("write summary"), t0).unwrap();
        db.toggle_task_at(&sami, &task.id, t0 + Duration::hours(1))
            .unwrap();
        let session = db
            .start_session_at(
                &sami,
                FocusMode::Coding,
                Project::Oureon,
                Some(45),
                t0 + Duration::hours(2),
            )
            .unwrap();
        db.end_session_at(
            &sami,
            &session.id,
            Some(Rating::new(4).unwrap()),
            None,
            t0 + Duration::hours(2) + Duration::minutes(45),
        )
        .unwrap();

        let events = events_in_feb(&db, &sami);
        let kinds: Vec<TimelineEventKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TimelineEventKind::TaskCreated,
                TimelineEventKind::TaskCompleted,
                TimelineEventKind::FocusStarted,
                TimelineEventKind::FocusEnded,
            ]
        );

        let ended = &events[3];
        assert_eq!(ended.metadata["actual_minutes"], 45);
        assert_eq!(ended.metadata["rating"], 4);
        assert_eq!(ended.metadata["mode"], "coding");

        let started = &events[2];
        assert_eq!(started.metadata["planned_minutes"], 45);
    }

    #[test]
    fn deleting_a_task_keeps_its_earlier_events() {
        let mut db = Database::open_in_memory().unwrap();
        let sami = user("sami");
        let t0 = instant("2026-02-03T09:00:00Z");

        let task = db.create_task_at(&sami, &new_task("scrapped idea"), t0).unwrap();
        db.delete_task_at(&sami, &task.id, t0 + Duration::hours(1))
            .unwrap();

        assert!(db.list_tasks(&sami).unwrap().is_empty());

        let events = events_in_feb(&db, &sami);
        let kinds: Vec<TimelineEventKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![TimelineEventKind::TaskCreated, TimelineEventKind::TaskDeleted]
        );
        assert_eq!(events[1].metadata["title"], "scrapped idea");
    }

    #[test]
    fn uncompleting_a_task_emits_no_event() {
        let mut db = Database::open_in_memory().unwrap();
        let sami = user("sami");
        let t0 = instant("2026-02-03T09:00:00Z");

        let task = db.create_task_at(&sami, &new_task("flip flop"), t0).unwrap();
        db.toggle_task_at(&sami, &task.id, t0 + Duration::hours(1))
            .unwrap();
        db.toggle_task_at(&sami, &task.id, t0 + Duration::hours(2))
            .unwrap();

        let events = events_in_feb(&db, &sami);
        let completed_count = events
            .iter()
            .filter(|e| e.kind == TimelineEventKind::TaskCompleted)
            .count();
        assert_eq!(completed_count, 1);
    }

    #[test]
    fn timeline_window_bounds_are_half_open() {
        let mut db = Database::open_in_memory().unwrap();
        let sami = user("sami");

        db.create_task_at(&sami, &new_task("early"), instant("2026-02-03T00:00:00Z"))
            .unwrap();
        db.create_task_at(&sami, &new_task("late"), instant("2026-02-04T00:00:00Z"))
            .unwrap();

        let events = db
            .list_events_in(
                &sami,
                TimeWindow {
                    start: instant("2026-02-03T00:00:00Z"),
                    end: instant("2026-02-04T00:00:00Z"),
                },
            )
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].metadata["title"], "early");
    }

    #[test]
    fn reopened_database_preserves_records() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("ft.db");
        let sami = user("sami");
        let t0 = instant("2026-02-03T09:00:00Z");

        {
            let mut db = Database::open(&path).unwrap();
            let session = db
                .start_session_at(&sami, FocusMode::Study, Project::Poly, Some(25), t0)
                .unwrap();
            db.end_session_at(
                &sami,
                &session.id,
                Some(Rating::new(3).unwrap()),
                Some("loud cafe"),
                t0 + Duration::minutes(25),
            )
            .unwrap();
        }

        let db = Database::open(&path).unwrap();
        let sessions = db.list_sessions(&sami).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].duration_minutes(), Some(25));
        assert_eq!(sessions[0].note.as_deref(), Some("loud cafe"));
    }
}
