//! Row <-> record mapping and the SQL behind `SqliteRepository`.
//!
//! Rows are read into the serde record types first and only then converted
//! into domain models, so a malformed row is reported as `InvalidRecord`
//! instead of leaking into the reconciler.

use crate::errors::{AppError, AppResult};
use crate::models::idea::{Idea, IdeaRecord, Reactions};
use crate::models::project::{Project, ProjectRecord};
use crate::models::session::{SessionRecord, WorkSession};
use crate::models::todo::{Todo, TodoRecord};
use rusqlite::{Connection, OptionalExtension, Row, params};

const PROJECT_COLUMNS: &str =
    "id, name, description, header_img, is_public, is_open, created_by, created_at";

const SESSION_COLUMNS: &str =
    "id, project_id, name, category, duration, created_at, ended_at, created_by";

const IDEA_COLUMNS: &str = "id, idea, submitted_by, reacts, num_reacts, created_at";

const TODO_COLUMNS: &str = "id, name, text, done, done_at, user_id, created_at";

pub fn map_project(row: &Row) -> rusqlite::Result<ProjectRecord> {
    Ok(ProjectRecord {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        header_img: row.get("header_img")?,
        is_public: row.get("is_public")?,
        is_open: row.get("is_open")?,
        created_by: row.get("created_by")?,
        created_at: row.get("created_at")?,
    })
}

pub fn map_session(row: &Row) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        name: row.get("name")?,
        category: row.get("category")?,
        duration: row.get("duration")?,
        created_at: row.get("created_at")?,
        ended_at: row.get("ended_at")?,
        created_by: row.get("created_by")?,
    })
}

pub fn map_idea(row: &Row) -> rusqlite::Result<IdeaRecord> {
    let raw: String = row.get("reacts")?;
    let reacts: Reactions = serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(IdeaRecord {
        id: row.get("id")?,
        idea: row.get("idea")?,
        submitted_by: row.get("submitted_by")?,
        reacts,
        num_reacts: row.get("num_reacts")?,
        created_at: row.get("created_at")?,
    })
}

pub fn map_todo(row: &Row) -> rusqlite::Result<TodoRecord> {
    Ok(TodoRecord {
        id: row.get("id")?,
        name: row.get("name")?,
        text: row.get("text")?,
        done: row.get("done")?,
        done_at: row.get("done_at")?,
        user_id: row.get("user_id")?,
        created_at: row.get("created_at")?,
    })
}

/// Convert every record, dropping (and logging) those that fail validation.
fn keep_valid<R, T>(records: Vec<R>, what: &str) -> Vec<T>
where
    T: TryFrom<R, Error = AppError>,
{
    records
        .into_iter()
        .filter_map(|rec| match T::try_from(rec) {
            Ok(model) => Some(model),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed {what} row");
                None
            }
        })
        .collect()
}

fn collect<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> AppResult<Vec<T>> {
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

// ---------------------------
// Projects
// ---------------------------

pub fn select_projects(conn: &Connection, owner: Option<&str>) -> AppResult<Vec<Project>> {
    let sql = format!(
        "SELECT {PROJECT_COLUMNS} FROM projects
         WHERE (?1 IS NULL OR created_by = ?1)
         ORDER BY created_at DESC, id DESC"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let records = collect(stmt.query_map([owner], map_project)?)?;
    Ok(keep_valid(records, "project"))
}

pub fn select_project(conn: &Connection, id: i64) -> AppResult<Option<Project>> {
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1");
    let record = conn.query_row(&sql, [id], map_project).optional()?;
    record.map(Project::try_from).transpose()
}

pub fn insert_project(conn: &Connection, rec: &ProjectRecord) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO projects (name, description, header_img, is_public, is_open, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            rec.name,
            rec.description,
            rec.header_img,
            rec.is_public,
            rec.is_open,
            rec.created_by,
            rec.created_at
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_project(conn: &Connection, rec: &ProjectRecord) -> AppResult<usize> {
    Ok(conn.execute(
        "UPDATE projects
         SET name = ?2, description = ?3, header_img = ?4, is_public = ?5, is_open = ?6
         WHERE id = ?1",
        params![
            rec.id,
            rec.name,
            rec.description,
            rec.header_img,
            rec.is_public,
            rec.is_open
        ],
    )?)
}

/// Remove a project and its sessions. Returns the number of sessions removed.
pub fn delete_project(conn: &Connection, id: i64) -> AppResult<usize> {
    let sessions = conn.execute("DELETE FROM work_sessions WHERE project_id = ?1", [id])?;
    conn.execute("DELETE FROM projects WHERE id = ?1", [id])?;
    Ok(sessions)
}

// ---------------------------
// Work sessions
// ---------------------------

pub fn select_sessions(
    conn: &Connection,
    project_id: i64,
    owner: Option<&str>,
) -> AppResult<Vec<WorkSession>> {
    let sql = format!(
        "SELECT {SESSION_COLUMNS} FROM work_sessions
         WHERE project_id = ?1 AND (?2 IS NULL OR created_by = ?2)
         ORDER BY created_at DESC, id DESC"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let records = collect(stmt.query_map(params![project_id, owner], map_session)?)?;
    Ok(keep_valid(records, "work_sessions"))
}

pub fn select_active_sessions(conn: &Connection, owner: Option<&str>) -> AppResult<Vec<WorkSession>> {
    let sql = format!(
        "SELECT {SESSION_COLUMNS} FROM work_sessions
         WHERE ended_at IS NULL AND (?1 IS NULL OR created_by = ?1)
         ORDER BY created_at DESC, id DESC"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let records = collect(stmt.query_map([owner], map_session)?)?;
    Ok(keep_valid(records, "work_sessions"))
}

/// Every session, used by the aggregation views.
pub fn select_all_sessions(conn: &Connection, owner: Option<&str>) -> AppResult<Vec<WorkSession>> {
    let sql = format!(
        "SELECT {SESSION_COLUMNS} FROM work_sessions
         WHERE (?1 IS NULL OR created_by = ?1)
         ORDER BY created_at DESC, id DESC"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let records = collect(stmt.query_map([owner], map_session)?)?;
    Ok(keep_valid(records, "work_sessions"))
}

pub fn select_session(conn: &Connection, id: i64) -> AppResult<Option<WorkSession>> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM work_sessions WHERE id = ?1");
    let record = conn.query_row(&sql, [id], map_session).optional()?;
    record.map(WorkSession::try_from).transpose()
}

pub fn insert_session(conn: &Connection, rec: &SessionRecord) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO work_sessions (project_id, name, category, duration, created_at, ended_at, created_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            rec.project_id,
            rec.name,
            rec.category,
            rec.duration,
            rec.created_at,
            rec.ended_at,
            rec.created_by
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_session(conn: &Connection, rec: &SessionRecord) -> AppResult<usize> {
    Ok(conn.execute(
        "UPDATE work_sessions
         SET name = ?2, category = ?3, duration = ?4, created_at = ?5, ended_at = ?6
         WHERE id = ?1",
        params![
            rec.id,
            rec.name,
            rec.category,
            rec.duration,
            rec.created_at,
            rec.ended_at
        ],
    )?)
}

/// Close a running session. Matches nothing if it was ended concurrently.
pub fn end_session(conn: &Connection, rec: &SessionRecord) -> AppResult<usize> {
    Ok(conn.execute(
        "UPDATE work_sessions SET ended_at = ?2, duration = ?3
         WHERE id = ?1 AND ended_at IS NULL",
        params![rec.id, rec.ended_at, rec.duration],
    )?)
}

pub fn delete_session(conn: &Connection, id: i64) -> AppResult<usize> {
    Ok(conn.execute("DELETE FROM work_sessions WHERE id = ?1", [id])?)
}

// ---------------------------
// Ideas
// ---------------------------

pub fn select_ideas(conn: &Connection) -> AppResult<Vec<Idea>> {
    let sql = format!(
        "SELECT {IDEA_COLUMNS} FROM ideas ORDER BY num_reacts DESC, created_at DESC, id DESC"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let records = collect(stmt.query_map([], map_idea)?)?;
    Ok(keep_valid(records, "idea"))
}

pub fn select_idea(conn: &Connection, id: i64) -> AppResult<Option<Idea>> {
    let sql = format!("SELECT {IDEA_COLUMNS} FROM ideas WHERE id = ?1");
    let record = conn.query_row(&sql, [id], map_idea).optional()?;
    record.map(Idea::try_from).transpose()
}

pub fn insert_idea(conn: &Connection, rec: &IdeaRecord) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO ideas (idea, submitted_by, reacts, num_reacts, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            rec.idea,
            rec.submitted_by,
            serde_json::to_string(&rec.reacts)?,
            rec.num_reacts,
            rec.created_at
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_idea_reactions(conn: &Connection, rec: &IdeaRecord) -> AppResult<usize> {
    Ok(conn.execute(
        "UPDATE ideas SET reacts = ?2, num_reacts = ?3 WHERE id = ?1",
        params![rec.id, serde_json::to_string(&rec.reacts)?, rec.num_reacts],
    )?)
}

// ---------------------------
// Todos
// ---------------------------

/// Creation order; callers regroup open items ahead of finished ones.
pub fn select_todos(conn: &Connection, owner: &str) -> AppResult<Vec<Todo>> {
    let sql = format!(
        "SELECT {TODO_COLUMNS} FROM todos WHERE user_id = ?1 ORDER BY created_at ASC, id ASC"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let records = collect(stmt.query_map([owner], map_todo)?)?;
    Ok(keep_valid(records, "todo"))
}

pub fn select_todo(conn: &Connection, id: i64) -> AppResult<Option<Todo>> {
    let sql = format!("SELECT {TODO_COLUMNS} FROM todos WHERE id = ?1");
    let record = conn.query_row(&sql, [id], map_todo).optional()?;
    record.map(Todo::try_from).transpose()
}

pub fn insert_todo(conn: &Connection, rec: &TodoRecord) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO todos (name, text, done, done_at, user_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            rec.name,
            rec.text,
            rec.done,
            rec.done_at,
            rec.user_id,
            rec.created_at
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_todo(conn: &Connection, rec: &TodoRecord) -> AppResult<usize> {
    Ok(conn.execute(
        "UPDATE todos SET name = ?2, text = ?3, done = ?4, done_at = ?5 WHERE id = ?1",
        params![rec.id, rec.name, rec.text, rec.done, rec.done_at],
    )?)
}
