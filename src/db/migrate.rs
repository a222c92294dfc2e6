//! Schema migrations, tracked through `PRAGMA user_version`.
//!
//! Each step runs in its own transaction and leaves a `migration_applied`
//! line in the audit log.

use crate::db::log::ttlog;
use crate::errors::{AppError, AppResult};
use rusqlite::Connection;

/// Ensure that the `log` table exists. It predates versioning so it is
/// created unconditionally.
fn ensure_log_table(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS log (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            date      TEXT NOT NULL,
            operation TEXT NOT NULL,
            target    TEXT DEFAULT '',
            message   TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

/// v1: projects and work sessions.
fn create_core_tables(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL CHECK(length(trim(name)) > 0),
            description TEXT NOT NULL DEFAULT '',
            header_img  TEXT,
            is_public   INTEGER NOT NULL DEFAULT 1,
            is_open     INTEGER NOT NULL DEFAULT 1,
            created_by  TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS work_sessions (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id  INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            name        TEXT NOT NULL,
            category    TEXT NOT NULL DEFAULT 'general',
            duration    INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL,
            ended_at    TEXT,
            created_by  TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_projects_owner ON projects(created_by);
        CREATE INDEX IF NOT EXISTS idx_sessions_project ON work_sessions(project_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_sessions_active ON work_sessions(created_by, ended_at);
        "#,
    )?;
    Ok(())
}

/// v2: ideas board.
fn create_ideas_table(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS ideas (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            idea         TEXT NOT NULL,
            submitted_by TEXT NOT NULL,
            reacts       TEXT NOT NULL DEFAULT '{}',
            num_reacts   INTEGER NOT NULL DEFAULT 0,
            created_at   TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

/// v3: private todo lists.
fn create_todos_table(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS todos (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            name       TEXT NOT NULL CHECK(length(trim(name)) > 0),
            text       TEXT NOT NULL DEFAULT '',
            done       INTEGER NOT NULL DEFAULT 0,
            done_at    TEXT,
            user_id    TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_todos_owner ON todos(user_id, created_at);
        "#,
    )?;
    Ok(())
}

type Step = fn(&Connection) -> AppResult<()>;

const MIGRATIONS: &[(&str, Step)] = &[
    ("001_projects_and_sessions", create_core_tables),
    ("002_ideas", create_ideas_table),
    ("003_todos", create_todos_table),
];

pub fn schema_version(conn: &Connection) -> AppResult<i64> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

/// Latest schema version this build knows how to create.
pub fn latest_version() -> i64 {
    MIGRATIONS.len() as i64
}

/// Public entry point: run all pending migrations.
pub fn run_pending_migrations(conn: &mut Connection) -> AppResult<()> {
    ensure_log_table(conn)?;

    let current = schema_version(conn)?;
    if current > latest_version() {
        return Err(AppError::Migration(format!(
            "database schema v{current} is newer than this build (v{})",
            latest_version()
        )));
    }

    for (index, (name, step)) in MIGRATIONS.iter().enumerate().skip(current as usize) {
        let version = index as i64 + 1;
        let tx = conn.transaction()?;
        step(&tx).map_err(|e| AppError::Migration(format!("{name}: {e}")))?;
        tx.pragma_update(None, "user_version", version)?;
        ttlog(&tx, "migration_applied", name, &format!("schema v{version}"))?;
        tx.commit()?;
        tracing::info!(migration = name, version, "migration applied");
    }

    Ok(())
}
