//! Audit trail kept in the `log` table. Lines are written inside the same
//! transaction as the change they describe.

use crate::errors::AppResult;
use crate::utils::time::format_instant;
use chrono::Utc;
use rusqlite::{Connection, params};
use serde::Serialize;

/// Append one audit line.
pub fn ttlog(conn: &Connection, operation: &str, target: &str, message: &str) -> AppResult<()> {
    conn.prepare_cached("INSERT INTO log (date, operation, target, message) VALUES (?1, ?2, ?3, ?4)")?
        .execute(params![format_instant(&Utc::now()), operation, target, message])?;
    tracing::trace!(operation, target, "audit line written");
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub id: i64,
    pub date: String,
    pub operation: String,
    pub target: String,
    pub message: String,
}

/// Every audit line, oldest first.
pub fn load_log(conn: &Connection) -> AppResult<Vec<LogEntry>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, date, operation, IFNULL(target, ''), message FROM log ORDER BY id ASC",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(LogEntry {
            id: row.get(0)?,
            date: row.get(1)?,
            operation: row.get(2)?,
            target: row.get(3)?,
            message: row.get(4)?,
        })
    })?;

    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}
