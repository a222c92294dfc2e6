use serde::Serialize;

/// Tables the store announces changes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Projects,
    WorkSessions,
    Ideas,
    Todos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// "Something changed" signal published by a repository after a write.
///
/// `row_id` is `None` when the change was detected from outside this process
/// and the affected row is unknown. Consumers re-fetch instead of applying
/// the event as a delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub row_id: Option<i64>,
}

impl ChangeEvent {
    pub fn new(table: Table, kind: ChangeKind, row_id: i64) -> Self {
        Self {
            table,
            kind,
            row_id: Some(row_id),
        }
    }

    pub fn external(table: Table) -> Self {
        Self {
            table,
            kind: ChangeKind::Update,
            row_id: None,
        }
    }

    pub fn touches_sessions(&self) -> bool {
        self.table == Table::WorkSessions
    }
}
