use super::actor::{ActorId, Owned};
use crate::errors::{AppError, AppResult};
use crate::utils::time::{format_instant, parse_instant};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type TodoId = i64;

/// A private checklist item. Only its owner ever reads or writes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Todo {
    pub id: TodoId,
    pub name: String,
    pub text: String,
    pub done: bool,
    pub done_at: Option<DateTime<Utc>>,
    pub user_id: ActorId,
    pub created_at: DateTime<Utc>,
}

impl Todo {
    pub fn new(id: TodoId, name: &str, user_id: ActorId, created_at: DateTime<Utc>) -> AppResult<Self> {
        Ok(Todo {
            id,
            name: clean_name(name)?,
            text: String::new(),
            done: false,
            done_at: None,
            user_id,
            created_at,
        })
    }

    /// Flip `done`. Completing stamps `done_at`; reopening clears it.
    pub fn toggled(&self, now: DateTime<Utc>) -> Todo {
        let done = !self.done;
        Todo {
            done,
            done_at: done.then_some(now),
            ..self.clone()
        }
    }

    pub fn to_record(&self) -> TodoRecord {
        TodoRecord {
            id: self.id,
            name: self.name.clone(),
            text: self.text.clone(),
            done: self.done,
            done_at: self.done_at.as_ref().map(format_instant),
            user_id: self.user_id.as_str().to_string(),
            created_at: format_instant(&self.created_at),
        }
    }
}

impl Owned for Todo {
    fn owner(&self) -> Option<&ActorId> {
        Some(&self.user_id)
    }
}

/// Row shape of the `todos` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub done_at: Option<String>,
    pub user_id: String,
    pub created_at: String,
}

impl TryFrom<TodoRecord> for Todo {
    type Error = AppError;

    fn try_from(rec: TodoRecord) -> AppResult<Self> {
        let bad = |what: String| AppError::InvalidRecord(format!("todo {}: {what}", rec.id));
        let name = clean_name(&rec.name).map_err(|e| bad(e.to_string()))?;
        if rec.user_id.trim().is_empty() {
            return Err(bad("missing owner".into()));
        }
        let created_at = parse_instant(&rec.created_at).map_err(|e| bad(e.to_string()))?;
        let done_at = match rec.done_at.as_deref() {
            Some(s) => Some(parse_instant(s).map_err(|e| bad(e.to_string()))?),
            None => None,
        };

        Ok(Todo {
            id: rec.id,
            name,
            text: rec.text,
            done: rec.done,
            // A reopened item never carries a completion time.
            done_at: done_at.filter(|_| rec.done),
            user_id: ActorId::new(rec.user_id),
            created_at,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoPatch {
    pub name: Option<String>,
    pub text: Option<String>,
}

impl TodoPatch {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn note(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn apply_to(&self, current: &Todo) -> AppResult<Todo> {
        let mut out = current.clone();
        if let Some(name) = &self.name {
            out.name = clean_name(name)?;
        }
        if let Some(text) = &self.text {
            out.text = text.clone();
        }
        Ok(out)
    }
}

fn clean_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::EmptyName);
    }
    Ok(name.to_string())
}

/// Owner-only guard shared by both backends.
pub fn ensure_todo_owner(todo: &Todo, actor: &ActorId) -> AppResult<()> {
    if todo.is_owned_by(actor) {
        Ok(())
    } else {
        Err(AppError::NotOwner(format!("todo {}", todo.id)))
    }
}

/// Oldest first, then open items ahead of finished ones. The second sort
/// is stable so creation order survives inside each group.
pub fn sort_for_display(todos: &mut [Todo]) {
    todos.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
    todos.sort_by_key(|t| t.done);
}
