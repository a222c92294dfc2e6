//! Backend abstraction: the capability set the reconciler and the CLI talk
//! to. Two implementations are interchangeable: the SQLite relational store
//! (`crate::db::store`) and the on-device key/value store
//! (`crate::local::store`).

pub mod feed;

use crate::config::{BackendKind, Config};
use crate::core::visibility;
use crate::db::store::SqliteRepository;
use crate::errors::AppResult;
use crate::local::kv::FileStore;
use crate::local::store::LocalRepository;
use crate::models::actor::ActorId;
use crate::models::change::ChangeEvent;
use crate::models::idea::{Idea, IdeaId, Reaction};
use crate::models::project::{Project, ProjectDraft, ProjectId, ProjectPatch};
use crate::models::session::{SessionDraft, SessionId, SessionPatch, WorkSession};
use crate::models::todo::{Todo, TodoId, TodoPatch};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use feed::ActiveSessionFeed;

/// Who is asking, and whether universe mode is on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    pub actor: Option<ActorId>,
    pub show_all: bool,
}

impl Scope {
    pub fn new(actor: Option<ActorId>, show_all: bool) -> Self {
        Self { actor, show_all }
    }

    pub fn owner_pushdown(&self) -> Option<&ActorId> {
        visibility::owner_pushdown(self.actor.as_ref(), self.show_all)
    }

    pub fn visible<T: crate::models::actor::Owned>(&self, items: Vec<T>) -> Vec<T> {
        visibility::filter(items, self.actor.as_ref(), self.show_all)
    }
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Newest first.
    async fn list_projects(&self, scope: &Scope) -> AppResult<Vec<Project>>;
    async fn get_project(&self, id: ProjectId) -> AppResult<Project>;
    async fn create_project(&self, draft: ProjectDraft) -> AppResult<Project>;
    async fn update_project(
        &self,
        id: ProjectId,
        actor: &ActorId,
        patch: ProjectPatch,
    ) -> AppResult<Project>;
    async fn delete_project(&self, id: ProjectId, actor: &ActorId) -> AppResult<()>;

    /// Ordered by start time, newest first.
    async fn list_sessions(&self, project_id: ProjectId, scope: &Scope)
    -> AppResult<Vec<WorkSession>>;
    async fn get_session(&self, id: SessionId) -> AppResult<WorkSession>;
    async fn create_session(&self, draft: SessionDraft) -> AppResult<WorkSession>;
    /// Fails with `AlreadyEnded` if the session is not running.
    async fn end_session(&self, id: SessionId, ended_at: DateTime<Utc>) -> AppResult<WorkSession>;
    async fn update_session(&self, id: SessionId, patch: SessionPatch) -> AppResult<WorkSession>;
    async fn delete_session(&self, id: SessionId) -> AppResult<()>;

    /// Every session within scope across projects, newest start first.
    async fn list_all_sessions(&self, scope: &Scope) -> AppResult<Vec<WorkSession>>;

    /// Running sessions within scope, newest start first.
    async fn list_active_sessions(&self, scope: &Scope) -> AppResult<Vec<WorkSession>>;

    /// The most recently started running session within scope.
    async fn get_active_session(&self, scope: &Scope) -> AppResult<Option<WorkSession>> {
        let active = self.list_active_sessions(scope).await?;
        Ok(most_recent(active))
    }

    /// Raw change channel. Prefer [`ActiveSessionFeed`] for active-session
    /// views.
    fn changes(&self) -> broadcast::Receiver<ChangeEvent>;
}

#[async_trait]
pub trait IdeaRepository: Send + Sync {
    async fn submit_idea(&self, actor: &ActorId, text: &str) -> AppResult<Idea>;
    /// Most reactions first.
    async fn list_ideas(&self) -> AppResult<Vec<Idea>>;
    async fn toggle_reaction(
        &self,
        id: IdeaId,
        actor: &ActorId,
        reaction: Reaction,
    ) -> AppResult<Idea>;
}

/// Private checklist. Every call is made on behalf of a signed-in actor and
/// only ever touches that actor's items.
#[async_trait]
pub trait TodoRepository: Send + Sync {
    async fn add_todo(&self, actor: &ActorId, name: &str) -> AppResult<Todo>;
    /// Open items first, each group oldest first.
    async fn list_todos(&self, actor: &ActorId) -> AppResult<Vec<Todo>>;
    async fn update_todo(&self, id: TodoId, actor: &ActorId, patch: TodoPatch) -> AppResult<Todo>;
    async fn toggle_todo(&self, id: TodoId, actor: &ActorId) -> AppResult<Todo>;
}

/// Newest start wins; ties go to the higher id so the pick is deterministic.
pub fn most_recent(sessions: impl IntoIterator<Item = WorkSession>) -> Option<WorkSession> {
    sessions
        .into_iter()
        .max_by(|a, b| (a.started_at, a.id).cmp(&(b.started_at, b.id)))
}

/// Sort newest start first, the order every session list is returned in.
pub fn sort_newest_first(sessions: &mut [WorkSession]) {
    sessions.sort_by(|a, b| (b.started_at, b.id).cmp(&(a.started_at, a.id)));
}

/// Every capability set of the configured backend.
pub struct Backend {
    pub sessions: Arc<dyn SessionRepository>,
    pub ideas: Arc<dyn IdeaRepository>,
    pub todos: Arc<dyn TodoRepository>,
    sqlite: Option<Arc<SqliteRepository>>,
}

impl Backend {
    pub fn open(cfg: &Config) -> AppResult<Self> {
        match cfg.backend {
            BackendKind::Sqlite => {
                let repo = Arc::new(SqliteRepository::open(&cfg.database)?);
                Ok(Self::from_sqlite(repo))
            }
            BackendKind::Local => {
                let kv = Arc::new(FileStore::open(&cfg.local_store)?);
                Ok(Self::from_local(Arc::new(LocalRepository::new(kv))))
            }
        }
    }

    pub fn from_sqlite(repo: Arc<SqliteRepository>) -> Self {
        Self {
            sessions: repo.clone(),
            ideas: repo.clone(),
            todos: repo.clone(),
            sqlite: Some(repo),
        }
    }

    pub fn from_local(repo: Arc<LocalRepository>) -> Self {
        Self {
            sessions: repo.clone(),
            ideas: repo.clone(),
            todos: repo,
            sqlite: None,
        }
    }

    /// Start noticing commits made by other processes, when the backend can.
    pub fn watch_external_changes(
        &self,
        every: Duration,
        cancel: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        self.sqlite
            .as_ref()
            .map(|repo| SqliteRepository::spawn_change_poller(repo.clone(), every, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::parse_instant;

    fn session(id: SessionId, start: &str) -> WorkSession {
        SessionDraft::new(1, "s", ActorId::new("a"), parse_instant(start).unwrap())
            .into_session(id)
            .unwrap()
    }

    #[test]
    fn most_recent_prefers_latest_start_then_id() {
        let picked = most_recent(vec![
            session(1, "2025-01-01T10:00:00Z"),
            session(3, "2025-01-01T09:00:00Z"),
            session(2, "2025-01-01T10:00:00Z"),
        ])
        .unwrap();
        assert_eq!(picked.id, 2);
        assert!(most_recent(Vec::new()).is_none());
    }

    #[test]
    fn sort_puts_newest_first() {
        let mut list = vec![
            session(1, "2025-01-01T08:00:00Z"),
            session(2, "2025-01-01T10:00:00Z"),
        ];
        sort_newest_first(&mut list);
        assert_eq!(list[0].id, 2);
    }
}
