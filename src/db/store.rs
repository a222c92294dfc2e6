//! Relational backend: projects, work sessions, ideas and todos in SQLite.
//!
//! Every committed write is announced on the change channel. Commits made by
//! other processes on the same file are picked up by the `data_version`
//! poller (see [`SqliteRepository::spawn_change_poller`]).

use super::log::{LogEntry, load_log, ttlog};
use super::migrate::run_pending_migrations;
use super::pool::DbPool;
use super::queries;
use crate::core::ideas;
use crate::errors::{AppError, AppResult};
use crate::models::actor::ActorId;
use crate::models::change::{ChangeEvent, ChangeKind, Table};
use crate::models::idea::{Idea, IdeaId, Reaction};
use crate::models::project::{Project, ProjectDraft, ProjectId, ProjectPatch, ensure_project_owner};
use crate::models::session::{SessionDraft, SessionId, SessionPatch, WorkSession};
use crate::models::todo::{self, Todo, TodoId, TodoPatch, ensure_todo_owner};
use crate::repository::{IdeaRepository, Scope, SessionRepository, TodoRepository};
use crate::utils::time::truncate_to_seconds;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const CHANGE_CAPACITY: usize = 64;

pub struct SqliteRepository {
    pool: Mutex<DbPool>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl SqliteRepository {
    /// Open (creating if needed) the database at `path` and migrate it.
    pub fn open(path: &str) -> AppResult<Self> {
        Self::with_pool(DbPool::new(path)?)
    }

    pub fn in_memory() -> AppResult<Self> {
        Self::with_pool(DbPool::in_memory()?)
    }

    fn with_pool(mut pool: DbPool) -> AppResult<Self> {
        pool.with_conn(run_pending_migrations)?;
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Ok(Self {
            pool: Mutex::new(pool),
            changes,
        })
    }

    fn publish(&self, table: Table, kind: ChangeKind, id: i64) {
        // No subscribers is fine.
        let _ = self.changes.send(ChangeEvent::new(table, kind, id));
    }

    /// Append an audit line outside of any store operation.
    pub async fn audit(&self, operation: &str, target: &str, message: &str) -> AppResult<()> {
        let pool = self.pool.lock().await;
        ttlog(&pool.conn, operation, target, message)
    }

    /// Audit lines, oldest first.
    pub async fn audit_log(&self) -> AppResult<Vec<LogEntry>> {
        let pool = self.pool.lock().await;
        load_log(&pool.conn)
    }

    /// Poll `PRAGMA data_version` and announce commits made by other
    /// connections. Runs until `cancel` fires.
    pub fn spawn_change_poller(
        repo: Arc<Self>,
        every: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut last: Option<i64> = None;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("change poller stopped");
                        break;
                    }
                    _ = interval.tick() => {}
                }

                let version = {
                    let pool = repo.pool.lock().await;
                    pool.data_version()
                };
                match version {
                    Ok(v) if last.is_some_and(|prev| prev != v) => {
                        tracing::debug!(data_version = v, "external commit detected");
                        for table in [Table::Projects, Table::WorkSessions, Table::Ideas, Table::Todos] {
                            let _ = repo.changes.send(ChangeEvent::external(table));
                        }
                        last = Some(v);
                    }
                    Ok(v) => last = Some(v),
                    Err(e) => tracing::warn!(error = %e, "failed to read data_version"),
                }
            }
        })
    }

    async fn require_project(&self, id: ProjectId) -> AppResult<Project> {
        let pool = self.pool.lock().await;
        queries::select_project(&pool.conn, id)?.ok_or_else(|| AppError::not_found("project", id))
    }
}

#[async_trait]
impl SessionRepository for SqliteRepository {
    async fn list_projects(&self, scope: &Scope) -> AppResult<Vec<Project>> {
        let owner = scope.owner_pushdown().map(ActorId::as_str);
        let pool = self.pool.lock().await;
        let rows = queries::select_projects(&pool.conn, owner)?;
        Ok(scope.visible(rows))
    }

    async fn get_project(&self, id: ProjectId) -> AppResult<Project> {
        self.require_project(id).await
    }

    async fn create_project(&self, draft: ProjectDraft) -> AppResult<Project> {
        draft.validate()?;
        let created_at = truncate_to_seconds(Utc::now());

        let mut pool = self.pool.lock().await;
        let project = pool.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut rec = draft.into_project(0, created_at)?.to_record();
            rec.id = queries::insert_project(&tx, &rec)?;
            ttlog(&tx, "project_add", &rec.id.to_string(), &rec.name)?;
            tx.commit()?;
            Project::try_from(rec)
        })?;
        drop(pool);

        tracing::info!(project = project.id, "project created");
        self.publish(Table::Projects, ChangeKind::Insert, project.id);
        Ok(project)
    }

    async fn update_project(
        &self,
        id: ProjectId,
        actor: &ActorId,
        patch: ProjectPatch,
    ) -> AppResult<Project> {
        let mut pool = self.pool.lock().await;
        let project = pool.with_conn(|conn| {
            let tx = conn.transaction()?;
            let current = queries::select_project(&tx, id)?
                .ok_or_else(|| AppError::not_found("project", id))?;
            ensure_project_owner(&current, actor)?;
            let updated = patch.apply_to(&current)?;
            queries::update_project(&tx, &updated.to_record())?;
            ttlog(&tx, "project_edit", &id.to_string(), &updated.name)?;
            tx.commit()?;
            Ok(updated)
        })?;
        drop(pool);

        self.publish(Table::Projects, ChangeKind::Update, id);
        Ok(project)
    }

    async fn delete_project(&self, id: ProjectId, actor: &ActorId) -> AppResult<()> {
        let mut pool = self.pool.lock().await;
        let removed = pool.with_conn(|conn| {
            let tx = conn.transaction()?;
            let current = queries::select_project(&tx, id)?
                .ok_or_else(|| AppError::not_found("project", id))?;
            ensure_project_owner(&current, actor)?;
            let removed = queries::delete_project(&tx, id)?;
            ttlog(
                &tx,
                "project_del",
                &id.to_string(),
                &format!("{} ({removed} sessions)", current.name),
            )?;
            tx.commit()?;
            Ok(removed)
        })?;
        drop(pool);

        tracing::info!(project = id, sessions = removed, "project deleted");
        self.publish(Table::Projects, ChangeKind::Delete, id);
        if removed > 0 {
            self.publish(Table::WorkSessions, ChangeKind::Delete, id);
        }
        Ok(())
    }

    async fn list_sessions(&self, project_id: ProjectId, scope: &Scope) -> AppResult<Vec<WorkSession>> {
        let owner = scope.owner_pushdown().map(ActorId::as_str);
        let pool = self.pool.lock().await;
        let rows = queries::select_sessions(&pool.conn, project_id, owner)?;
        Ok(scope.visible(rows))
    }

    async fn get_session(&self, id: SessionId) -> AppResult<WorkSession> {
        let pool = self.pool.lock().await;
        queries::select_session(&pool.conn, id)?.ok_or_else(|| AppError::not_found("session", id))
    }

    async fn create_session(&self, draft: SessionDraft) -> AppResult<WorkSession> {
        draft.validate()?;
        self.require_project(draft.project_id).await?;

        let mut pool = self.pool.lock().await;
        let session = pool.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut rec = draft.into_session(0)?.to_record();
            rec.id = queries::insert_session(&tx, &rec)?;
            ttlog(&tx, "session_start", &rec.id.to_string(), &rec.name)?;
            tx.commit()?;
            WorkSession::try_from(rec)
        })?;
        drop(pool);

        tracing::info!(session = session.id, running = session.is_running(), "session created");
        self.publish(Table::WorkSessions, ChangeKind::Insert, session.id);
        Ok(session)
    }

    async fn end_session(&self, id: SessionId, ended_at: DateTime<Utc>) -> AppResult<WorkSession> {
        let mut pool = self.pool.lock().await;
        let session = pool.with_conn(|conn| {
            let tx = conn.transaction()?;
            let current = queries::select_session(&tx, id)?
                .ok_or_else(|| AppError::not_found("session", id))?;
            let ended = current.ended(ended_at)?;
            if queries::end_session(&tx, &ended.to_record())? == 0 {
                return Err(AppError::AlreadyEnded(id));
            }
            ttlog(
                &tx,
                "session_stop",
                &id.to_string(),
                &format!("{}s", ended.duration_secs),
            )?;
            tx.commit()?;
            Ok(ended)
        })?;
        drop(pool);

        tracing::info!(session = id, duration = session.duration_secs, "session ended");
        self.publish(Table::WorkSessions, ChangeKind::Update, id);
        Ok(session)
    }

    async fn update_session(&self, id: SessionId, patch: SessionPatch) -> AppResult<WorkSession> {
        let mut pool = self.pool.lock().await;
        let session = pool.with_conn(|conn| {
            let tx = conn.transaction()?;
            let current = queries::select_session(&tx, id)?
                .ok_or_else(|| AppError::not_found("session", id))?;
            let updated = patch.apply_to(&current)?;
            queries::update_session(&tx, &updated.to_record())?;
            ttlog(&tx, "session_edit", &id.to_string(), &updated.name)?;
            tx.commit()?;
            Ok(updated)
        })?;
        drop(pool);

        self.publish(Table::WorkSessions, ChangeKind::Update, id);
        Ok(session)
    }

    async fn delete_session(&self, id: SessionId) -> AppResult<()> {
        let mut pool = self.pool.lock().await;
        pool.with_conn(|conn| {
            let tx = conn.transaction()?;
            if queries::delete_session(&tx, id)? == 0 {
                return Err(AppError::not_found("session", id));
            }
            ttlog(&tx, "session_del", &id.to_string(), "")?;
            tx.commit()?;
            Ok(())
        })?;
        drop(pool);

        self.publish(Table::WorkSessions, ChangeKind::Delete, id);
        Ok(())
    }

    async fn list_all_sessions(&self, scope: &Scope) -> AppResult<Vec<WorkSession>> {
        let owner = scope.owner_pushdown().map(ActorId::as_str);
        let pool = self.pool.lock().await;
        let rows = queries::select_all_sessions(&pool.conn, owner)?;
        Ok(scope.visible(rows))
    }

    async fn list_active_sessions(&self, scope: &Scope) -> AppResult<Vec<WorkSession>> {
        let owner = scope.owner_pushdown().map(ActorId::as_str);
        let pool = self.pool.lock().await;
        let rows = queries::select_active_sessions(&pool.conn, owner)?;
        Ok(scope.visible(rows))
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}

#[async_trait]
impl IdeaRepository for SqliteRepository {
    async fn submit_idea(&self, actor: &ActorId, text: &str) -> AppResult<Idea> {
        let text = ideas::normalize_text(text)?;
        let created_at = truncate_to_seconds(Utc::now());

        let mut pool = self.pool.lock().await;
        let idea = pool.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut idea = Idea {
                id: 0,
                text,
                submitted_by: actor.clone(),
                reacts: Default::default(),
                num_reacts: 0,
                created_at,
            };
            idea.id = queries::insert_idea(&tx, &idea.to_record())?;
            ttlog(&tx, "idea_add", &idea.id.to_string(), &idea.text)?;
            tx.commit()?;
            Ok(idea)
        })?;
        drop(pool);

        self.publish(Table::Ideas, ChangeKind::Insert, idea.id);
        Ok(idea)
    }

    async fn list_ideas(&self) -> AppResult<Vec<Idea>> {
        let pool = self.pool.lock().await;
        let mut list = queries::select_ideas(&pool.conn)?;
        ideas::sort_by_popularity(&mut list);
        Ok(list)
    }

    async fn toggle_reaction(
        &self,
        id: IdeaId,
        actor: &ActorId,
        reaction: Reaction,
    ) -> AppResult<Idea> {
        let mut pool = self.pool.lock().await;
        let idea = pool.with_conn(|conn| {
            let tx = conn.transaction()?;
            let current = queries::select_idea(&tx, id)?
                .ok_or_else(|| AppError::not_found("idea", id))?;
            let toggled = ideas::toggle_reaction(&current, actor, reaction);
            queries::update_idea_reactions(&tx, &toggled.to_record())?;
            tx.commit()?;
            Ok(toggled)
        })?;
        drop(pool);

        self.publish(Table::Ideas, ChangeKind::Update, id);
        Ok(idea)
    }
}

impl SqliteRepository {
    /// Read-modify-write on one of `actor`'s todos, audited as `operation`.
    async fn change_todo(
        &self,
        id: TodoId,
        actor: &ActorId,
        operation: &str,
        change: impl FnOnce(&Todo) -> AppResult<Todo> + Send,
    ) -> AppResult<Todo> {
        let mut pool = self.pool.lock().await;
        let todo = pool.with_conn(|conn| {
            let tx = conn.transaction()?;
            let current =
                queries::select_todo(&tx, id)?.ok_or_else(|| AppError::not_found("todo", id))?;
            ensure_todo_owner(&current, actor)?;
            let next = change(&current)?;
            queries::update_todo(&tx, &next.to_record())?;
            ttlog(&tx, operation, &id.to_string(), &next.name)?;
            tx.commit()?;
            Ok(next)
        })?;
        drop(pool);

        self.publish(Table::Todos, ChangeKind::Update, id);
        Ok(todo)
    }
}

#[async_trait]
impl TodoRepository for SqliteRepository {
    async fn add_todo(&self, actor: &ActorId, name: &str) -> AppResult<Todo> {
        let mut todo = Todo::new(0, name, actor.clone(), truncate_to_seconds(Utc::now()))?;

        let mut pool = self.pool.lock().await;
        let id = pool.with_conn(|conn| {
            let tx = conn.transaction()?;
            let id = queries::insert_todo(&tx, &todo.to_record())?;
            ttlog(&tx, "todo_add", &id.to_string(), &todo.name)?;
            tx.commit()?;
            Ok(id)
        })?;
        drop(pool);
        todo.id = id;

        self.publish(Table::Todos, ChangeKind::Insert, todo.id);
        Ok(todo)
    }

    async fn list_todos(&self, actor: &ActorId) -> AppResult<Vec<Todo>> {
        let pool = self.pool.lock().await;
        let mut list = queries::select_todos(&pool.conn, actor.as_str())?;
        todo::sort_for_display(&mut list);
        Ok(list)
    }

    async fn update_todo(&self, id: TodoId, actor: &ActorId, patch: TodoPatch) -> AppResult<Todo> {
        self.change_todo(id, actor, "todo_edit", |current| patch.apply_to(current))
            .await
    }

    async fn toggle_todo(&self, id: TodoId, actor: &ActorId) -> AppResult<Todo> {
        let now = truncate_to_seconds(Utc::now());
        self.change_todo(id, actor, "todo_done", |current| Ok(current.toggled(now)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::parse_instant;

    fn at(s: &str) -> DateTime<Utc> {
        parse_instant(s).unwrap()
    }

    async fn repo_with_project() -> (SqliteRepository, Project) {
        let repo = SqliteRepository::in_memory().unwrap();
        let project = repo
            .create_project(ProjectDraft::new("Thesis", ActorId::new("alice")))
            .await
            .unwrap();
        (repo, project)
    }

    #[tokio::test]
    async fn writes_are_audited() {
        let (repo, project) = repo_with_project().await;
        let draft = SessionDraft::new(project.id, "Draft", ActorId::new("alice"), at("2025-01-01T10:00:00Z"));
        let s = repo.create_session(draft).await.unwrap();
        repo.end_session(s.id, at("2025-01-01T10:30:00Z")).await.unwrap();

        let ops: Vec<String> = repo
            .audit_log()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.operation)
            .filter(|op| op != "migration_applied")
            .collect();
        assert_eq!(ops, vec!["project_add", "session_start", "session_stop"]);
    }

    #[tokio::test]
    async fn ending_twice_reports_already_ended() {
        let (repo, project) = repo_with_project().await;
        let draft = SessionDraft::new(project.id, "Draft", ActorId::new("alice"), at("2025-01-01T10:00:00Z"));
        let s = repo.create_session(draft).await.unwrap();

        let ended = repo.end_session(s.id, at("2025-01-01T10:00:42Z")).await.unwrap();
        assert_eq!(ended.duration_secs, 42);
        let again = repo.end_session(s.id, at("2025-01-01T11:00:00Z")).await;
        assert!(matches!(again, Err(AppError::AlreadyEnded(_))));
        assert_eq!(repo.get_session(s.id).await.unwrap().duration_secs, 42);
    }

    #[tokio::test]
    async fn sessions_need_an_existing_project() {
        let repo = SqliteRepository::in_memory().unwrap();
        let draft = SessionDraft::new(99, "Orphan", ActorId::new("alice"), at("2025-01-01T10:00:00Z"));
        let err = repo.create_session(draft).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { entity: "project", id: 99 }));
    }

    #[tokio::test]
    async fn malformed_rows_are_skipped_in_lists() {
        let (repo, project) = repo_with_project().await;
        {
            let pool = repo.pool.lock().await;
            pool.conn
                .execute(
                    "INSERT INTO work_sessions (project_id, name, created_at, created_by)
                     VALUES (?1, 'bad', 'yesterday', 'alice')",
                    [project.id],
                )
                .unwrap();
        }
        let scope = Scope::new(Some(ActorId::new("alice")), false);
        assert!(repo.list_active_sessions(&scope).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn external_commits_are_announced() {
        let path = std::env::temp_dir().join("zensession_poller_test.sqlite");
        let _ = std::fs::remove_file(&path);
        let path = path.to_string_lossy().to_string();

        let watcher = Arc::new(SqliteRepository::open(&path).unwrap());
        let writer = SqliteRepository::open(&path).unwrap();
        let mut rx = watcher.changes();
        let cancel = CancellationToken::new();
        let handle = SqliteRepository::spawn_change_poller(
            watcher.clone(),
            Duration::from_millis(20),
            cancel.clone(),
        );

        // Let the poller record a baseline first.
        tokio::time::sleep(Duration::from_millis(60)).await;
        writer
            .create_project(ProjectDraft::new("Shared", ActorId::new("bob")))
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match rx.recv().await {
                    Ok(ev) if ev.touches_sessions() => return ev,
                    _ => continue,
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(event.row_id, None);

        cancel.cancel();
        handle.await.unwrap();
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn todo_writes_are_audited_and_owner_only() {
        let repo = SqliteRepository::in_memory().unwrap();
        let alice = ActorId::new("alice");
        let t = repo.add_todo(&alice, " water plants ").await.unwrap();
        assert_eq!(t.name, "water plants");

        repo.update_todo(t.id, &alice, TodoPatch::rename("water ferns"))
            .await
            .unwrap();
        let done = repo.toggle_todo(t.id, &alice).await.unwrap();
        assert!(done.done && done.done_at.is_some());

        let denied = repo.toggle_todo(t.id, &ActorId::new("bob")).await;
        assert!(matches!(denied, Err(AppError::NotOwner(_))));
        assert!(repo.list_todos(&ActorId::new("bob")).await.unwrap().is_empty());

        let ops: Vec<String> = repo
            .audit_log()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.operation)
            .filter(|op| op != "migration_applied")
            .collect();
        assert_eq!(ops, vec!["todo_add", "todo_edit", "todo_done"]);
    }
}
