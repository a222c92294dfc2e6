//! On-device backend: every record lives as JSON in a [`KeyValueStore`].
//!
//! Layout: `projects` holds the project list, `sessions_{project_id}` each
//! project's sessions, `ideas` the ideas board and `todos_{actor}` each
//! actor's checklist. Ids are minted from the wall clock in milliseconds and
//! forced to be strictly increasing.
//!
//! Entries that fail to parse are skipped on read but written back untouched,
//! so a later save never destroys data this build cannot understand.

use super::kv::KeyValueStore;
use crate::core::ideas;
use crate::errors::{AppError, AppResult};
use crate::models::actor::ActorId;
use crate::models::change::{ChangeEvent, ChangeKind, Table};
use crate::models::idea::{Idea, IdeaId, IdeaRecord, Reaction};
use crate::models::project::{
    Project, ProjectDraft, ProjectId, ProjectPatch, ProjectRecord, ensure_project_owner,
};
use crate::models::session::{SessionDraft, SessionId, SessionPatch, SessionRecord, WorkSession};
use crate::models::todo::{self, Todo, TodoId, TodoPatch, TodoRecord, ensure_todo_owner};
use crate::repository::{IdeaRepository, Scope, SessionRepository, TodoRepository, sort_newest_first};
use crate::utils::time::truncate_to_seconds;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::{Mutex, broadcast};

pub const PROJECTS_KEY: &str = "projects";
pub const IDEAS_KEY: &str = "ideas";
const CHANGE_CAPACITY: usize = 64;

pub fn sessions_key(project_id: ProjectId) -> String {
    format!("sessions_{project_id}")
}

const TODOS_PREFIX: &str = "todos_";

pub fn todos_key(actor: &ActorId) -> String {
    format!("{TODOS_PREFIX}{actor}")
}

/// The contents of one key: the records that validated, plus the raw
/// entries that did not.
struct Stored<T> {
    items: Vec<T>,
    unreadable: Vec<Value>,
}

pub struct LocalRepository {
    kv: Arc<dyn KeyValueStore>,
    changes: broadcast::Sender<ChangeEvent>,
    last_id: AtomicI64,
    // Serializes read-modify-write cycles on the key/value store.
    write: Mutex<()>,
}

impl LocalRepository {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            kv,
            changes,
            last_id: AtomicI64::new(0),
            write: Mutex::new(()),
        }
    }

    fn mint_id(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut prev = self.last_id.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self
                .last_id
                .compare_exchange(prev, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    fn publish(&self, table: Table, kind: ChangeKind, id: i64) {
        let _ = self.changes.send(ChangeEvent::new(table, kind, id));
    }

    /// Read a JSON array of records. Entries that do not parse or do not
    /// validate are set aside for [`Self::save`] to write back.
    fn load<R, T>(&self, key: &str) -> AppResult<Stored<T>>
    where
        R: DeserializeOwned,
        T: TryFrom<R, Error = AppError>,
    {
        let mut stored = Stored {
            items: Vec::new(),
            unreadable: Vec::new(),
        };
        let Some(raw) = self.kv.get(key)? else {
            return Ok(stored);
        };
        let values: Vec<Value> = serde_json::from_str(&raw)?;
        for value in values {
            match serde_json::from_value::<R>(value.clone())
                .map_err(AppError::from)
                .and_then(T::try_from)
            {
                Ok(model) => stored.items.push(model),
                Err(e) => {
                    tracing::warn!(key, error = %e, "skipping malformed stored record");
                    stored.unreadable.push(value);
                }
            }
        }
        Ok(stored)
    }

    fn save<R: Serialize>(&self, key: &str, records: &[R], unreadable: &[Value]) -> AppResult<()> {
        let mut values = Vec::with_capacity(records.len() + unreadable.len());
        for rec in records {
            values.push(serde_json::to_value(rec)?);
        }
        values.extend_from_slice(unreadable);
        self.kv.set(key, &serde_json::to_string(&values)?)
    }

    fn projects(&self) -> AppResult<Stored<Project>> {
        self.load::<ProjectRecord, Project>(PROJECTS_KEY)
    }

    fn save_projects(&self, projects: &Stored<Project>) -> AppResult<()> {
        let records: Vec<_> = projects.items.iter().map(Project::to_record).collect();
        self.save(PROJECTS_KEY, &records, &projects.unreadable)
    }

    fn sessions_of(&self, project_id: ProjectId) -> AppResult<Stored<WorkSession>> {
        self.load::<SessionRecord, WorkSession>(&sessions_key(project_id))
    }

    fn save_sessions(&self, project_id: ProjectId, sessions: &Stored<WorkSession>) -> AppResult<()> {
        let records: Vec<_> = sessions.items.iter().map(WorkSession::to_record).collect();
        self.save(&sessions_key(project_id), &records, &sessions.unreadable)
    }

    fn ideas(&self) -> AppResult<Stored<Idea>> {
        self.load::<IdeaRecord, Idea>(IDEAS_KEY)
    }

    fn save_ideas(&self, list: &Stored<Idea>) -> AppResult<()> {
        let records: Vec<_> = list.items.iter().map(Idea::to_record).collect();
        self.save(IDEAS_KEY, &records, &list.unreadable)
    }

    fn todos_of(&self, actor: &ActorId) -> AppResult<Stored<Todo>> {
        self.load::<TodoRecord, Todo>(&todos_key(actor))
    }

    fn save_todos(&self, actor: &ActorId, list: &Stored<Todo>) -> AppResult<()> {
        let records: Vec<_> = list.items.iter().map(Todo::to_record).collect();
        self.save(&todos_key(actor), &records, &list.unreadable)
    }

    /// Every stored session, across projects.
    fn all_sessions(&self) -> AppResult<Vec<WorkSession>> {
        let mut out = Vec::new();
        for project in self.projects()?.items {
            out.extend(self.sessions_of(project.id)?.items);
        }
        Ok(out)
    }

    /// The project a session is filed under, with that project's sessions.
    fn locate(&self, id: SessionId) -> AppResult<(ProjectId, Stored<WorkSession>, usize)> {
        for project in self.projects()?.items {
            let sessions = self.sessions_of(project.id)?;
            if let Some(index) = sessions.items.iter().position(|s| s.id == id) {
                return Ok((project.id, sessions, index));
            }
        }
        Err(AppError::not_found("session", id))
    }

    /// Read-modify-write on one of `actor`'s todos.
    async fn change_todo(
        &self,
        id: TodoId,
        actor: &ActorId,
        change: impl FnOnce(&Todo) -> AppResult<Todo> + Send,
    ) -> AppResult<Todo> {
        let _guard = self.write.lock().await;
        let mut list = self.todos_of(actor)?;
        let slot = match list.items.iter_mut().find(|t| t.id == id) {
            Some(slot) => slot,
            None => return Err(self.missing_todo(id, actor)?),
        };
        ensure_todo_owner(slot, actor)?;
        *slot = change(slot)?;
        let updated = slot.clone();
        self.save_todos(actor, &list)?;

        self.publish(Table::Todos, ChangeKind::Update, id);
        Ok(updated)
    }

    /// Todos are filed per owner, so an id absent from the caller's list is
    /// either someone else's or gone.
    fn missing_todo(&self, id: TodoId, actor: &ActorId) -> AppResult<AppError> {
        let own = todos_key(actor);
        for key in self.kv.keys_with_prefix(TODOS_PREFIX)? {
            if key == own {
                continue;
            }
            let other = self.load::<TodoRecord, Todo>(&key)?;
            if other.items.iter().any(|t| t.id == id) {
                return Ok(AppError::NotOwner(format!("todo {id}")));
            }
        }
        Ok(AppError::not_found("todo", id))
    }
}

#[async_trait]
impl SessionRepository for LocalRepository {
    async fn list_projects(&self, scope: &Scope) -> AppResult<Vec<Project>> {
        let mut projects = scope.visible(self.projects()?.items);
        projects.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(projects)
    }

    async fn get_project(&self, id: ProjectId) -> AppResult<Project> {
        self.projects()?
            .items
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| AppError::not_found("project", id))
    }

    async fn create_project(&self, draft: ProjectDraft) -> AppResult<Project> {
        let _guard = self.write.lock().await;
        let project = draft.into_project(self.mint_id(), truncate_to_seconds(Utc::now()))?;
        let mut projects = self.projects()?;
        projects.items.push(project.clone());
        self.save_projects(&projects)?;

        self.publish(Table::Projects, ChangeKind::Insert, project.id);
        Ok(project)
    }

    async fn update_project(
        &self,
        id: ProjectId,
        actor: &ActorId,
        patch: ProjectPatch,
    ) -> AppResult<Project> {
        let _guard = self.write.lock().await;
        let mut projects = self.projects()?;
        let slot = projects
            .items
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| AppError::not_found("project", id))?;
        ensure_project_owner(slot, actor)?;
        *slot = patch.apply_to(slot)?;
        let updated = slot.clone();
        self.save_projects(&projects)?;

        self.publish(Table::Projects, ChangeKind::Update, id);
        Ok(updated)
    }

    async fn delete_project(&self, id: ProjectId, actor: &ActorId) -> AppResult<()> {
        let _guard = self.write.lock().await;
        let mut projects = self.projects()?;
        let project = projects
            .items
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| AppError::not_found("project", id))?;
        ensure_project_owner(project, actor)?;
        let had_sessions = !self.sessions_of(id)?.items.is_empty();

        projects.items.retain(|p| p.id != id);
        self.save_projects(&projects)?;
        self.kv.remove(&sessions_key(id))?;

        self.publish(Table::Projects, ChangeKind::Delete, id);
        if had_sessions {
            self.publish(Table::WorkSessions, ChangeKind::Delete, id);
        }
        Ok(())
    }

    async fn list_sessions(&self, project_id: ProjectId, scope: &Scope) -> AppResult<Vec<WorkSession>> {
        let mut sessions = scope.visible(self.sessions_of(project_id)?.items);
        sort_newest_first(&mut sessions);
        Ok(sessions)
    }

    async fn get_session(&self, id: SessionId) -> AppResult<WorkSession> {
        let (_, sessions, index) = self.locate(id)?;
        Ok(sessions.items[index].clone())
    }

    async fn create_session(&self, draft: SessionDraft) -> AppResult<WorkSession> {
        draft.validate()?;
        let _guard = self.write.lock().await;
        if !self.projects()?.items.iter().any(|p| p.id == draft.project_id) {
            return Err(AppError::not_found("project", draft.project_id));
        }

        let project_id = draft.project_id;
        // Round-trip through the record so the caller sees exactly what a
        // later read returns.
        let session = WorkSession::try_from(draft.into_session(self.mint_id())?.to_record())?;
        let mut sessions = self.sessions_of(project_id)?;
        sessions.items.push(session.clone());
        self.save_sessions(project_id, &sessions)?;

        self.publish(Table::WorkSessions, ChangeKind::Insert, session.id);
        Ok(session)
    }

    async fn end_session(&self, id: SessionId, ended_at: DateTime<Utc>) -> AppResult<WorkSession> {
        let _guard = self.write.lock().await;
        let (project_id, mut sessions, index) = self.locate(id)?;
        let ended = WorkSession::try_from(sessions.items[index].ended(ended_at)?.to_record())?;
        sessions.items[index] = ended.clone();
        self.save_sessions(project_id, &sessions)?;

        self.publish(Table::WorkSessions, ChangeKind::Update, id);
        Ok(ended)
    }

    async fn update_session(&self, id: SessionId, patch: SessionPatch) -> AppResult<WorkSession> {
        let _guard = self.write.lock().await;
        let (project_id, mut sessions, index) = self.locate(id)?;
        let updated = WorkSession::try_from(patch.apply_to(&sessions.items[index])?.to_record())?;
        sessions.items[index] = updated.clone();
        self.save_sessions(project_id, &sessions)?;

        self.publish(Table::WorkSessions, ChangeKind::Update, id);
        Ok(updated)
    }

    async fn delete_session(&self, id: SessionId) -> AppResult<()> {
        let _guard = self.write.lock().await;
        let (project_id, mut sessions, index) = self.locate(id)?;
        sessions.items.remove(index);
        self.save_sessions(project_id, &sessions)?;

        self.publish(Table::WorkSessions, ChangeKind::Delete, id);
        Ok(())
    }

    async fn list_all_sessions(&self, scope: &Scope) -> AppResult<Vec<WorkSession>> {
        let mut all = scope.visible(self.all_sessions()?);
        sort_newest_first(&mut all);
        Ok(all)
    }

    async fn list_active_sessions(&self, scope: &Scope) -> AppResult<Vec<WorkSession>> {
        let running = self
            .all_sessions()?
            .into_iter()
            .filter(WorkSession::is_running)
            .collect();
        let mut active = scope.visible(running);
        sort_newest_first(&mut active);
        Ok(active)
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}

#[async_trait]
impl IdeaRepository for LocalRepository {
    async fn submit_idea(&self, actor: &ActorId, text: &str) -> AppResult<Idea> {
        let text = ideas::normalize_text(text)?;
        let _guard = self.write.lock().await;
        let idea = Idea {
            id: self.mint_id(),
            text,
            submitted_by: actor.clone(),
            reacts: Default::default(),
            num_reacts: 0,
            created_at: truncate_to_seconds(Utc::now()),
        };
        let mut list = self.ideas()?;
        list.items.push(idea.clone());
        self.save_ideas(&list)?;

        self.publish(Table::Ideas, ChangeKind::Insert, idea.id);
        Ok(idea)
    }

    async fn list_ideas(&self) -> AppResult<Vec<Idea>> {
        let mut list = self.ideas()?.items;
        ideas::sort_by_popularity(&mut list);
        Ok(list)
    }

    async fn toggle_reaction(
        &self,
        id: IdeaId,
        actor: &ActorId,
        reaction: Reaction,
    ) -> AppResult<Idea> {
        let _guard = self.write.lock().await;
        let mut list = self.ideas()?;
        let slot = list
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| AppError::not_found("idea", id))?;
        *slot = ideas::toggle_reaction(slot, actor, reaction);
        let toggled = slot.clone();
        self.save_ideas(&list)?;

        self.publish(Table::Ideas, ChangeKind::Update, id);
        Ok(toggled)
    }
}

#[async_trait]
impl TodoRepository for LocalRepository {
    async fn add_todo(&self, actor: &ActorId, name: &str) -> AppResult<Todo> {
        let _guard = self.write.lock().await;
        let todo = Todo::new(self.mint_id(), name, actor.clone(), truncate_to_seconds(Utc::now()))?;
        let mut list = self.todos_of(actor)?;
        list.items.push(todo.clone());
        self.save_todos(actor, &list)?;

        self.publish(Table::Todos, ChangeKind::Insert, todo.id);
        Ok(todo)
    }

    async fn list_todos(&self, actor: &ActorId) -> AppResult<Vec<Todo>> {
        let mut list = self.todos_of(actor)?.items;
        // Filed under the owner's key, but a hand-edited entry may claim
        // another owner.
        list.retain(|t| t.user_id == *actor);
        todo::sort_for_display(&mut list);
        Ok(list)
    }

    async fn update_todo(&self, id: TodoId, actor: &ActorId, patch: TodoPatch) -> AppResult<Todo> {
        self.change_todo(id, actor, |current| patch.apply_to(current)).await
    }

    async fn toggle_todo(&self, id: TodoId, actor: &ActorId) -> AppResult<Todo> {
        let now = truncate_to_seconds(Utc::now());
        self.change_todo(id, actor, |current| Ok(current.toggled(now))).await
    }
}
