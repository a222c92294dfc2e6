//! Active-session reconciler.
//!
//! Owns the in-memory set of running sessions for one actor scope and keeps
//! it in line with the store. It is the only writer of that set: the UI
//! reads snapshots (see [`ActiveSessionReconciler::subscribe`]) and routes
//! every mutation through `start_session`, `end_session` and
//! `update_session`.
//!
//! Views from the change feed are applied by id, never positionally, so the
//! same view applied twice (or a view that races a mutation response)
//! leaves the same state. Sessions confirmed ended are remembered so a view
//! fetched before the end committed cannot resurrect them.

use crate::config::Config;
use crate::core::prefs;
use crate::core::visibility;
use crate::errors::{AppError, AppResult, ErrorKind};
use crate::local::kv::KeyValueStore;
use crate::models::actor::{ActorId, AuthState, Owned};
use crate::models::project::ProjectId;
use crate::models::session::{SessionDraft, SessionId, SessionPatch, WorkSession};
use crate::repository::{ActiveSessionFeed, Scope, SessionRepository, most_recent, sort_newest_first};
use crate::utils::time::{elapsed_seconds, format_clock, format_duration, truncate_to_seconds};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub const DEFAULT_MUTATION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Upper bound on any store round-trip made by the reconciler.
    pub mutation_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            mutation_timeout: DEFAULT_MUTATION_TIMEOUT,
        }
    }
}

impl From<&Config> for ReconcilerConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            mutation_timeout: Duration::from_secs(cfg.mutation_timeout_secs.max(1)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// `baseline` is the start instant the live clock counts from.
    Running {
        session_id: SessionId,
        baseline: DateTime<Utc>,
    },
}

/// What UI subscribers see after every change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActiveSnapshot {
    /// Every visible running session, newest start first.
    pub sessions: Vec<WorkSession>,
    /// The current actor's authoritative running session.
    pub primary: Option<SessionId>,
}

/// A user-initiated start. With both bounds set it is a backfilled entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub project_id: ProjectId,
    pub name: String,
    pub category: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionRequest {
    pub fn new(project_id: ProjectId, name: impl Into<String>) -> Self {
        Self {
            project_id,
            name: name.into(),
            category: None,
            started_at: None,
            ended_at: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn starting_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = Some(started_at);
        self
    }

    pub fn backfill(mut self, started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> Self {
        self.started_at = Some(started_at);
        self.ended_at = Some(ended_at);
        self
    }

    pub fn is_backfill(&self) -> bool {
        self.ended_at.is_some()
    }

    fn into_draft(self, actor: ActorId, now: DateTime<Utc>) -> SessionDraft {
        let started_at = truncate_to_seconds(self.started_at.unwrap_or(now));
        let mut draft = SessionDraft::new(self.project_id, self.name, actor, started_at);
        if let Some(category) = self.category {
            draft = draft.with_category(category);
        }
        if let Some(end) = self.ended_at {
            draft = draft.ending_at(truncate_to_seconds(end));
        }
        draft
    }
}

/// One-second display refresh for a running session. Never written back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tick {
    pub session_id: SessionId,
    pub elapsed_secs: i64,
    /// `HH:MM:SS`
    pub clock: String,
    /// Human form, e.g. "2 minutes".
    pub label: String,
}

impl Tick {
    fn new(session_id: SessionId, elapsed_secs: i64) -> Self {
        Self {
            session_id,
            elapsed_secs,
            clock: format_clock(elapsed_secs),
            label: format_duration(elapsed_secs),
        }
    }
}

pub struct ActiveSessionReconciler {
    repo: Arc<dyn SessionRepository>,
    prefs: Arc<dyn KeyValueStore>,
    config: ReconcilerConfig,
    auth: AuthState,
    show_all: bool,
    active: BTreeMap<SessionId, WorkSession>,
    ended: HashSet<SessionId>,
    phase: Phase,
    feed: Option<ActiveSessionFeed>,
    snapshots: watch::Sender<ActiveSnapshot>,
}

impl ActiveSessionReconciler {
    pub fn new(
        repo: Arc<dyn SessionRepository>,
        prefs: Arc<dyn KeyValueStore>,
        config: ReconcilerConfig,
    ) -> Self {
        let (snapshots, _) = watch::channel(ActiveSnapshot::default());
        Self {
            repo,
            prefs,
            config,
            auth: AuthState::SignedOut,
            show_all: false,
            active: BTreeMap::new(),
            ended: HashSet::new(),
            phase: Phase::Idle,
            feed: None,
            snapshots,
        }
    }

    // ---------------------------
    // Lifecycle
    // ---------------------------

    /// Application start: subscribe, then load whatever is already running.
    pub async fn start(&mut self, auth: AuthState, show_all: bool) -> AppResult<ActiveSnapshot> {
        let remembered = prefs::stored_active_session(self.prefs.as_ref()).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "could not read remembered active session");
            None
        });

        self.auth = auth;
        self.show_all = show_all;
        self.resubscribe();
        let snapshot = self.refresh().await?;

        match (remembered, self.phase) {
            (Some(id), Phase::Running { session_id, .. }) if id == session_id => {
                tracing::info!(session = id, "resumed running session");
            }
            (Some(id), _) => {
                tracing::debug!(session = id, "remembered session is no longer running");
            }
            (None, _) => {}
        }
        Ok(snapshot)
    }

    /// Sign-in/sign-out or universe-mode toggle. The new feed is open before
    /// the old one is dropped so no change falls in between; a duplicate
    /// view is harmless.
    pub async fn set_scope(&mut self, auth: AuthState, show_all: bool) -> AppResult<ActiveSnapshot> {
        if auth.actor_id() != self.auth.actor_id() {
            self.ended.clear();
            tracing::info!(
                from = ?self.auth.actor_id(),
                to = ?auth.actor_id(),
                "actor changed; re-scoping active sessions"
            );
        }
        self.auth = auth;
        self.show_all = show_all;
        self.resubscribe();
        self.refresh().await
    }

    fn resubscribe(&mut self) {
        let feed = ActiveSessionFeed::open(self.repo.clone(), self.scope());
        if let Some(mut old) = self.feed.replace(feed) {
            old.cancel();
        }
    }

    /// Dispose of the change subscription. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(mut feed) = self.feed.take() {
            feed.cancel();
        }
    }

    /// Re-fetch the active view and reconcile against it.
    pub async fn refresh(&mut self) -> AppResult<ActiveSnapshot> {
        let scope = self.scope();
        let view = bounded(
            self.config.mutation_timeout,
            self.repo.list_active_sessions(&scope),
        )
        .await?;
        // A feed view fetched earlier may still be queued, so tombstones
        // are kept.
        Ok(self.merge_view(view))
    }

    /// Wait for the next change from the store and apply it. `None` once
    /// the subscription is gone.
    pub async fn next_change(&mut self) -> Option<AppResult<ActiveSnapshot>> {
        let view = self.feed.as_mut()?.recv().await?;
        match view {
            Ok(view) => Some(Ok(self.apply_view(view))),
            Err(e) => {
                tracing::warn!(error = %e, "failed to re-fetch active sessions after a change");
                Some(Err(e))
            }
        }
    }

    // ---------------------------
    // Reconciliation
    // ---------------------------

    /// Replace the local set with an authoritative view, merged by id.
    ///
    /// Views are expected in fetch order. Once a view no longer lists an
    /// ended session as running, no older view can follow it, so its
    /// tombstone is dropped.
    pub fn apply_view(&mut self, view: Vec<WorkSession>) -> ActiveSnapshot {
        let still_running: HashSet<SessionId> = view
            .iter()
            .filter(|s| s.is_running())
            .map(|s| s.id)
            .collect();
        self.ended.retain(|id| still_running.contains(id));
        self.merge_view(view)
    }

    fn merge_view(&mut self, view: Vec<WorkSession>) -> ActiveSnapshot {
        let visible = visibility::filter(view, self.auth.actor_id(), self.show_all);
        let mut next = BTreeMap::new();
        for session in visible {
            if !session.is_running() || self.ended.contains(&session.id) {
                continue;
            }
            next.insert(session.id, session);
        }

        let before: Vec<SessionId> = self.active.keys().copied().collect();
        self.active = next;
        if before.iter().ne(self.active.keys()) {
            tracing::debug!(
                before = ?before,
                after = ?self.active.keys().collect::<Vec<_>>(),
                "active set reconciled"
            );
        }
        self.settle()
    }

    /// Recompute the phase from the active set and notify subscribers.
    fn settle(&mut self) -> ActiveSnapshot {
        let previous = self.primary_id();

        let mine: Vec<WorkSession> = match self.auth.actor_id() {
            Some(actor) => self
                .active
                .values()
                .filter(|s| s.is_owned_by(actor))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        if mine.len() > 1 {
            tracing::warn!(
                actor = ?self.auth.actor_id(),
                sessions = ?mine.iter().map(|s| s.id).collect::<Vec<_>>(),
                "more than one running session for one actor; keeping the most recent"
            );
        }

        self.phase = match most_recent(mine) {
            Some(s) => Phase::Running {
                session_id: s.id,
                baseline: s.started_at,
            },
            None => Phase::Idle,
        };

        let current = self.primary_id();
        if current != previous {
            tracing::debug!(from = ?previous, to = ?current, "primary session changed");
            if let Err(e) = prefs::store_active_session(self.prefs.as_ref(), current) {
                tracing::warn!(error = %e, "could not remember active session");
            }
        }

        let snapshot = ActiveSnapshot {
            sessions: self.active_sessions(),
            primary: current,
        };
        self.snapshots.send_replace(snapshot.clone());
        snapshot
    }

    // ---------------------------
    // Mutations
    // ---------------------------

    /// Start a timer, or log a backfilled entry when both bounds are given.
    ///
    /// A second running session is refused locally, before the store is
    /// contacted.
    pub async fn start_session(&mut self, request: SessionRequest) -> AppResult<WorkSession> {
        let actor = self.require_actor()?;
        if let (Phase::Running { session_id, .. }, false) = (self.phase, request.is_backfill()) {
            return Err(AppError::AlreadyActive(session_id));
        }

        let draft = request.into_draft(actor, Utc::now());
        draft.validate()?;

        let session = bounded(self.config.mutation_timeout, self.repo.create_session(draft)).await?;
        if session.is_running() {
            tracing::info!(session = session.id, project = session.project_id, "session started");
            self.active.insert(session.id, session.clone());
            self.settle();
        } else {
            tracing::info!(
                session = session.id,
                duration = session.duration_secs,
                "backfilled session logged"
            );
        }
        Ok(session)
    }

    /// End a running session. It leaves the local set immediately and comes
    /// back if the store cannot confirm the end.
    pub async fn end_session(&mut self, id: SessionId) -> AppResult<WorkSession> {
        let actor = self.require_actor()?;
        self.ensure_owner(id, &actor).await?;

        let removed = self.active.remove(&id);
        self.settle();

        let result = bounded(
            self.config.mutation_timeout,
            self.repo.end_session(id, Utc::now()),
        )
        .await;

        match result {
            Ok(session) => {
                tracing::info!(session = id, duration = session.duration_secs, "session ended");
                self.ended.insert(id);
                Ok(session)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(session = id, error = %e, "session already gone; dropping it");
                self.ended.insert(id);
                self.refresh_quietly().await;
                Err(e)
            }
            Err(e) => {
                tracing::warn!(session = id, error = %e, "end not confirmed; rolling back");
                if let Some(session) = removed {
                    self.active.insert(id, session);
                }
                self.settle();
                Err(e)
            }
        }
    }

    /// End the current actor's running session.
    pub async fn end_active(&mut self) -> AppResult<WorkSession> {
        self.require_actor()?;
        let id = self.primary_id().ok_or(AppError::NoActiveSession)?;
        self.end_session(id).await
    }

    /// Edit a running or completed session. Editing the tracked session's
    /// start moves the live clock's baseline with it.
    pub async fn update_session(
        &mut self,
        id: SessionId,
        patch: SessionPatch,
    ) -> AppResult<WorkSession> {
        let actor = self.require_actor()?;
        patch.validate()?;
        self.ensure_owner(id, &actor).await?;

        let result = bounded(
            self.config.mutation_timeout,
            self.repo.update_session(id, patch),
        )
        .await;

        match result {
            Ok(session) => {
                if session.is_running() {
                    if let Some(slot) = self.active.get_mut(&id) {
                        *slot = session.clone();
                    }
                } else if self.active.remove(&id).is_some() {
                    self.ended.insert(id);
                }
                self.settle();
                Ok(session)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(session = id, error = %e, "edited session is gone; dropping it");
                if self.active.remove(&id).is_some() {
                    self.ended.insert(id);
                    self.settle();
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn ensure_owner(&self, id: SessionId, actor: &ActorId) -> AppResult<()> {
        let owned = match self.active.get(&id) {
            Some(session) => session.is_owned_by(actor),
            None => {
                let session =
                    bounded(self.config.mutation_timeout, self.repo.get_session(id)).await?;
                session.is_owned_by(actor)
            }
        };
        if owned {
            Ok(())
        } else {
            Err(AppError::NotOwner(format!("session {id}")))
        }
    }

    async fn refresh_quietly(&mut self) {
        if let Err(e) = self.refresh().await {
            tracing::warn!(error = %e, "re-fetch after a stale reference failed");
        }
    }

    fn require_actor(&self) -> AppResult<ActorId> {
        self.auth
            .actor_id()
            .cloned()
            .ok_or(AppError::NotAuthenticated)
    }

    // ---------------------------
    // Reads
    // ---------------------------

    pub fn scope(&self) -> Scope {
        Scope::new(self.auth.actor_id().cloned(), self.show_all)
    }

    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    pub fn show_all(&self) -> bool {
        self.show_all
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn primary_id(&self) -> Option<SessionId> {
        match self.phase {
            Phase::Running { session_id, .. } => Some(session_id),
            Phase::Idle => None,
        }
    }

    pub fn primary(&self) -> Option<&WorkSession> {
        self.primary_id().and_then(|id| self.active.get(&id))
    }

    /// Every visible running session, newest start first.
    pub fn active_sessions(&self) -> Vec<WorkSession> {
        let mut out: Vec<WorkSession> = self.active.values().cloned().collect();
        sort_newest_first(&mut out);
        out
    }

    pub fn subscribe(&self) -> watch::Receiver<ActiveSnapshot> {
        self.snapshots.subscribe()
    }

    /// Live clock for the primary session at `now`.
    pub fn tick_at(&self, now: DateTime<Utc>) -> Option<Tick> {
        match self.phase {
            Phase::Running {
                session_id,
                baseline,
            } => Some(Tick::new(session_id, elapsed_seconds(baseline, now))),
            Phase::Idle => None,
        }
    }

    pub fn tick(&self) -> Option<Tick> {
        self.tick_at(Utc::now())
    }

    /// Live clocks for every visible running session (universe mode).
    pub fn ticks_at(&self, now: DateTime<Utc>) -> Vec<Tick> {
        self.active_sessions()
            .iter()
            .map(|s| Tick::new(s.id, s.elapsed_at(now)))
            .collect()
    }
}

impl Drop for ActiveSessionReconciler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Run a store call under `limit`; an unanswered call becomes `Timeout`.
pub async fn bounded<T, F>(limit: Duration, fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::kv::MemoryStore;
    use crate::local::store::LocalRepository;
    use crate::models::actor::Actor;
    use crate::models::project::ProjectDraft;
    use crate::utils::time::parse_instant;
    use chrono::Duration as ChronoDuration;

    fn alice() -> AuthState {
        AuthState::SignedIn(Actor::new("alice", "Alice"))
    }

    async fn setup() -> (ActiveSessionReconciler, Arc<LocalRepository>, ProjectId) {
        let repo = Arc::new(LocalRepository::new(Arc::new(MemoryStore::new())));
        let project = repo
            .create_project(ProjectDraft::new("Thesis", ActorId::new("alice")))
            .await
            .unwrap();
        let rec = ActiveSessionReconciler::new(
            repo.clone(),
            Arc::new(MemoryStore::new()),
            ReconcilerConfig::default(),
        );
        (rec, repo, project.id)
    }

    #[tokio::test]
    async fn ticks_count_from_the_stored_start() {
        let (mut rec, _repo, pid) = setup().await;
        rec.start(alice(), false).await.unwrap();

        let t = parse_instant("2025-03-01T09:00:00Z").unwrap();
        let s = rec
            .start_session(SessionRequest::new(pid, "Focus").starting_at(t))
            .await
            .unwrap();

        let tick = rec.tick_at(t + ChronoDuration::seconds(125)).unwrap();
        assert_eq!(tick.session_id, s.id);
        assert_eq!(tick.clock, "00:02:05");
        assert_eq!(tick.label, "2 minutes");
    }

    #[tokio::test]
    async fn tombstones_are_dropped_once_views_catch_up() {
        let (mut rec, _repo, pid) = setup().await;
        rec.start(alice(), false).await.unwrap();
        let running = rec
            .start_session(SessionRequest::new(pid, "Focus"))
            .await
            .unwrap();
        rec.end_session(running.id).await.unwrap();
        assert!(rec.ended.contains(&running.id));

        // Stale: fetched before the end landed.
        let snapshot = rec.apply_view(vec![running.clone()]);
        assert!(snapshot.sessions.is_empty());
        assert!(rec.ended.contains(&running.id));

        rec.apply_view(Vec::new());
        assert!(rec.ended.is_empty());
    }

    #[tokio::test]
    async fn backfill_keeps_the_reconciler_idle() {
        let (mut rec, _repo, pid) = setup().await;
        rec.start(alice(), false).await.unwrap();

        let start = parse_instant("2025-03-01T09:00:00Z").unwrap();
        let s = rec
            .start_session(
                SessionRequest::new(pid, "Yesterday").backfill(start, start + ChronoDuration::minutes(90)),
            )
            .await
            .unwrap();
        assert_eq!(s.duration_secs, 90 * 60);
        assert_eq!(rec.phase(), Phase::Idle);
        assert!(rec.tick().is_none());
    }

    #[tokio::test]
    async fn editing_the_start_moves_the_baseline() {
        let (mut rec, _repo, pid) = setup().await;
        rec.start(alice(), false).await.unwrap();
        let t = parse_instant("2025-03-01T09:00:00Z").unwrap();
        let s = rec
            .start_session(SessionRequest::new(pid, "Focus").starting_at(t))
            .await
            .unwrap();

        let earlier = t - ChronoDuration::minutes(10);
        rec.update_session(
            s.id,
            SessionPatch {
                started_at: Some(earlier),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(
            rec.phase(),
            Phase::Running {
                session_id: s.id,
                baseline: earlier
            }
        );
    }

    #[tokio::test]
    async fn the_active_id_is_remembered_and_cleared() {
        let prefs = Arc::new(MemoryStore::new());
        let repo = Arc::new(LocalRepository::new(Arc::new(MemoryStore::new())));
        let pid = repo
            .create_project(ProjectDraft::new("Thesis", ActorId::new("alice")))
            .await
            .unwrap()
            .id;
        let mut rec =
            ActiveSessionReconciler::new(repo, prefs.clone(), ReconcilerConfig::default());
        rec.start(alice(), false).await.unwrap();

        let s = rec.start_session(SessionRequest::new(pid, "Focus")).await.unwrap();
        assert_eq!(prefs::stored_active_session(prefs.as_ref()).unwrap(), Some(s.id));

        rec.end_active().await.unwrap();
        assert_eq!(prefs::stored_active_session(prefs.as_ref()).unwrap(), None);
    }

    #[tokio::test]
    async fn signed_out_start_is_refused() {
        let (mut rec, _repo, pid) = setup().await;
        rec.start(AuthState::SignedOut, false).await.unwrap();
        let err = rec
            .start_session(SessionRequest::new(pid, "Focus"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAuthenticated);
    }

    #[tokio::test]
    async fn bounded_turns_a_hang_into_timeout() {
        let err = bounded(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, AppError>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));
    }
}
