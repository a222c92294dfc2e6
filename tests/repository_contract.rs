//! The same behavior checked against both backends.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use zensession::db::SqliteRepository;
use zensession::errors::{AppError, ErrorKind};
use zensession::local::{LocalRepository, MemoryStore};
use zensession::models::actor::ActorId;
use zensession::models::change::Table;
use zensession::models::idea::Reaction;
use zensession::models::project::{ProjectDraft, ProjectPatch};
use zensession::models::session::{SessionDraft, SessionPatch};
use zensession::models::todo::TodoPatch;
use zensession::repository::{IdeaRepository, Scope, SessionRepository, TodoRepository};
use zensession::utils::time::parse_instant;

fn at(s: &str) -> DateTime<Utc> {
    parse_instant(s).unwrap()
}

fn alice() -> ActorId {
    ActorId::new("alice")
}

fn bob() -> ActorId {
    ActorId::new("bob")
}

fn backends() -> Vec<(&'static str, Arc<dyn SessionRepository>, Arc<dyn IdeaRepository>)> {
    let sqlite = Arc::new(SqliteRepository::in_memory().unwrap());
    let local = Arc::new(LocalRepository::new(Arc::new(MemoryStore::new())));
    vec![
        ("sqlite", sqlite.clone(), sqlite),
        ("local", local.clone(), local),
    ]
}

fn todo_backends() -> Vec<(&'static str, Arc<dyn TodoRepository>)> {
    vec![
        ("sqlite", Arc::new(SqliteRepository::in_memory().unwrap())),
        ("local", Arc::new(LocalRepository::new(Arc::new(MemoryStore::new())))),
    ]
}

#[tokio::test]
async fn sessions_list_newest_first_and_honor_visibility() {
    for (name, repo, _) in backends() {
        let project = repo
            .create_project(ProjectDraft::new("Thesis", alice()))
            .await
            .unwrap();

        let t = at("2025-04-01T08:00:00Z");
        let older = repo
            .create_session(
                SessionDraft::new(project.id, "Old", alice(), t).ending_at(t + Duration::hours(1)),
            )
            .await
            .unwrap();
        let newer = repo
            .create_session(SessionDraft::new(project.id, "New", alice(), t + Duration::hours(3)))
            .await
            .unwrap();
        repo.create_session(SessionDraft::new(project.id, "Bob's", bob(), t + Duration::hours(2)))
            .await
            .unwrap();

        let mine = repo
            .list_sessions(project.id, &Scope::new(Some(alice()), false))
            .await
            .unwrap();
        let ids: Vec<_> = mine.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![newer.id, older.id], "{name}");

        let everyone = repo
            .list_sessions(project.id, &Scope::new(Some(alice()), true))
            .await
            .unwrap();
        assert_eq!(everyone.len(), 3, "{name}");

        let anonymous = repo
            .list_sessions(project.id, &Scope::new(None, true))
            .await
            .unwrap();
        assert!(anonymous.is_empty(), "{name}");
    }
}

#[tokio::test]
async fn active_session_is_the_most_recent_running_one() {
    for (name, repo, _) in backends() {
        let project = repo
            .create_project(ProjectDraft::new("Thesis", alice()))
            .await
            .unwrap();
        let t = at("2025-04-01T08:00:00Z");
        repo.create_session(SessionDraft::new(project.id, "A", alice(), t))
            .await
            .unwrap();
        let b = repo
            .create_session(SessionDraft::new(project.id, "B", alice(), t + Duration::minutes(5)))
            .await
            .unwrap();

        let scope = Scope::new(Some(alice()), false);
        let active = repo.get_active_session(&scope).await.unwrap().unwrap();
        assert_eq!(active.id, b.id, "{name}");
        assert_eq!(repo.list_active_sessions(&scope).await.unwrap().len(), 2, "{name}");
    }
}

#[tokio::test]
async fn ending_twice_is_refused_and_duration_is_exact() {
    for (name, repo, _) in backends() {
        let project = repo
            .create_project(ProjectDraft::new("Thesis", alice()))
            .await
            .unwrap();
        let t = at("2025-04-01T08:00:00Z");
        let s = repo
            .create_session(SessionDraft::new(project.id, "Focus", alice(), t))
            .await
            .unwrap();

        let ended = repo
            .end_session(s.id, t + Duration::seconds(1500))
            .await
            .unwrap();
        assert_eq!(ended.duration_secs, 1500, "{name}");
        assert_eq!(repo.get_session(s.id).await.unwrap(), ended, "{name}");

        let err = repo
            .end_session(s.id, t + Duration::hours(5))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyEnded(id) if id == s.id), "{name}");
        assert_eq!(repo.get_session(s.id).await.unwrap().duration_secs, 1500, "{name}");
    }
}

#[tokio::test]
async fn editing_bounds_recomputes_duration() {
    for (name, repo, _) in backends() {
        let project = repo
            .create_project(ProjectDraft::new("Thesis", alice()))
            .await
            .unwrap();
        let t = at("2025-04-01T08:00:00Z");
        let s = repo
            .create_session(
                SessionDraft::new(project.id, "Focus", alice(), t).ending_at(t + Duration::hours(1)),
            )
            .await
            .unwrap();

        let edited = repo
            .update_session(
                s.id,
                SessionPatch {
                    started_at: Some(t - Duration::minutes(30)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.duration_secs, 90 * 60, "{name}");

        let err = repo
            .update_session(
                s.id,
                SessionPatch {
                    ended_at: Some(t - Duration::hours(2)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTimeRange { .. }), "{name}");
    }
}

#[tokio::test]
async fn project_mutations_are_owner_only() {
    for (name, repo, _) in backends() {
        let project = repo
            .create_project(ProjectDraft::new("Thesis", alice()))
            .await
            .unwrap();

        let patch = ProjectPatch {
            is_public: Some(false),
            ..Default::default()
        };
        let err = repo
            .update_project(project.id, &bob(), patch.clone())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden, "{name}");

        let updated = repo.update_project(project.id, &alice(), patch).await.unwrap();
        assert!(!updated.is_public, "{name}");

        assert!(repo.delete_project(project.id, &bob()).await.is_err(), "{name}");
        repo.delete_project(project.id, &alice()).await.unwrap();
        let err = repo.get_project(project.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound, "{name}");
    }
}

#[tokio::test]
async fn writes_are_announced_on_the_change_channel() {
    for (name, repo, _) in backends() {
        let mut changes = repo.changes();
        let project = repo
            .create_project(ProjectDraft::new("Thesis", alice()))
            .await
            .unwrap();
        let event = changes.recv().await.unwrap();
        assert_eq!(event.table, Table::Projects, "{name}");

        let s = repo
            .create_session(SessionDraft::new(project.id, "Focus", alice(), Utc::now()))
            .await
            .unwrap();
        let event = changes.recv().await.unwrap();
        assert!(event.touches_sessions(), "{name}");
        assert_eq!(event.row_id, Some(s.id), "{name}");
    }
}

#[tokio::test]
async fn reactions_toggle_per_actor() {
    for (name, _, ideas) in backends() {
        let idea = ideas.submit_idea(&alice(), "  Dark mode ").await.unwrap();
        assert_eq!(idea.text, "Dark mode", "{name}");

        let once = ideas.toggle_reaction(idea.id, &bob(), Reaction::Like).await.unwrap();
        assert_eq!(once.num_reacts, 1, "{name}");
        let twice = ideas.toggle_reaction(idea.id, &bob(), Reaction::Like).await.unwrap();
        assert_eq!(twice.num_reacts, 0, "{name}");

        let other = ideas.submit_idea(&bob(), "Export").await.unwrap();
        ideas.toggle_reaction(other.id, &alice(), Reaction::Heart).await.unwrap();
        let listed = ideas.list_ideas().await.unwrap();
        assert_eq!(listed[0].id, other.id, "{name}");

        assert!(ideas.submit_idea(&alice(), "   ").await.is_err(), "{name}");
    }
}

#[tokio::test]
async fn todos_are_private_and_list_open_items_first() {
    for (name, repo) in todo_backends() {
        let first = repo.add_todo(&alice(), "  Book dentist ").await.unwrap();
        let second = repo.add_todo(&alice(), "Renew passport").await.unwrap();
        let third = repo.add_todo(&alice(), "Pay rent").await.unwrap();
        repo.add_todo(&bob(), "Bob's chore").await.unwrap();
        assert_eq!(first.name, "Book dentist", "{name}");
        assert_eq!(first.text, "", "{name}");
        assert!(!first.done, "{name}");

        let done = repo.toggle_todo(first.id, &alice()).await.unwrap();
        assert!(done.done && done.done_at.is_some(), "{name}");

        let list = repo.list_todos(&alice()).await.unwrap();
        let ids: Vec<_> = list.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![second.id, third.id, first.id], "{name}");

        let reopened = repo.toggle_todo(first.id, &alice()).await.unwrap();
        assert!(!reopened.done, "{name}");
        assert_eq!(reopened.done_at, None, "{name}");

        let renamed = repo
            .update_todo(second.id, &alice(), TodoPatch::rename("Renew ID card"))
            .await
            .unwrap();
        assert_eq!(renamed.name, "Renew ID card", "{name}");
        assert!(matches!(
            repo.update_todo(second.id, &alice(), TodoPatch::rename("  ")).await,
            Err(AppError::EmptyName)
        ));
        assert!(matches!(repo.add_todo(&alice(), "").await, Err(AppError::EmptyName)));

        assert!(matches!(
            repo.toggle_todo(second.id, &bob()).await,
            Err(AppError::NotOwner(_))
        ));
        assert!(matches!(
            repo.toggle_todo(-1, &alice()).await,
            Err(AppError::NotFound { .. })
        ));
        assert_eq!(repo.list_todos(&bob()).await.unwrap().len(), 1, "{name}");
    }
}
