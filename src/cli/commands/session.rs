//! start / stop / edit / rm / sessions / active
//!
//! Mutations go through the reconciler so the one-running-session rule is
//! checked before the store is contacted.

use crate::cli::{Context, parse_local};
use crate::core::reconciler::SessionRequest;
use crate::errors::{AppError, AppResult};
use crate::models::actor::Owned;
use crate::models::session::{SessionId, SessionPatch};
use crate::ui::messages::{info, success};
use crate::ui::render;
use crate::utils::time::format_duration;
use chrono::Utc;

pub async fn start(
    ctx: &Context,
    project: i64,
    name: &str,
    category: Option<&str>,
    at: Option<&str>,
    until: Option<&str>,
) -> AppResult<()> {
    let backend = ctx.backend()?;
    let mut rec = ctx.reconciler(&backend).await?;

    let mut request = SessionRequest::new(project, name);
    if let Some(category) = category {
        request = request.with_category(category);
    }
    match (at, until) {
        (Some(at), Some(until)) => {
            request = request.backfill(parse_local(at)?, parse_local(until)?);
        }
        (Some(at), None) => request = request.starting_at(parse_local(at)?),
        _ => {}
    }

    let session = rec.start_session(request).await?;
    if session.is_running() {
        success(format!("Session #{} '{}' started", session.id, session.name));
    } else {
        success(format!(
            "Session #{} '{}' logged ({})",
            session.id,
            session.name,
            format_duration(session.duration_secs)
        ));
    }
    Ok(())
}

pub async fn stop(ctx: &Context, id: Option<SessionId>) -> AppResult<()> {
    let backend = ctx.backend()?;
    let mut rec = ctx.reconciler(&backend).await?;

    let session = match id {
        Some(id) => rec.end_session(id).await?,
        None => rec.end_active().await?,
    };
    success(format!(
        "Session #{} '{}' ended after {}",
        session.id,
        session.name,
        format_duration(session.duration_secs)
    ));
    Ok(())
}

pub async fn edit(
    ctx: &Context,
    id: SessionId,
    name: Option<&str>,
    category: Option<&str>,
    start: Option<&str>,
    end: Option<&str>,
) -> AppResult<()> {
    let patch = SessionPatch {
        name: name.map(str::to_string),
        category: category.map(str::to_string),
        started_at: start.map(parse_local).transpose()?,
        ended_at: end.map(parse_local).transpose()?,
    };
    if patch.is_empty() {
        info("Nothing to change.");
        return Ok(());
    }

    let backend = ctx.backend()?;
    let mut rec = ctx.reconciler(&backend).await?;
    let session = rec.update_session(id, patch).await?;
    success(format!("Session #{} updated", session.id));
    println!("  {}", render::session_line(&session, Utc::now()));
    Ok(())
}

pub async fn remove(ctx: &Context, id: SessionId) -> AppResult<()> {
    let backend = ctx.backend()?;
    let actor = ctx.require_actor()?;
    let session = backend.sessions.get_session(id).await?;
    if !session.is_owned_by(&actor) {
        return Err(AppError::NotOwner(format!("session {id}")));
    }
    backend.sessions.delete_session(id).await?;
    success(format!("Session #{id} deleted"));
    Ok(())
}

pub async fn list(ctx: &Context, project: i64) -> AppResult<()> {
    let backend = ctx.backend()?;
    let project = backend.sessions.get_project(project).await?;
    let sessions = backend.sessions.list_sessions(project.id, &ctx.scope()).await?;

    println!("{}", render::project_line(&project));
    if sessions.is_empty() {
        info("No sessions.");
    }
    let now = Utc::now();
    for s in &sessions {
        println!("  {}", render::session_line(s, now));
    }
    Ok(())
}

pub async fn active(ctx: &Context) -> AppResult<()> {
    let backend = ctx.backend()?;
    let mut rec = ctx.reconciler(&backend).await?;

    let sessions = rec.active_sessions();
    if sessions.is_empty() {
        info("No running sessions.");
    }
    let now = Utc::now();
    let primary = rec.primary().map(|s| s.id);
    for s in &sessions {
        let marker = if Some(s.id) == primary { "▶" } else { " " };
        println!("{marker} {}", render::session_line(s, now));
    }
    if let Some(tick) = rec.tick_at(now) {
        println!("\n⏱  {} ({})", tick.clock, tick.label);
    }
    rec.shutdown();
    Ok(())
}
