use crate::cli::Context;
use crate::cli::parser::ProjectAction;
use crate::core::prefs;
use crate::errors::AppResult;
use crate::models::project::{ProjectDraft, ProjectPatch};
use crate::ui::messages::{info, success};
use crate::ui::render;
use chrono::Utc;

pub async fn handle(ctx: &Context, action: &ProjectAction) -> AppResult<()> {
    let backend = ctx.backend()?;
    let repo = &backend.sessions;

    match action {
        ProjectAction::Add {
            name,
            description,
            header_img,
            private,
            closed,
        } => {
            let actor = ctx.require_actor()?;
            let mut draft = ProjectDraft::new(name.clone(), actor);
            if let Some(desc) = description {
                draft = draft.with_description(desc.clone());
            }
            draft.header_img = header_img.clone();
            draft.is_public = !private;
            draft.is_open = !closed;

            let project = repo.create_project(draft).await?;
            success(format!("Project #{} '{}' created", project.id, project.name));
        }

        ProjectAction::List => {
            let projects = repo.list_projects(&ctx.scope()).await?;
            if projects.is_empty() {
                info("No projects yet.");
            }
            let expanded = prefs::expanded_project(ctx.prefs()?.as_ref())?;
            for p in &projects {
                let marker = if Some(p.id) == expanded { "▾" } else { " " };
                println!("{marker} {}", render::project_line(p));
            }
        }

        ProjectAction::Show { id } => {
            let project = repo.get_project(*id).await?;
            let kv = ctx.prefs()?;
            let expanded = prefs::toggle_expanded_project(kv.as_ref(), project.id)?;

            println!("{}", render::project_line(&project));
            if expanded.is_none() {
                info("Collapsed.");
                return Ok(());
            }
            if !project.description.is_empty() {
                println!("{}", project.description);
            }
            if let Some(img) = &project.header_img {
                println!("🖼  {img}");
            }
            println!();

            let sessions = repo.list_sessions(project.id, &ctx.scope()).await?;
            if sessions.is_empty() {
                info("No sessions in this project.");
            }
            let now = Utc::now();
            for s in &sessions {
                println!("  {}", render::session_line(s, now));
            }
        }

        ProjectAction::Edit {
            id,
            name,
            description,
            header_img,
            public,
            open,
        } => {
            let actor = ctx.require_actor()?;
            let patch = ProjectPatch {
                name: name.clone(),
                description: description.clone(),
                header_img: header_img.clone(),
                is_public: *public,
                is_open: *open,
            };
            let project = repo.update_project(*id, &actor, patch).await?;
            success(format!("Project #{} updated", project.id));
        }

        ProjectAction::Del { id } => {
            let actor = ctx.require_actor()?;
            repo.delete_project(*id, &actor).await?;
            let kv = ctx.prefs()?;
            if prefs::expanded_project(kv.as_ref())? == Some(*id) {
                prefs::set_expanded_project(kv.as_ref(), None)?;
            }
            success(format!("Project #{id} deleted"));
        }
    }

    Ok(())
}
