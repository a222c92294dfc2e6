use crate::cli::Context;
use crate::cli::parser::IdeaAction;
use crate::errors::AppResult;
use crate::models::idea::Reaction;
use crate::ui::messages::{info, success};
use crate::ui::render;
use std::str::FromStr;

pub async fn handle(ctx: &Context, action: &IdeaAction) -> AppResult<()> {
    let backend = ctx.backend()?;

    match action {
        IdeaAction::Add { text } => {
            let actor = ctx.require_actor()?;
            let idea = backend.ideas.submit_idea(&actor, text).await?;
            success(format!("Idea #{} submitted", idea.id));
        }
        IdeaAction::List => {
            let ideas = backend.ideas.list_ideas().await?;
            if ideas.is_empty() {
                info("No ideas yet.");
            }
            for idea in &ideas {
                println!("{}", render::idea_line(idea));
            }
        }
        IdeaAction::React { id, reaction } => {
            let reaction = Reaction::from_str(reaction)?;
            let actor = ctx.require_actor()?;
            let idea = backend.ideas.toggle_reaction(*id, &actor, reaction).await?;
            println!("{}", render::idea_line(&idea));
        }
    }
    Ok(())
}
