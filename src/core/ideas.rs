//! Reaction toggling shared by both backends.

use crate::errors::{AppError, AppResult};
use crate::models::actor::ActorId;
use crate::models::idea::{Idea, Reaction};

/// Add `actor` to the `reaction` list, or take them off it if already there.
/// Empty lists are dropped and the total is recomputed.
pub fn toggle_reaction(idea: &Idea, actor: &ActorId, reaction: Reaction) -> Idea {
    let mut out = idea.clone();
    let reactors = out.reacts.entry(reaction).or_default();

    if let Some(pos) = reactors.iter().position(|a| a == actor) {
        reactors.remove(pos);
    } else {
        reactors.push(actor.clone());
    }
    out.reacts.retain(|_, actors| !actors.is_empty());
    out.num_reacts = out.reacts.values().map(Vec::len).sum();
    out
}

pub fn has_reacted(idea: &Idea, actor: &ActorId, reaction: Reaction) -> bool {
    idea.reacts
        .get(&reaction)
        .is_some_and(|actors| actors.contains(actor))
}

/// Trimmed idea text, or `EmptyName` when nothing is left.
pub fn normalize_text(text: &str) -> AppResult<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AppError::EmptyName);
    }
    Ok(trimmed.to_string())
}

/// Most reactions first, newest first among equals.
pub fn sort_by_popularity(ideas: &mut [Idea]) {
    ideas.sort_by(|a, b| {
        b.num_reacts
            .cmp(&a.num_reacts)
            .then(b.created_at.cmp(&a.created_at))
            .then(b.id.cmp(&a.id))
    });
}
