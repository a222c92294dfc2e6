//! Who sees what. Every list shown to a user passes through [`filter`];
//! stores only use [`owner_pushdown`] to narrow their queries up front.
//!
//! Rules:
//! - signed out: only records that no actor owns;
//! - signed in, universe mode off: only the actor's own records;
//! - signed in, universe mode on: everything.

use crate::models::actor::{ActorId, Owned};

pub fn filter<T: Owned>(items: Vec<T>, current: Option<&ActorId>, show_all: bool) -> Vec<T> {
    items
        .into_iter()
        .filter(|item| is_visible(item, current, show_all))
        .collect()
}

pub fn is_visible<T: Owned>(item: &T, current: Option<&ActorId>, show_all: bool) -> bool {
    match current {
        None => item.owner().is_none(),
        Some(_) if show_all => true,
        Some(actor) => item.is_owned_by(actor),
    }
}

/// Owner predicate a store may apply in its query. `None` means "do not
/// narrow"; [`filter`] still runs on the result.
pub fn owner_pushdown(current: Option<&ActorId>, show_all: bool) -> Option<&ActorId> {
    if show_all { None } else { current }
}
