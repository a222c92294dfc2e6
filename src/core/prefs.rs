//! Small pieces of UI state kept in the key/value port.

use crate::errors::AppResult;
use crate::local::kv::KeyValueStore;
use crate::models::project::ProjectId;
use crate::models::session::SessionId;

/// Id of the session the reconciler last tracked as running.
pub const ACTIVE_SESSION_KEY: &str = "activeSessionId";
/// Project whose detail view was last expanded.
pub const EXPANDED_PROJECT_KEY: &str = "expandedProjectId";

fn read_id(kv: &dyn KeyValueStore, key: &str) -> AppResult<Option<i64>> {
    let Some(raw) = kv.get(key)? else {
        return Ok(None);
    };
    match raw.trim().parse::<i64>() {
        Ok(id) => Ok(Some(id)),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable stored id");
            Ok(None)
        }
    }
}

fn write_id(kv: &dyn KeyValueStore, key: &str, id: Option<i64>) -> AppResult<()> {
    match id {
        Some(id) => kv.set(key, &id.to_string()),
        None => kv.remove(key),
    }
}

pub fn stored_active_session(kv: &dyn KeyValueStore) -> AppResult<Option<SessionId>> {
    read_id(kv, ACTIVE_SESSION_KEY)
}

pub fn store_active_session(kv: &dyn KeyValueStore, id: Option<SessionId>) -> AppResult<()> {
    write_id(kv, ACTIVE_SESSION_KEY, id)
}

pub fn expanded_project(kv: &dyn KeyValueStore) -> AppResult<Option<ProjectId>> {
    read_id(kv, EXPANDED_PROJECT_KEY)
}

pub fn set_expanded_project(kv: &dyn KeyValueStore, id: Option<ProjectId>) -> AppResult<()> {
    write_id(kv, EXPANDED_PROJECT_KEY, id)
}

/// Accordion behavior: expanding the open project collapses it.
pub fn toggle_expanded_project(
    kv: &dyn KeyValueStore,
    id: ProjectId,
) -> AppResult<Option<ProjectId>> {
    let next = match expanded_project(kv)? {
        Some(current) if current == id => None,
        _ => Some(id),
    };
    set_expanded_project(kv, next)?;
    Ok(next)
}
