use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an authenticated user, as issued by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: ActorId,
    pub handle: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            id: ActorId::new(id),
            handle: handle.into(),
        }
    }
}

/// What the authentication provider currently reports.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    SignedOut,
    SignedIn(Actor),
}

impl AuthState {
    pub fn actor(&self) -> Option<&Actor> {
        match self {
            AuthState::SignedIn(actor) => Some(actor),
            AuthState::SignedOut => None,
        }
    }

    pub fn actor_id(&self) -> Option<&ActorId> {
        self.actor().map(|a| &a.id)
    }

    pub fn is_signed_in(&self) -> bool {
        matches!(self, AuthState::SignedIn(_))
    }
}

/// Anything with per-row ownership attribution.
pub trait Owned {
    fn owner(&self) -> Option<&ActorId>;

    fn is_owned_by(&self, actor: &ActorId) -> bool {
        self.owner() == Some(actor)
    }
}
