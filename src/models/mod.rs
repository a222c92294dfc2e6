pub mod actor;
pub mod change;
pub mod idea;
pub mod project;
pub mod session;
pub mod todo;

pub use actor::{Actor, ActorId, AuthState, Owned};
pub use change::{ChangeEvent, ChangeKind, Table};
pub use idea::{Idea, IdeaId, Reaction};
pub use project::{Project, ProjectDraft, ProjectId, ProjectPatch};
pub use session::{SessionDraft, SessionId, SessionPatch, WorkSession};
pub use todo::{Todo, TodoId, TodoPatch};
