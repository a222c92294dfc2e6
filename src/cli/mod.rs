pub mod commands;
pub mod parser;

use crate::config::{BackendKind, Config};
use crate::core::reconciler::{ActiveSessionReconciler, ReconcilerConfig};
use crate::errors::{AppError, AppResult};
use crate::local::kv::{FileStore, KeyValueStore, MemoryStore};
use crate::models::actor::{ActorId, AuthState};
use crate::repository::{Backend, Scope};
use parser::Cli;
use std::sync::Arc;
use std::time::Duration;

/// Everything a command handler needs: the effective configuration (file
/// plus command-line overrides) and how to reach the backend.
pub struct Context {
    pub cfg: Config,
    pub test: bool,
}

impl Context {
    pub fn new(cfg: Config, test: bool) -> Self {
        Self { cfg, test }
    }

    /// Fold the global flags into `cfg`.
    pub fn apply_overrides(cli: &Cli, cfg: &mut Config) {
        if let Some(kind) = cli.backend {
            cfg.backend = kind;
        }
        if let Some(path) = &cli.db {
            match cfg.backend {
                BackendKind::Sqlite => cfg.database = path.clone(),
                BackendKind::Local => cfg.local_store = path.clone(),
            }
        }
        if let Some(actor) = &cli.actor {
            cfg.actor_id = Some(actor.clone());
            cfg.actor_handle = None;
        }
        if cli.anonymous {
            cfg.actor_id = None;
            cfg.actor_handle = None;
        }
        if cli.all {
            cfg.show_all = true;
        }
    }

    pub fn auth(&self) -> AuthState {
        self.cfg.auth_state()
    }

    pub fn scope(&self) -> Scope {
        Scope::new(self.auth().actor_id().cloned(), self.cfg.show_all)
    }

    pub fn require_actor(&self) -> AppResult<ActorId> {
        self.auth()
            .actor_id()
            .cloned()
            .ok_or(AppError::NotAuthenticated)
    }

    pub fn backend(&self) -> AppResult<Backend> {
        Backend::open(&self.cfg)
    }

    /// UI preferences. Test runs keep them in memory.
    pub fn prefs(&self) -> AppResult<Arc<dyn KeyValueStore>> {
        if self.test {
            Ok(Arc::new(MemoryStore::new()))
        } else {
            Ok(Arc::new(FileStore::open(&self.cfg.preferences)?))
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.cfg.change_poll_millis.max(50))
    }

    /// A reconciler already loaded with the running sessions in scope.
    pub async fn reconciler(&self, backend: &Backend) -> AppResult<ActiveSessionReconciler> {
        let mut rec = ActiveSessionReconciler::new(
            backend.sessions.clone(),
            self.prefs()?,
            ReconcilerConfig::from(&self.cfg),
        );
        rec.start(self.auth(), self.cfg.show_all).await?;
        Ok(rec)
    }
}

/// Parse user-entered local wall-clock time.
pub fn parse_local(value: &str) -> AppResult<chrono::DateTime<chrono::Utc>> {
    crate::utils::time::from_device_naive_string(value)
}
