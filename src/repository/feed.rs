//! Active-session change feed.
//!
//! Listens on a repository's raw change channel and, for every change that
//! touches `work_sessions`, re-fetches the active view for its scope. Events
//! are never applied as deltas: ordering between the channel and mutation
//! responses is not guaranteed, so consumers reconcile each view by id.

use super::{Scope, SessionRepository};
use crate::errors::AppResult;
use crate::models::session::WorkSession;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Views waiting to be consumed before the forwarder blocks.
const FEED_CAPACITY: usize = 32;

pub type ActiveView = AppResult<Vec<WorkSession>>;

pub struct ActiveSessionFeed {
    scope: Scope,
    views: mpsc::Receiver<ActiveView>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ActiveSessionFeed {
    /// Subscribe to the repository's changes for `scope`.
    ///
    /// The underlying channel is subscribed before this returns, so a fetch
    /// made after `open` can never miss a change that follows it.
    pub fn open(repo: Arc<dyn SessionRepository>, scope: Scope) -> Self {
        let changes = repo.changes();
        let (tx, views) = mpsc::channel(FEED_CAPACITY);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(forward(repo, scope.clone(), changes, tx, cancel.clone()));

        tracing::debug!(actor = ?scope.actor, show_all = scope.show_all, "active-session feed opened");
        Self {
            scope,
            views,
            cancel,
            task: Some(task),
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Next re-fetched view. `None` once cancelled or when the store's
    /// channel has closed.
    pub async fn recv(&mut self) -> Option<ActiveView> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            view = self.views.recv() => view,
        }
    }

    /// Stop delivery and release the channel. Safe to call repeatedly.
    pub fn cancel(&mut self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        self.views.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        tracing::debug!(actor = ?self.scope.actor, "active-session feed closed");
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for ActiveSessionFeed {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn forward(
    repo: Arc<dyn SessionRepository>,
    scope: Scope,
    mut changes: broadcast::Receiver<crate::models::change::ChangeEvent>,
    tx: mpsc::Sender<ActiveView>,
    cancel: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            received = changes.recv() => received,
        };

        match received {
            Ok(event) if !event.touches_sessions() => continue,
            Ok(event) => {
                tracing::trace!(?event, "work_sessions changed; re-fetching active view");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "change feed lagged; re-fetching active view");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }

        let view = repo.list_active_sessions(&scope).await;
        if tx.send(view).await.is_err() {
            break;
        }
    }
}
