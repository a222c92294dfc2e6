use super::actor::{ActorId, Owned};
use super::project::ProjectId;
use crate::errors::{AppError, AppResult};
use crate::utils::time::{elapsed_seconds, format_instant, parse_instant};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type SessionId = i64;

pub const DEFAULT_CATEGORY: &str = "general";

/// A validated work session.
///
/// `duration_secs` is the whole number of seconds between start and end once
/// the session has ended. While running it stays at its stored value (0 for
/// live timers) and the display computes `now - start` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkSession {
    pub id: SessionId,
    pub project_id: ProjectId,
    pub name: String,
    pub category: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: i64,
    pub created_by: Option<ActorId>,
}

impl WorkSession {
    pub fn is_running(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Seconds to show for this session at `now`.
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> i64 {
        match self.ended_at {
            Some(_) => self.duration_secs,
            None => elapsed_seconds(self.started_at, now),
        }
    }

    /// Duration used by aggregates: end - start for ended sessions, the
    /// stored value otherwise.
    pub fn effective_duration(&self) -> i64 {
        match self.ended_at {
            Some(end) => elapsed_seconds(self.started_at, end),
            None => self.duration_secs.max(0),
        }
    }

    /// The ended version of this session. Fails if it has already ended.
    ///
    /// The duration is always recomputed from the original start, so a
    /// repeated end can never compound.
    pub fn ended(&self, ended_at: DateTime<Utc>) -> AppResult<WorkSession> {
        if !self.is_running() {
            return Err(AppError::AlreadyEnded(self.id));
        }
        let end = if ended_at < self.started_at {
            tracing::warn!(
                session = self.id,
                start = %self.started_at,
                end = %ended_at,
                "end precedes start (clock skew?); recording a zero-length session"
            );
            self.started_at
        } else {
            ended_at
        };

        let mut out = self.clone();
        out.ended_at = Some(end);
        out.duration_secs = elapsed_seconds(self.started_at, end);
        Ok(out)
    }

    pub fn to_record(&self) -> SessionRecord {
        SessionRecord {
            id: self.id,
            project_id: self.project_id,
            name: self.name.clone(),
            category: self.category.clone(),
            duration: self.duration_secs,
            created_at: format_instant(&self.started_at),
            ended_at: self.ended_at.as_ref().map(format_instant),
            created_by: self.created_by.as_ref().map(|a| a.as_str().to_string()),
        }
    }
}

impl Owned for WorkSession {
    fn owner(&self) -> Option<&ActorId> {
        self.created_by.as_ref()
    }
}

/// Row shape exchanged with the stores; column names follow the
/// `work_sessions` table. Nothing in here is trusted until it has been
/// converted into a [`WorkSession`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub duration: i64,
    pub created_at: String,
    #[serde(default)]
    pub ended_at: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl TryFrom<SessionRecord> for WorkSession {
    type Error = AppError;

    fn try_from(rec: SessionRecord) -> AppResult<Self> {
        let name = rec.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::InvalidRecord(format!(
                "session {} has an empty name",
                rec.id
            )));
        }

        let started_at = parse_instant(&rec.created_at)
            .map_err(|e| AppError::InvalidRecord(format!("session {}: {e}", rec.id)))?;
        let ended_at = rec
            .ended_at
            .as_deref()
            .map(parse_instant)
            .transpose()
            .map_err(|e| AppError::InvalidRecord(format!("session {}: {e}", rec.id)))?;

        let duration_secs = match ended_at {
            Some(end) if end < started_at => {
                return Err(AppError::InvalidRecord(format!(
                    "session {} ends before it starts",
                    rec.id
                )));
            }
            Some(end) => {
                let computed = elapsed_seconds(started_at, end);
                if computed != rec.duration {
                    tracing::warn!(
                        session = rec.id,
                        stored = rec.duration,
                        computed,
                        "stored duration disagrees with bounds; using end - start"
                    );
                }
                computed
            }
            None => rec.duration.max(0),
        };

        let category = match rec.category.trim() {
            "" => DEFAULT_CATEGORY.to_string(),
            other => other.to_string(),
        };

        Ok(WorkSession {
            id: rec.id,
            project_id: rec.project_id,
            name,
            category,
            started_at,
            ended_at,
            duration_secs,
            created_by: rec
                .created_by
                .filter(|s| !s.trim().is_empty())
                .map(ActorId::new),
        })
    }
}

/// Input for `create_session`. Without an end the session is running;
/// with one it is a backfilled entry created already-ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDraft {
    pub project_id: ProjectId,
    pub name: String,
    pub category: String,
    pub created_by: ActorId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionDraft {
    pub fn new(
        project_id: ProjectId,
        name: impl Into<String>,
        created_by: ActorId,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            project_id,
            name: name.into(),
            category: DEFAULT_CATEGORY.to_string(),
            created_by,
            started_at,
            ended_at: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn ending_at(mut self, ended_at: DateTime<Utc>) -> Self {
        self.ended_at = Some(ended_at);
        self
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::EmptyName);
        }
        check_range(self.started_at, self.ended_at)
    }

    /// Build the stored session under a store-assigned id.
    pub fn into_session(self, id: SessionId) -> AppResult<WorkSession> {
        self.validate()?;
        let duration_secs = self
            .ended_at
            .map(|end| elapsed_seconds(self.started_at, end))
            .unwrap_or(0);
        let category = match self.category.trim() {
            "" => DEFAULT_CATEGORY.to_string(),
            other => other.to_string(),
        };

        Ok(WorkSession {
            id,
            project_id: self.project_id,
            name: self.name.trim().to_string(),
            category,
            started_at: self.started_at,
            ended_at: self.ended_at,
            duration_secs,
            created_by: Some(self.created_by),
        })
    }
}

/// Partial edit of a session. There is deliberately no duration field:
/// the duration is always derived from the resulting bounds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPatch {
    pub name: Option<String>,
    pub category: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.category.is_none()
            && self.started_at.is_none()
            && self.ended_at.is_none()
    }

    pub fn validate(&self) -> AppResult<()> {
        match &self.name {
            Some(name) if name.trim().is_empty() => Err(AppError::EmptyName),
            _ => Ok(()),
        }
    }

    /// Apply the patch and recompute the duration from the resulting bounds.
    pub fn apply_to(&self, current: &WorkSession) -> AppResult<WorkSession> {
        self.validate()?;
        let mut out = current.clone();

        if let Some(name) = &self.name {
            out.name = name.trim().to_string();
        }
        if let Some(category) = &self.category {
            out.category = match category.trim() {
                "" => DEFAULT_CATEGORY.to_string(),
                other => other.to_string(),
            };
        }
        if let Some(start) = self.started_at {
            out.started_at = start;
        }
        if let Some(end) = self.ended_at {
            out.ended_at = Some(end);
        }

        check_range(out.started_at, out.ended_at)?;
        if let Some(end) = out.ended_at {
            out.duration_secs = elapsed_seconds(out.started_at, end);
        }
        Ok(out)
    }
}

fn check_range(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> AppResult<()> {
    match end {
        Some(end) if end < start => Err(AppError::InvalidTimeRange {
            start: format_instant(&start),
            end: format_instant(&end),
        }),
        _ => Ok(()),
    }
}
