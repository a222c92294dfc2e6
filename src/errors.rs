//! Unified application error type.
//! All modules (db, local, core, cli, utils) return AppError to keep the error
//! handling consistent, and `AppError::kind` maps every variant onto the small
//! taxonomy callers actually branch on.

use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    // ---------------------------
    // IO / serialization
    // ---------------------------
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // ---------------------------
    // Database-related
    // ---------------------------
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("Database migration error: {0}")]
    Migration(String),

    // ---------------------------
    // Parsing / validation
    // ---------------------------
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid time range: end {end} is before start {start}")]
    InvalidTimeRange { start: String, end: String },

    #[error("Name must not be empty")]
    EmptyName,

    #[error("Malformed record from store: {0}")]
    InvalidRecord(String),

    #[error("Unknown reaction: {0}")]
    InvalidReaction(String),

    // ---------------------------
    // Auth / ownership
    // ---------------------------
    #[error("Not authenticated: sign in first")]
    NotAuthenticated,

    #[error("Only the owner can modify {0}")]
    NotOwner(String),

    // ---------------------------
    // Session lifecycle
    // ---------------------------
    #[error("You already have an active session (id {0})")]
    AlreadyActive(i64),

    #[error("No active session")]
    NoActiveSession,

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Session {0} has already ended")]
    AlreadyEnded(i64),

    // ---------------------------
    // Infrastructure
    // ---------------------------
    #[error("Store unavailable: {0}")]
    Transient(String),

    #[error("Store did not answer within {0:?}")]
    Timeout(Duration),

    // ---------------------------
    // Config errors
    // ---------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // ---------------------------
    // Generic fallback
    // ---------------------------
    #[error("Internal error: {0}")]
    Other(String),
}

pub type AppResult<T> = Result<T, AppError>;

/// Coarse classification used by callers to decide how to recover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Prompt sign-in; never retried automatically.
    NotAuthenticated,
    /// Signed in, but the record belongs to someone else.
    Forbidden,
    /// A session is already running for this actor.
    AlreadyActive,
    /// The record is gone or already ended: drop the local reference.
    NotFound,
    /// Infrastructure failure: the caller may retry.
    Transient,
    /// Bad input or a malformed stored record.
    Invalid,
    Internal,
}

impl AppError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        AppError::NotFound { entity, id }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotAuthenticated => ErrorKind::NotAuthenticated,
            AppError::NotOwner(_) => ErrorKind::Forbidden,
            AppError::AlreadyActive(_) => ErrorKind::AlreadyActive,
            AppError::NotFound { .. } | AppError::AlreadyEnded(_) | AppError::NoActiveSession => {
                ErrorKind::NotFound
            }
            AppError::Transient(_) | AppError::Timeout(_) | AppError::Io(_) => {
                ErrorKind::Transient
            }
            AppError::Db(e) if is_busy(e) => ErrorKind::Transient,
            AppError::InvalidTimestamp(_)
            | AppError::InvalidTimeRange { .. }
            | AppError::EmptyName
            | AppError::InvalidRecord(_)
            | AppError::InvalidReaction(_) => ErrorKind::Invalid,
            AppError::Db(_)
            | AppError::Json(_)
            | AppError::Yaml(_)
            | AppError::Migration(_)
            | AppError::Config(_)
            | AppError::Other(_) => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
    )
}
