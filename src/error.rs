//! Error types for the sync engine
//!
//! Two layers of failure are kept apart:
//! - [`SourceError`] describes a single source fetch that went wrong. It is
//!   carried inside a fetch outcome and never aborts a refresh cycle.
//! - [`SyncError`] is a hard failure of an engine operation (persistence,
//!   invalid input, illegal lifecycle transitions) and is returned to the caller.

use crate::model::Lifecycle;

/// Why a single source fetch did not produce a usable result
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("fetch failed: {0}")]
    Failed(String),

    /// Expired or revoked credentials; the account needs re-authorization
    #[error("bad credentials: {0}")]
    BadCredentials(String),

    /// Fetch exceeded the per-source limit, in milliseconds
    #[error("fetch timed out after {0}ms")]
    TimedOut(u64),

    /// The fetch task ended without reporting a result
    #[error("fetch aborted: {0}")]
    Aborted(String),
}

impl SourceError {
    pub fn is_bad_token(&self) -> bool {
        matches!(self, SourceError::BadCredentials(_))
    }
}

/// Hard failure of an engine operation
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid lifecycle transition for item {item_id}: {from} -> {to}")]
    InvalidTransition {
        item_id: String,
        from: Lifecycle,
        to: Lifecycle,
    },
}

impl SyncError {
    pub fn persistence(context: impl std::fmt::Display) -> Self {
        SyncError::Persistence(context.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
