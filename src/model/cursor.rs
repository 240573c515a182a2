use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where an incremental source should resume fetching from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumePoint {
    /// No usable history; fetch everything
    Full,
    /// Fetch changes after the last completed synchronization marker
    Since(String),
    /// Continue an interrupted refresh at this page
    Page(String),
}

/// Progress of the current refresh for one cursor
///
/// Being an enum, "complete" and "in progress" can never both be populated.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RefreshState {
    /// Never synchronized
    #[default]
    Idle,
    Complete {
        completed_at: DateTime<Utc>,
    },
    InProgress {
        /// Marker of the sync being paged through, if the source reported one
        #[serde(default, skip_serializing_if = "Option::is_none")]
        in_progress_cursor: Option<String>,
        next_page_token: String,
        started_at: DateTime<Utc>,
        /// External ids returned by earlier pages of a paged snapshot
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        seen: Vec<String>,
    },
}

/// Resumable synchronization position for one (token, source) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshCursor {
    pub token_id: String,
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_completed_cursor: Option<String>,
    #[serde(default)]
    pub state: RefreshState,
}

impl RefreshCursor {
    pub fn new(token_id: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            token_id: token_id.into(),
            source_id: source_id.into(),
            last_completed_cursor: None,
            state: RefreshState::Idle,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self.state, RefreshState::InProgress { .. })
    }

    pub fn in_progress_cursor(&self) -> Option<&str> {
        match &self.state {
            RefreshState::InProgress {
                in_progress_cursor, ..
            } => in_progress_cursor.as_deref(),
            _ => None,
        }
    }

    /// External ids already returned by the snapshot pass being paged through
    pub fn pass_seen(&self) -> &[String] {
        match &self.state {
            RefreshState::InProgress { seen, .. } => seen,
            _ => &[],
        }
    }

    pub fn next_page_token(&self) -> Option<&str> {
        match &self.state {
            RefreshState::InProgress {
                next_page_token, ..
            } => Some(next_page_token),
            _ => None,
        }
    }

    pub fn resume_point(&self) -> ResumePoint {
        match (&self.state, &self.last_completed_cursor) {
            (RefreshState::InProgress { next_page_token, .. }, _) => {
                ResumePoint::Page(next_page_token.clone())
            }
            (_, Some(marker)) => ResumePoint::Since(marker.clone()),
            (_, None) => ResumePoint::Full,
        }
    }
}
