use crate::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Built-in section every new item lands in
pub const SECTION_TODAY: &str = "today";
pub const SECTION_BLOCKED: &str = "blocked";
pub const SECTION_BACKLOG: &str = "backlog";

/// Identifier of a per-user ordering section
///
/// The three built-in sections are `today`, `blocked` and `backlog`; any other
/// non-empty id names a user-defined section.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionId(String);

impl SectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn today() -> Self {
        Self::new(SECTION_TODAY)
    }

    pub fn blocked() -> Self {
        Self::new(SECTION_BLOCKED)
    }

    pub fn backlog() -> Self {
        Self::new(SECTION_BACKLOG)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_builtin(&self) -> bool {
        matches!(
            self.0.as_str(),
            SECTION_TODAY | SECTION_BLOCKED | SECTION_BACKLOG
        )
    }
}

impl Default for SectionId {
    fn default() -> Self {
        Self::today()
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SectionId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(
                "Section id must not be empty. Built-in sections: today, blocked, backlog"
                    .to_string(),
            );
        }
        Ok(Self::new(trimmed.to_lowercase()))
    }
}

/// Item lifecycle
///
/// `Active` is the only non-terminal state. Items are never hard-deleted by
/// the engine; leaving `Active` is a one-way transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    #[default]
    Active,
    Completed,
    Deleted,
}

impl Lifecycle {
    /// Validate a transition for `item_id`, returning the new state
    pub fn transition(self, item_id: &str, to: Lifecycle) -> Result<Lifecycle> {
        match (self, to) {
            (Lifecycle::Active, Lifecycle::Completed | Lifecycle::Deleted) => Ok(to),
            _ => Err(SyncError::InvalidTransition {
                item_id: item_id.to_string(),
                from: self,
                to,
            }),
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifecycle::Active => "active",
            Lifecycle::Completed => "completed",
            Lifecycle::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

impl FromStr for Lifecycle {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(Lifecycle::Active),
            "completed" => Ok(Lifecycle::Completed),
            "deleted" => Ok(Lifecycle::Deleted),
            _ => Err(format!(
                "Invalid lifecycle '{}'. Valid options are: active, completed, deleted",
                s
            )),
        }
    }
}

/// Kind-specific payload of an item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemKind {
    Task {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        due: Option<DateTime<Utc>>,
        /// Normalized priority, higher is more important, 0 = none
        #[serde(default)]
        priority: u32,
        /// Sequence number reported by the source (e.g. issue number)
        #[serde(default)]
        sequence: u64,
    },
    EmailThread {
        sender: String,
        sender_domain: String,
        sent_at: DateTime<Utc>,
        #[serde(default)]
        message_count: u32,
        #[serde(default)]
        unread: bool,
    },
    CalendarEvent {
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    },
    PullRequest {
        repository: String,
        number: u64,
        #[serde(default)]
        review_requested: bool,
    },
    MeetingPrep {
        event_external_id: String,
        starts_at: DateTime<Utc>,
    },
}

impl ItemKind {
    pub fn name(&self) -> &'static str {
        match self {
            ItemKind::Task { .. } => "task",
            ItemKind::EmailThread { .. } => "email_thread",
            ItemKind::CalendarEvent { .. } => "calendar_event",
            ItemKind::PullRequest { .. } => "pull_request",
            ItemKind::MeetingPrep { .. } => "meeting_prep",
        }
    }

    /// The moment this item becomes due, if the kind has one
    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        match self {
            ItemKind::Task { due, .. } => *due,
            ItemKind::CalendarEvent { starts_at, .. } => Some(*starts_at),
            ItemKind::MeetingPrep { starts_at, .. } => Some(*starts_at),
            ItemKind::EmailThread { .. } | ItemKind::PullRequest { .. } => None,
        }
    }

    pub fn priority(&self) -> u32 {
        match self {
            ItemKind::Task { priority, .. } => *priority,
            _ => 0,
        }
    }
}

/// The (user, source, external id) triple identifying an item across refreshes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NaturalKey {
    pub user_id: String,
    pub source_id: String,
    pub external_id: String,
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.user_id, self.source_id, self.external_id)
    }
}

/// A synchronized work item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Internal id, assigned by the store on first insert (empty until then)
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub external_id: String,
    pub source_id: String,
    pub account_id: String,
    #[serde(default)]
    pub section: SectionId,
    /// Position within the section, 0 = not yet placed
    #[serde(default)]
    pub ordering_index: u32,
    #[serde(default)]
    pub manually_reordered: bool,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deeplink: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub kind: ItemKind,
}

impl Item {
    pub fn new(
        user_id: impl Into<String>,
        account_id: impl Into<String>,
        source_id: impl Into<String>,
        external_id: impl Into<String>,
        title: impl Into<String>,
        kind: ItemKind,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: String::new(),
            user_id: user_id.into(),
            external_id: external_id.into(),
            source_id: source_id.into(),
            account_id: account_id.into(),
            section: SectionId::default(),
            ordering_index: 0,
            manually_reordered: false,
            lifecycle: Lifecycle::Active,
            title: title.into(),
            body: None,
            deeplink: None,
            created_at: now,
            updated_at: now,
            kind,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            user_id: self.user_id.clone(),
            source_id: self.source_id.clone(),
            external_id: self.external_id.clone(),
        }
    }

    /// All natural-key fields are present
    pub fn has_natural_key(&self) -> bool {
        !self.user_id.trim().is_empty()
            && !self.source_id.trim().is_empty()
            && !self.external_id.trim().is_empty()
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle == Lifecycle::Active
    }

    /// True when a freshly fetched copy carries different source data
    pub fn payload_differs(&self, fetched: &Item) -> bool {
        self.title != fetched.title
            || self.body != fetched.body
            || self.deeplink != fetched.deeplink
            || self.account_id != fetched.account_id
            || self.kind != fetched.kind
    }

    /// True when the fields the comparator ranks on have moved
    pub fn ranking_changed(&self, fetched: &Item) -> bool {
        match (&self.kind, &fetched.kind) {
            (ItemKind::Task { priority: a, .. }, ItemKind::Task { priority: b, .. }) => a != b,
            (
                ItemKind::CalendarEvent { starts_at: a, .. },
                ItemKind::CalendarEvent { starts_at: b, .. },
            ) => a != b,
            (
                ItemKind::MeetingPrep { starts_at: a, .. },
                ItemKind::MeetingPrep { starts_at: b, .. },
            ) => a != b,
            (a, b) => a.name() != b.name(),
        }
    }

    /// Copy source-owned fields from a fetched copy, keeping identity,
    /// ordering and lifecycle untouched
    pub fn absorb(&mut self, fetched: &Item, now: DateTime<Utc>) {
        self.account_id = fetched.account_id.clone();
        self.title = fetched.title.clone();
        self.body = fetched.body.clone();
        self.deeplink = fetched.deeplink.clone();
        self.kind = fetched.kind.clone();
        self.updated_at = now;
    }
}

/// Domain part of an email address, lowercased
pub fn email_domain(address: &str) -> Option<String> {
    let (_, domain) = address.trim().rsplit_once('@')?;
    let domain = domain.trim_end_matches('>').trim();
    if domain.is_empty() {
        None
    } else {
        Some(domain.to_lowercase())
    }
}
