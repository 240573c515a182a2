//! File-backed source adapter
//!
//! A feed is a TOML file describing what a source currently reports:
//!
//! ```toml
//! history_id = "h-42"      # optional synchronization marker
//! removed = ["M-3"]        # incremental sources: ids no longer open
//! # error = "..."          # simulate a failing source
//! # bad_token = true       # simulate revoked credentials
//!
//! [[items]]
//! external_id = "T-1"
//! title = "Fix login"
//!
//! [items.kind]
//! type = "task"
//! priority = 2
//! ```
//!
//! The file is read on every fetch, so editing it between refreshes changes
//! what the next cycle sees.

use crate::engine::{FetchOutcome, FetchRequest, SourceAdapter, SyncMode};
use crate::error::SourceError;
use crate::model::{Item, ItemKind, Lifecycle, ResumePoint};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct FeedFile {
    #[serde(default)]
    history_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    bad_token: bool,
    #[serde(default)]
    removed: Vec<String>,
    #[serde(default)]
    items: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    external_id: String,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    deeplink: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    kind: ItemKind,
}

pub struct FeedSource {
    source_id: String,
    path: PathBuf,
    mode: SyncMode,
    page_size: Option<usize>,
    absence: Lifecycle,
}

impl FeedSource {
    pub fn new(source_id: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            source_id: source_id.into(),
            path: path.as_ref().to_path_buf(),
            mode: SyncMode::Snapshot,
            page_size: None,
            absence: Lifecycle::Completed,
        }
    }

    pub fn with_mode(mut self, mode: SyncMode) -> Self {
        self.mode = mode;
        self
    }

    /// Split results into pages of `page_size` items
    pub fn with_page_size(mut self, page_size: Option<usize>) -> Self {
        self.page_size = page_size.filter(|n| *n > 0);
        self
    }

    pub fn with_absence(mut self, absence: Lifecycle) -> Self {
        self.absence = absence;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_feed(&self) -> Result<FeedFile, SourceError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            SourceError::Failed(format!("cannot read feed {}: {}", self.path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            SourceError::Failed(format!("invalid feed {}: {}", self.path.display(), e))
        })
    }

    fn to_item(&self, request: &FetchRequest, entry: FeedItem, now: DateTime<Utc>) -> Item {
        let mut item = Item::new(
            &request.user_id,
            &request.account_id,
            &self.source_id,
            entry.external_id,
            entry.title,
            entry.kind,
            entry.created_at.unwrap_or(now),
        );
        item.body = entry.body;
        item.deeplink = entry.deeplink;
        item
    }
}

#[async_trait]
impl SourceAdapter for FeedSource {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn sync_mode(&self) -> SyncMode {
        self.mode
    }

    fn absence_lifecycle(&self) -> Lifecycle {
        self.absence
    }

    async fn fetch(&self, request: FetchRequest) -> FetchOutcome {
        let feed = match self.read_feed().await {
            Ok(feed) => feed,
            Err(e) => return FetchOutcome::failed(e),
        };
        if feed.bad_token {
            return FetchOutcome::bad_token(format!("{} rejected the stored token", self.source_id));
        }
        if let Some(error) = feed.error {
            return FetchOutcome::failed(SourceError::Failed(error));
        }

        // Nothing happened since the marker we already completed
        let up_to_date = match &request.resume {
            ResumePoint::Since(marker) => feed.history_id.as_ref() == Some(marker),
            _ => false,
        };
        if self.mode == SyncMode::Incremental && up_to_date {
            let mut outcome = FetchOutcome::ok(Vec::new());
            outcome.sync_marker = feed.history_id;
            return outcome;
        }

        let offset = match &request.resume {
            ResumePoint::Page(token) => match token.parse::<usize>() {
                Ok(offset) => offset,
                Err(_) => {
                    return FetchOutcome::failed(SourceError::Failed(format!(
                        "invalid page token '{}'",
                        token
                    )));
                }
            },
            _ => 0,
        };

        let now = Utc::now();
        let total = feed.items.len();
        let end = self
            .page_size
            .map_or(total, |size| offset.saturating_add(size).min(total));
        let items: Vec<Item> = feed
            .items
            .into_iter()
            .skip(offset)
            .take(end.saturating_sub(offset))
            .map(|entry| self.to_item(&request, entry, now))
            .collect();

        let mut outcome = FetchOutcome::ok(items);
        outcome.sync_marker = feed.history_id;
        if end < total {
            outcome.next_page_token = Some(end.to_string());
        } else if self.mode == SyncMode::Incremental {
            outcome.removed = feed.removed;
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const FEED: &str = r#"
history_id = "h-7"
removed = ["M-0"]

[[items]]
external_id = "M-1"
title = "Quarterly numbers"
created_at = "2025-03-10T08:00:00Z"

[items.kind]
type = "email_thread"
sender = "ann@corp.com"
sender_domain = "corp.com"
sent_at = "2025-03-10T08:00:00Z"

[[items]]
external_id = "M-2"
title = "Lunch?"

[items.kind]
type = "email_thread"
sender = "bob@example.org"
sender_domain = "example.org"
sent_at = "2025-03-10T07:00:00Z"

[[items]]
external_id = "T-1"
title = "Fix login"
deeplink = "https://tracker.example/T-1"

[items.kind]
type = "task"
priority = 2
sequence = 1
"#;

    fn write_feed(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("feed.toml");
        fs::write(&path, content).unwrap();
        path
    }

    fn request(resume: ResumePoint) -> FetchRequest {
        FetchRequest {
            user_id: "u1".to_string(),
            account_id: "me@corp.com".to_string(),
            resume,
        }
    }

    #[tokio::test]
    async fn test_snapshot_fetch() {
        let dir = TempDir::new().unwrap();
        let source = FeedSource::new("inbox", write_feed(&dir, FEED));
        let outcome = source.fetch(request(ResumePoint::Full)).await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.items.len(), 3);
        assert_eq!(outcome.items[0].user_id, "u1");
        assert_eq!(outcome.items[0].source_id, "inbox");
        assert_eq!(
            outcome.items[2].deeplink.as_deref(),
            Some("https://tracker.example/T-1")
        );
        assert_eq!(outcome.sync_marker.as_deref(), Some("h-7"));
        // Snapshot sources never report removals
        assert!(outcome.removed.is_empty());
    }

    #[tokio::test]
    async fn test_incremental_paging() {
        let dir = TempDir::new().unwrap();
        let source = FeedSource::new("gmail", write_feed(&dir, FEED))
            .with_mode(SyncMode::Incremental)
            .with_page_size(Some(2));

        let first = source.fetch(request(ResumePoint::Full)).await;
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.next_page_token.as_deref(), Some("2"));
        assert!(first.removed.is_empty());

        let second = source.fetch(request(ResumePoint::Page("2".to_string()))).await;
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.next_page_token, None);
        assert_eq!(second.removed, vec!["M-0".to_string()]);

        let unchanged = source
            .fetch(request(ResumePoint::Since("h-7".to_string())))
            .await;
        assert!(unchanged.succeeded());
        assert!(unchanged.items.is_empty());
    }

    #[tokio::test]
    async fn test_failures() {
        let dir = TempDir::new().unwrap();
        let missing = FeedSource::new("jira", dir.path().join("missing.toml"));
        assert!(matches!(
            missing.fetch(request(ResumePoint::Full)).await.error,
            Some(SourceError::Failed(_))
        ));

        let revoked = FeedSource::new("jira", write_feed(&dir, "bad_token = true\n"));
        let outcome = revoked.fetch(request(ResumePoint::Full)).await;
        assert!(outcome.is_bad_token);

        let broken = FeedSource::new("jira", write_feed(&dir, "error = \"HTTP 503\"\n"));
        assert_eq!(
            broken.fetch(request(ResumePoint::Full)).await.error,
            Some(SourceError::Failed("HTTP 503".to_string()))
        );
    }
}
