//! Concurrent fetch across every linked (account, source) pair

use crate::error::{Result, SourceError};
use crate::model::{AccountToken, Item, ItemStore, Lifecycle, ResumePoint, SourceKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// How a source synchronizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Every fetch returns the full set of open items
    #[default]
    Snapshot,
    /// Fetches return changes since a cursor, possibly across several pages
    Incremental,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub user_id: String,
    pub account_id: String,
    pub resume: ResumePoint,
}

/// What one source fetch produced
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub items: Vec<Item>,
    pub error: Option<SourceError>,
    pub is_bad_token: bool,
    /// More pages remain for the current pass
    pub next_page_token: Option<String>,
    /// Synchronization marker (e.g. history id) of the data returned
    pub sync_marker: Option<String>,
    /// External ids an incremental source reports as removed
    pub removed: Vec<String>,
}

impl FetchOutcome {
    pub fn ok(items: Vec<Item>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }

    pub fn failed(error: SourceError) -> Self {
        Self {
            is_bad_token: error.is_bad_token(),
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn bad_token(reason: impl Into<String>) -> Self {
        Self::failed(SourceError::BadCredentials(reason.into()))
    }

    pub fn with_next_page(mut self, token: impl Into<String>) -> Self {
        self.next_page_token = Some(token.into());
        self
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.sync_marker = Some(marker.into());
        self
    }

    pub fn with_removed(mut self, removed: Vec<String>) -> Self {
        self.removed = removed;
        self
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// A non-empty next page token is pending
    pub fn has_more_pages(&self) -> bool {
        self.next_page_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Make the error and the bad-token flag agree
    fn normalize(mut self) -> Self {
        if self.error.as_ref().is_some_and(SourceError::is_bad_token) {
            self.is_bad_token = true;
        } else if self.error.is_none() && self.is_bad_token {
            self.error = Some(SourceError::BadCredentials(
                "source reported a bad token".to_string(),
            ));
        }
        if self.error.is_some() {
            self.items.clear();
            self.removed.clear();
        }
        self
    }
}

/// Uniform fetch capability of one source of one linked account
///
/// Implementations must be safe to call concurrently with other adapters.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable source identifier (part of the natural key)
    fn source_id(&self) -> &str;

    fn sync_mode(&self) -> SyncMode {
        SyncMode::Snapshot
    }

    /// Lifecycle given to items this source stops reporting
    fn absence_lifecycle(&self) -> Lifecycle {
        Lifecycle::Completed
    }

    async fn fetch(&self, request: FetchRequest) -> FetchOutcome;
}

/// A source scheduled for this cycle
#[derive(Clone)]
pub struct SourceBinding {
    pub token: AccountToken,
    pub adapter: Arc<dyn SourceAdapter>,
    pub resume: ResumePoint,
    /// External ids returned by earlier pages of the snapshot pass this
    /// fetch continues
    pub earlier_pages: Vec<String>,
}

impl SourceBinding {
    pub fn key(&self) -> SourceKey {
        SourceKey::new(&self.token.account_id, self.adapter.source_id())
    }
}

/// Joined result of one source fetch
#[derive(Debug, Clone)]
pub struct SourceResult {
    pub key: SourceKey,
    pub token_id: String,
    pub mode: SyncMode,
    pub absence: Lifecycle,
    /// The resume point the fetch started from
    pub resume: ResumePoint,
    pub earlier_pages: Vec<String>,
    pub outcome: FetchOutcome,
    /// The account was flagged bad before this cycle started
    pub token_was_bad: bool,
    pub elapsed: Duration,
}

impl SourceResult {
    pub fn succeeded(&self) -> bool {
        self.outcome.succeeded()
    }

    /// A successful fetch whose item set is authoritative for absence
    ///
    /// Only the last page of a snapshot pass from an account that was healthy
    /// when the cycle started qualifies. Items of earlier pages of the same
    /// pass count as seen through `earlier_pages`.
    pub fn is_authoritative(&self) -> bool {
        self.succeeded()
            && !self.token_was_bad
            && self.mode == SyncMode::Snapshot
            && !self.outcome.has_more_pages()
    }

    /// The result moves the source's refresh cursor
    pub fn tracks_cursor(&self) -> bool {
        self.mode == SyncMode::Incremental
            || self.outcome.has_more_pages()
            || self.outcome.sync_marker.is_some()
            || matches!(self.resume, ResumePoint::Page(_))
    }
}

pub struct FanOutFetcher {
    timeout: Option<Duration>,
}

impl FanOutFetcher {
    /// `timeout` bounds every single source fetch; `None` waits indefinitely
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Fetch every binding concurrently and join all results in binding order
    ///
    /// A source that fails, times out or panics yields a failed result; it
    /// never prevents the others from being returned.
    #[tracing::instrument(level = "debug", skip(self, bindings), fields(sources = bindings.len()))]
    pub async fn fetch_all(&self, user_id: &str, bindings: Vec<SourceBinding>) -> Vec<SourceResult> {
        let mut pending = Vec::with_capacity(bindings.len());

        for binding in bindings {
            let (tx, rx) = oneshot::channel();
            let request = FetchRequest {
                user_id: user_id.to_string(),
                account_id: binding.token.account_id.clone(),
                resume: binding.resume.clone(),
            };
            let adapter = Arc::clone(&binding.adapter);
            let timeout = self.timeout;

            tokio::spawn(async move {
                let started = Instant::now();
                let outcome = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, adapter.fetch(request)).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            FetchOutcome::failed(SourceError::TimedOut(limit.as_millis() as u64))
                        }
                    },
                    None => adapter.fetch(request).await,
                };
                // The receiver only goes away if the cycle itself was dropped
                let _ = tx.send((outcome, started.elapsed()));
            });

            pending.push((binding, rx));
        }

        let mut results = Vec::with_capacity(pending.len());
        for (binding, rx) in pending {
            let key = binding.key();
            let (outcome, elapsed) = match rx.await {
                Ok(joined) => joined,
                Err(_) => (
                    FetchOutcome::failed(SourceError::Aborted(
                        "fetch task ended without a result".to_string(),
                    )),
                    Duration::ZERO,
                ),
            };
            let outcome = outcome.normalize();

            match &outcome.error {
                Some(err) => warn!(source = %key, error = %err, "source degraded"),
                None => debug!(
                    source = %key,
                    items = outcome.items.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "source fetched"
                ),
            }

            results.push(SourceResult {
                key,
                token_id: binding.token.token_id.clone(),
                mode: binding.adapter.sync_mode(),
                absence: binding.adapter.absence_lifecycle(),
                resume: binding.resume,
                earlier_pages: binding.earlier_pages,
                outcome,
                token_was_bad: binding.token.is_bad_token,
                elapsed,
            });
        }
        results
    }
}

/// Persist account health from a cycle's results
///
/// A bad-token result flags its account; a flagged account whose fetches
/// all succeeded is cleared.
pub fn record_token_health<S: ItemStore + ?Sized>(
    results: &[SourceResult],
    store: &mut S,
    now: DateTime<Utc>,
) -> Result<()> {
    // token id -> (account id, was bad, any bad token, all succeeded)
    let mut health: BTreeMap<&str, (&str, bool, bool, bool)> = BTreeMap::new();
    for result in results {
        let entry = health.entry(result.token_id.as_str()).or_insert((
            result.key.account_id.as_str(),
            result.token_was_bad,
            false,
            true,
        ));
        entry.2 |= result.outcome.is_bad_token;
        entry.3 &= result.succeeded();
    }

    for (token_id, (account_id, was_bad, any_bad, all_ok)) in health {
        if any_bad {
            store.mark_token_bad(token_id, now)?;
            warn!(account = account_id, "account needs re-authorization");
        } else if was_bad && all_ok {
            store.clear_token_bad(token_id)?;
            debug!(account = account_id, "account credentials recovered");
        }
    }
    Ok(())
}
