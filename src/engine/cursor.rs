//! Resumable refresh cursors for incremental sources

use super::fetcher::{FetchOutcome, SyncMode};
use crate::model::{RefreshCursor, RefreshState, ResumePoint};
use chrono::{DateTime, Utc};

/// Cursor change produced by one fetch result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorUpdate {
    /// The cursor to persist, `None` when it must stay untouched
    pub cursor: Option<RefreshCursor>,
    /// More pages remain; the caller should run another cycle
    pub refresh_required: bool,
}

pub struct RefreshCursorTracker;

impl RefreshCursorTracker {
    /// Where the next fetch of a source starts
    pub fn resume_point(cursor: &RefreshCursor, full_refresh: bool) -> ResumePoint {
        if full_refresh {
            ResumePoint::Full
        } else {
            cursor.resume_point()
        }
    }

    /// Advance `cursor` with the result of a fetch that started at `resumed`
    ///
    /// A failed fetch leaves the cursor untouched so the next attempt resumes
    /// from the last good state. A pending next page records the refresh as
    /// in progress without touching the last completed marker. A finished
    /// refresh promotes the marker reported during the pass, if any, and
    /// clears the in-progress fields.
    pub fn advance(
        cursor: &RefreshCursor,
        resumed: &ResumePoint,
        outcome: &FetchOutcome,
        mode: SyncMode,
        now: DateTime<Utc>,
    ) -> CursorUpdate {
        if !outcome.succeeded() {
            return CursorUpdate {
                cursor: None,
                refresh_required: false,
            };
        }

        // In-progress state only carries over when this fetch continued it
        let continues = matches!(resumed, ResumePoint::Page(_)) && cursor.is_in_progress();
        let continued_marker = continues
            .then(|| cursor.in_progress_cursor().map(str::to_string))
            .flatten();
        let started_at = match &cursor.state {
            RefreshState::InProgress { started_at, .. } if continues => *started_at,
            _ => now,
        };

        let mut next = cursor.clone();
        match outcome.next_page_token.as_deref().filter(|t| !t.is_empty()) {
            Some(page) => {
                let mut seen = Vec::new();
                if mode == SyncMode::Snapshot {
                    if continues {
                        seen.extend_from_slice(cursor.pass_seen());
                    }
                    seen.extend(
                        outcome
                            .items
                            .iter()
                            .map(|i| i.external_id.trim())
                            .filter(|id| !id.is_empty())
                            .map(str::to_string),
                    );
                }
                next.state = RefreshState::InProgress {
                    in_progress_cursor: outcome.sync_marker.clone().or(continued_marker),
                    next_page_token: page.to_string(),
                    started_at,
                    seen,
                };
                CursorUpdate {
                    cursor: Some(next),
                    refresh_required: true,
                }
            }
            None => {
                if let Some(marker) = outcome.sync_marker.clone().or(continued_marker) {
                    next.last_completed_cursor = Some(marker);
                }
                next.state = RefreshState::Complete { completed_at: now };
                CursorUpdate {
                    cursor: Some(next),
                    refresh_required: false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, minute, 0).unwrap()
    }

    fn completed(marker: &str) -> RefreshCursor {
        RefreshCursor {
            token_id: "google:me@corp.com".to_string(),
            source_id: "gmail".to_string(),
            last_completed_cursor: Some(marker.to_string()),
            state: RefreshState::Complete {
                completed_at: at(0),
            },
        }
    }

    #[test]
    fn test_next_page_marks_in_progress() {
        let cursor = completed("h-1");
        let resumed = cursor.resume_point();
        let outcome = FetchOutcome::ok(vec![]).with_next_page("abc");
        let update = RefreshCursorTracker::advance(&cursor, &resumed, &outcome, SyncMode::Incremental, at(1));

        assert!(update.refresh_required);
        let next = update.cursor.unwrap();
        assert_eq!(next.last_completed_cursor.as_deref(), Some("h-1"));
        assert_eq!(next.in_progress_cursor(), None);
        assert_eq!(next.next_page_token(), Some("abc"));
        assert_eq!(next.resume_point(), ResumePoint::Page("abc".to_string()));
    }

    #[test]
    fn test_resumed_refresh_completes_with_captured_marker() {
        let cursor = completed("h-1");
        let first = RefreshCursorTracker::advance(
            &cursor,
            &ResumePoint::Since("h-1".to_string()),
            &FetchOutcome::ok(vec![]).with_next_page("p2").with_marker("h-9"),
            SyncMode::Incremental,
            at(1),
        )
        .cursor
        .unwrap();
        assert_eq!(first.in_progress_cursor(), Some("h-9"));

        let resumed = first.resume_point();
        let update = RefreshCursorTracker::advance(
            &first,
            &resumed,
            &FetchOutcome::ok(vec![]),
            SyncMode::Incremental,
            at(2),
        );
        assert!(!update.refresh_required);
        let done = update.cursor.unwrap();
        assert_eq!(done.last_completed_cursor.as_deref(), Some("h-9"));
        assert_eq!(done.state, RefreshState::Complete { completed_at: at(2) });
        assert!(!done.is_in_progress());
    }

    #[test]
    fn test_page_token_never_becomes_marker() {
        let cursor = completed("h-1");
        let first = RefreshCursorTracker::advance(
            &cursor,
            &ResumePoint::Since("h-1".to_string()),
            &FetchOutcome::ok(vec![]).with_next_page("abc"),
            SyncMode::Incremental,
            at(1),
        )
        .cursor
        .unwrap();

        let resumed = first.resume_point();
        assert_eq!(resumed, ResumePoint::Page("abc".to_string()));
        let done = RefreshCursorTracker::advance(
            &first,
            &resumed,
            &FetchOutcome::ok(vec![]),
            SyncMode::Incremental,
            at(2),
        )
        .cursor
        .unwrap();
        assert_eq!(done.last_completed_cursor.as_deref(), Some("h-1"));
        assert_eq!(done.resume_point(), ResumePoint::Since("h-1".to_string()));
    }

    #[test]
    fn test_snapshot_pages_accumulate_seen_ids() {
        let item = |ext: &str| {
            crate::model::Item::new(
                "u1",
                "me@corp.com",
                "jira",
                ext,
                "Task",
                crate::model::ItemKind::Task {
                    due: None,
                    priority: 1,
                    sequence: 1,
                },
                at(0),
            )
        };
        let cursor = RefreshCursor::new("jira:me@corp.com", "jira");
        let first = RefreshCursorTracker::advance(
            &cursor,
            &ResumePoint::Full,
            &FetchOutcome::ok(vec![item("T-1")]).with_next_page("1"),
            SyncMode::Snapshot,
            at(1),
        )
        .cursor
        .unwrap();
        assert_eq!(first.pass_seen(), ["T-1".to_string()]);

        let second = RefreshCursorTracker::advance(
            &first,
            &first.resume_point(),
            &FetchOutcome::ok(vec![item("T-2")]).with_next_page("2"),
            SyncMode::Snapshot,
            at(2),
        )
        .cursor
        .unwrap();
        assert_eq!(second.pass_seen(), ["T-1".to_string(), "T-2".to_string()]);
        assert_eq!(
            second.state,
            RefreshState::InProgress {
                in_progress_cursor: None,
                next_page_token: "2".to_string(),
                started_at: at(1),
                seen: vec!["T-1".to_string(), "T-2".to_string()],
            }
        );

        // A new pass starts from scratch
        let restarted = RefreshCursorTracker::advance(
            &second,
            &ResumePoint::Full,
            &FetchOutcome::ok(vec![item("T-3")]).with_next_page("1"),
            SyncMode::Snapshot,
            at(3),
        )
        .cursor
        .unwrap();
        assert_eq!(restarted.pass_seen(), ["T-3".to_string()]);

        let done = RefreshCursorTracker::advance(
            &restarted,
            &restarted.resume_point(),
            &FetchOutcome::ok(vec![]),
            SyncMode::Snapshot,
            at(4),
        )
        .cursor
        .unwrap();
        assert!(done.pass_seen().is_empty());
        assert_eq!(done.last_completed_cursor, None);
    }

    #[test]
    fn test_new_marker_promoted() {
        let cursor = completed("h-1");
        let update = RefreshCursorTracker::advance(
            &cursor,
            &ResumePoint::Since("h-1".to_string()),
            &FetchOutcome::ok(vec![]).with_marker("h-2"),
            SyncMode::Incremental,
            at(3),
        );
        assert_eq!(
            update.cursor.unwrap().last_completed_cursor.as_deref(),
            Some("h-2")
        );
    }

    #[test]
    fn test_error_leaves_cursor_untouched() {
        let cursor = completed("h-1");
        let update = RefreshCursorTracker::advance(
            &cursor,
            &ResumePoint::Since("h-1".to_string()),
            &FetchOutcome::failed(SourceError::Failed("500".to_string())),
            SyncMode::Incremental,
            at(3),
        );
        assert_eq!(update.cursor, None);
        assert!(!update.refresh_required);
    }

    #[test]
    fn test_full_refresh_ignores_stale_progress() {
        let cursor = RefreshCursor {
            state: RefreshState::InProgress {
                in_progress_cursor: Some("h-5".to_string()),
                next_page_token: "p7".to_string(),
                started_at: at(0),
                seen: Vec::new(),
            },
            ..completed("h-1")
        };
        let resumed = RefreshCursorTracker::resume_point(&cursor, true);
        assert_eq!(resumed, ResumePoint::Full);

        let done = RefreshCursorTracker::advance(
            &cursor,
            &resumed,
            &FetchOutcome::ok(vec![]),
            SyncMode::Incremental,
            at(4),
        )
        .cursor
        .unwrap();
        // Nothing new was reported, so the last marker stands
        assert_eq!(done.last_completed_cursor.as_deref(), Some("h-1"));
        assert!(!done.is_in_progress());
    }
}
