//! Formatting helpers for tool output

use crate::engine::CycleResult;
use crate::model::{AccountToken, Item, ItemKind, RefreshCursor, RefreshState, SectionId};

fn kind_detail(kind: &ItemKind) -> String {
    match kind {
        ItemKind::Task { due, priority, .. } => {
            let mut detail = format!("task, priority {}", priority);
            if let Some(due) = due {
                detail.push_str(&format!(", due {}", due.format("%Y-%m-%d %H:%M")));
            }
            detail
        }
        ItemKind::EmailThread {
            sender, unread, ..
        } => {
            if *unread {
                format!("email from {}, unread", sender)
            } else {
                format!("email from {}", sender)
            }
        }
        ItemKind::CalendarEvent { starts_at, .. } => {
            format!("event at {}", starts_at.format("%Y-%m-%d %H:%M"))
        }
        ItemKind::PullRequest {
            repository, number, ..
        } => format!("pull request {}#{}", repository, number),
        ItemKind::MeetingPrep { starts_at, .. } => {
            format!("prepare for meeting at {}", starts_at.format("%Y-%m-%d %H:%M"))
        }
    }
}

/// Format a user's active items grouped by section
///
/// # Arguments
/// * `items` - Items already in display order
/// * `exclude_body` - Whether to leave item bodies out
pub fn format_items(items: &[&Item], exclude_body: bool) -> String {
    if items.is_empty() {
        return "No items found".to_string();
    }

    let mut result = format!("Found {} item(s):\n", items.len());
    let mut current: Option<&SectionId> = None;
    for item in items {
        if current != Some(&item.section) {
            result.push_str(&format!("\n## {}\n", item.section));
            current = Some(&item.section);
        }

        let position = if item.ordering_index == 0 {
            "-".to_string()
        } else {
            item.ordering_index.to_string()
        };
        let pin = if item.manually_reordered { " (pinned)" } else { "" };
        result.push_str(&format!(
            "{}. [{}] {}{} ({} via {})\n",
            position,
            item.id,
            item.title,
            pin,
            kind_detail(&item.kind),
            item.source_id
        ));
        if let Some(ref link) = item.deeplink {
            result.push_str(&format!("   Link: {}\n", link));
        }
        if !exclude_body && let Some(ref body) = item.body {
            result.push_str(&format!("   {}\n", body));
        }
    }

    result
}

/// Summarize a finished refresh cycle
pub fn format_cycle(result: &CycleResult) -> String {
    if result.skipped {
        let mut text = "Refreshed moments ago; fetch skipped".to_string();
        if result.reordered > 0 {
            text.push_str(&format!(", {} position(s) compacted", result.reordered));
        }
        return text;
    }

    let stats = &result.stats;
    let mut text = format!(
        "Refresh finished: {} created, {} updated, {} completed, {} deleted, {} unchanged",
        stats.created, stats.updated, stats.completed, stats.deleted, stats.unchanged
    );
    if stats.dropped > 0 {
        text.push_str(&format!(", {} malformed item(s) dropped", stats.dropped));
    }
    if result.reordered > 0 {
        text.push_str(&format!("\nReordered {} position(s)", result.reordered));
    }

    if !result.degraded_sources.is_empty() {
        text.push_str(&format!(
            "\n\nDegraded {} source(s), their items were left untouched:\n",
            result.degraded_sources.len()
        ));
        for key in &result.degraded_sources {
            text.push_str(&format!("- {}\n", key));
        }
    }
    if !result.reauth_accounts.is_empty() {
        text.push('\n');
        text.push_str(&format_reauth_notice(&result.reauth_accounts));
    }
    if result.refresh_required {
        text.push_str("\n\nMore pages are pending; run refresh again to continue");
    }
    text
}

/// Notice listing accounts whose credentials must be renewed
pub fn format_reauth_notice(accounts: &[String]) -> String {
    format!(
        "Re-authorization needed for: {}\n",
        accounts.join(", ")
    )
}

fn format_cursor(cursor: &RefreshCursor) -> String {
    let state = match &cursor.state {
        RefreshState::Idle => "never synchronized".to_string(),
        RefreshState::Complete { completed_at } => {
            format!("complete at {}", completed_at.format("%Y-%m-%d %H:%M:%S"))
        }
        RefreshState::InProgress {
            next_page_token,
            started_at,
            ..
        } => format!(
            "in progress since {}, next page {}",
            started_at.format("%Y-%m-%d %H:%M:%S"),
            next_page_token
        ),
    };
    match cursor.last_completed_cursor {
        Some(ref marker) => format!("  {}: {} (marker {})\n", cursor.source_id, state, marker),
        None => format!("  {}: {}\n", cursor.source_id, state),
    }
}

/// Format linked accounts with their health and refresh cursors
pub fn format_accounts(accounts: &[(&AccountToken, Vec<&RefreshCursor>)]) -> String {
    if accounts.is_empty() {
        return "No linked accounts".to_string();
    }

    let mut result = format!("Found {} linked account(s):\n\n", accounts.len());
    for (token, cursors) in accounts {
        let health = match token.bad_since {
            Some(since) if token.is_bad_token => format!(
                "needs re-authorization since {}",
                since.format("%Y-%m-%d %H:%M:%S")
            ),
            _ if token.is_bad_token => "needs re-authorization".to_string(),
            _ => "ok".to_string(),
        };
        result.push_str(&format!(
            "- {} ({}): {}\n",
            token.account_id, token.service, health
        ));
        for cursor in cursors {
            result.push_str(&format_cursor(cursor));
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ReconcileStats;
    use crate::model::SourceKey;
    use chrono::{TimeZone, Utc};

    fn task(id: &str, section: SectionId, index: u32) -> Item {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        let mut item = Item::new(
            "u1",
            "me@corp.com",
            "jira",
            id,
            format!("Task {}", id),
            ItemKind::Task {
                due: None,
                priority: 2,
                sequence: 0,
            },
            now,
        )
        .with_body("details");
        item.id = id.to_string();
        item.section = section;
        item.ordering_index = index;
        item
    }

    #[test]
    fn test_format_items_groups_sections() {
        let a = task("item-1", SectionId::today(), 1);
        let mut b = task("item-2", SectionId::today(), 2);
        b.manually_reordered = true;
        let c = task("item-3", SectionId::backlog(), 0);

        let text = format_items(&[&a, &b, &c], false);
        assert!(text.starts_with("Found 3 item(s):"));
        assert_eq!(text.matches("## today").count(), 1);
        assert!(text.contains("## backlog"));
        assert!(text.contains("2. [item-2] Task item-2 (pinned) (task, priority 2 via jira)"));
        assert!(text.contains("-. [item-3]"));
        assert!(text.contains("   details"));

        let without_body = format_items(&[&a], true);
        assert!(!without_body.contains("details"));
        assert_eq!(format_items(&[], false), "No items found");
    }

    #[test]
    fn test_format_cycle() {
        let result = CycleResult {
            degraded_sources: vec![SourceKey::new("me@corp.com", "jira")],
            refresh_required: true,
            reauth_accounts: vec!["me@corp.com".to_string()],
            stats: ReconcileStats {
                created: 2,
                completed: 1,
                ..Default::default()
            },
            reordered: 3,
            skipped: false,
        };
        let text = format_cycle(&result);
        assert!(text.contains("2 created, 0 updated, 1 completed"));
        assert!(text.contains("- jira (me@corp.com)"));
        assert!(text.contains("Re-authorization needed for: me@corp.com"));
        assert!(text.contains("run refresh again"));

        let skipped = CycleResult {
            skipped: true,
            ..Default::default()
        };
        assert_eq!(format_cycle(&skipped), "Refreshed moments ago; fetch skipped");
    }

    #[test]
    fn test_format_accounts() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        let mut bad = AccountToken::new("u1", "google", "me@corp.com");
        bad.is_bad_token = true;
        bad.bad_since = Some(now);
        let good = AccountToken::new("u1", "jira", "me@corp.com");

        let mut cursor = RefreshCursor::new("google:me@corp.com", "gmail");
        cursor.last_completed_cursor = Some("h-1".to_string());
        cursor.state = RefreshState::InProgress {
            in_progress_cursor: Some("h-2".to_string()),
            next_page_token: "abc".to_string(),
            started_at: now,
            seen: Vec::new(),
        };

        let text = format_accounts(&[(&bad, vec![&cursor]), (&good, vec![])]);
        assert!(text.contains("- me@corp.com (google): needs re-authorization since 2025-03-10"));
        assert!(text.contains("gmail: in progress since 2025-03-10 09:00:00, next page abc (marker h-1)"));
        assert!(text.contains("- me@corp.com (jira): ok"));
        assert_eq!(format_accounts(&[]), "No linked accounts");
    }
}
