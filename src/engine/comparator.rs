//! Initial placement order for items without a stored position

use crate::model::{Item, ItemKind, email_domain};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::str::FromStr;

/// User preference for ordering email threads by send time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailOrder {
    #[default]
    OldestFirst,
    NewestFirst,
}

impl FromStr for EmailOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oldest_first" => Ok(EmailOrder::OldestFirst),
            "newest_first" => Ok(EmailOrder::NewestFirst),
            _ => Err(format!(
                "Invalid email order '{}'. Valid options are: oldest_first, newest_first",
                s
            )),
        }
    }
}

/// Sort key derived from an item; comparing keys is the comparator
///
/// Every component is totally ordered and the key ends with the natural key,
/// so two distinct items of the same user never compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RankKey<'a> {
    /// 0 = self-domain email, 1 = due inside the lookahead window, 2 = the rest
    tier: u8,
    due: Option<DateTime<Utc>>,
    priority: Reverse<u32>,
    kind: u8,
    secondary: i64,
    created_at: DateTime<Utc>,
    source_id: &'a str,
    external_id: &'a str,
}

/// Total order over heterogeneous items
#[derive(Debug, Clone)]
pub struct CrossTypeComparator {
    now: DateTime<Utc>,
    lookahead: Duration,
    email_order: EmailOrder,
}

impl CrossTypeComparator {
    pub fn new(now: DateTime<Utc>, lookahead: Duration, email_order: EmailOrder) -> Self {
        Self {
            now,
            lookahead,
            email_order,
        }
    }

    fn is_self_domain(item: &Item) -> bool {
        match &item.kind {
            ItemKind::EmailThread { sender_domain, .. } => email_domain(&item.account_id)
                .is_some_and(|own| own.eq_ignore_ascii_case(sender_domain.trim())),
            _ => false,
        }
    }

    fn kind_rank(kind: &ItemKind) -> u8 {
        match kind {
            ItemKind::Task { .. } => 0,
            ItemKind::MeetingPrep { .. } => 1,
            ItemKind::PullRequest { .. } => 2,
            ItemKind::CalendarEvent { .. } => 3,
            ItemKind::EmailThread { .. } => 4,
        }
    }

    pub fn rank_key<'a>(&self, item: &'a Item) -> RankKey<'a> {
        let horizon = self.now + self.lookahead;
        let due_soon = item.kind.due_at().filter(|due| *due <= horizon);
        let tier = if Self::is_self_domain(item) {
            0
        } else if due_soon.is_some() {
            1
        } else {
            2
        };

        let secondary = match &item.kind {
            ItemKind::Task { sequence, .. } => i64::try_from(*sequence).unwrap_or(i64::MAX),
            ItemKind::PullRequest { number, .. } => i64::try_from(*number).unwrap_or(i64::MAX),
            ItemKind::EmailThread { sent_at, .. } => match self.email_order {
                EmailOrder::OldestFirst => sent_at.timestamp(),
                EmailOrder::NewestFirst => -sent_at.timestamp(),
            },
            ItemKind::CalendarEvent { starts_at, .. } | ItemKind::MeetingPrep { starts_at, .. } => {
                starts_at.timestamp()
            }
        };

        RankKey {
            tier,
            due: if tier == 1 { due_soon } else { None },
            priority: Reverse(item.kind.priority()),
            kind: Self::kind_rank(&item.kind),
            secondary,
            created_at: item.created_at,
            source_id: &item.source_id,
            external_id: &item.external_id,
        }
    }

    pub fn rank_cmp(&self, a: &Item, b: &Item) -> Ordering {
        self.rank_key(a).cmp(&self.rank_key(b))
    }

    /// Display order used to seed index assignment
    ///
    /// Items that already hold a position keep their relative order; unplaced
    /// items are merged in at the position their rank dictates.
    pub fn seed_order<'a>(&self, items: Vec<&'a Item>) -> Vec<&'a Item> {
        let (mut placed, mut fresh): (Vec<&Item>, Vec<&Item>) =
            items.into_iter().partition(|i| i.ordering_index > 0);
        placed.sort_by(|a, b| {
            a.ordering_index
                .cmp(&b.ordering_index)
                .then_with(|| self.rank_cmp(a, b))
        });
        fresh.sort_by(|a, b| self.rank_cmp(a, b));

        let mut merged = Vec::with_capacity(placed.len() + fresh.len());
        let mut placed = placed.into_iter().peekable();
        let mut fresh = fresh.into_iter().peekable();
        loop {
            let take_fresh = match (placed.peek(), fresh.peek()) {
                (Some(p), Some(f)) => self.rank_cmp(f, p) == Ordering::Less,
                (None, Some(_)) => true,
                (Some(_), None) => false,
                (None, None) => break,
            };
            let next = if take_fresh { fresh.next() } else { placed.next() };
            merged.extend(next);
        }
        merged
    }
}
