//! Diff of fetched items against the persisted active set

use super::fetcher::{SourceResult, SyncMode};
use crate::error::Result;
use crate::model::{Item, ItemStore, Lifecycle, SectionId};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// A stored item refreshed from its source
#[derive(Debug, Clone, PartialEq)]
pub struct ItemUpdate {
    pub item_id: String,
    /// Full new state of the item
    pub item: Item,
    /// The ranking fields moved and the item will be placed again
    pub ordering_reset: bool,
}

/// An implicit lifecycle transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleChange {
    pub item_id: String,
    pub to: Lifecycle,
}

/// Everything one cycle will write, computed without touching the store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    pub inserts: Vec<Item>,
    pub updates: Vec<ItemUpdate>,
    pub lifecycle_changes: Vec<LifecycleChange>,
    pub unchanged: usize,
    /// Malformed or duplicate fetched items
    pub dropped: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub created: usize,
    pub updated: usize,
    pub completed: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub dropped: usize,
}

type SourceScope<'a> = (&'a str, &'a str);

pub struct Reconciler;

impl Reconciler {
    /// Compute the writes for one cycle
    ///
    /// `active` is the user's active set captured before the cycle. Items
    /// of failed sources are never touched; absence only counts for
    /// authoritative snapshot results of accounts that reported no bad token
    /// this cycle.
    #[tracing::instrument(level = "debug", skip(active, results), fields(active = active.len(), sources = results.len()))]
    pub fn plan(
        user_id: &str,
        active: &[Item],
        results: &[SourceResult],
        now: DateTime<Utc>,
    ) -> ReconcilePlan {
        let mut plan = ReconcilePlan::default();

        // (source, external) -> stored item
        let stored: HashMap<(&str, &str), &Item> = active
            .iter()
            .filter(|i| i.user_id == user_id && i.is_active())
            .map(|i| ((i.source_id.as_str(), i.external_id.as_str()), i))
            .collect();

        let bad_tokens: HashSet<&str> = results
            .iter()
            .filter(|r| r.outcome.is_bad_token)
            .map(|r| r.token_id.as_str())
            .collect();

        let mut seen: HashSet<(String, String)> = HashSet::new();
        for result in results.iter().filter(|r| r.succeeded()) {
            for fetched in &result.outcome.items {
                let Some(fetched) = Self::normalize(fetched, user_id, result) else {
                    warn!(
                        source = %result.key,
                        title = %fetched.title,
                        "dropping malformed item"
                    );
                    plan.dropped += 1;
                    continue;
                };

                let key = (fetched.source_id.clone(), fetched.external_id.clone());
                if !seen.insert(key) {
                    debug!(
                        source = %result.key,
                        external_id = %fetched.external_id,
                        "duplicate item skipped"
                    );
                    plan.dropped += 1;
                    continue;
                }

                match stored.get(&(fetched.source_id.as_str(), fetched.external_id.as_str())) {
                    Some(existing) if existing.payload_differs(&fetched) => {
                        let ordering_reset = !existing.manually_reordered
                            && existing.ordering_index > 0
                            && existing.ranking_changed(&fetched);
                        let mut item = (*existing).clone();
                        item.absorb(&fetched, now);
                        if ordering_reset {
                            item.ordering_index = 0;
                        }
                        plan.updates.push(ItemUpdate {
                            item_id: existing.id.clone(),
                            item,
                            ordering_reset,
                        });
                    }
                    Some(_) => plan.unchanged += 1,
                    None => plan.inserts.push(fetched),
                }
            }
        }

        let mut closing: HashSet<&str> = HashSet::new();

        // Snapshot absence
        for result in results.iter().filter(|r| r.is_authoritative()) {
            if bad_tokens.contains(result.token_id.as_str()) {
                continue;
            }
            let scope: SourceScope = (result.key.account_id.as_str(), result.key.source_id.as_str());
            let earlier: HashSet<&str> = result.earlier_pages.iter().map(String::as_str).collect();
            for item in stored.values() {
                if (item.account_id.as_str(), item.source_id.as_str()) != scope
                    || earlier.contains(item.external_id.as_str())
                {
                    continue;
                }
                let key = (item.source_id.clone(), item.external_id.clone());
                if !seen.contains(&key) && closing.insert(item.id.as_str()) {
                    debug!(item_id = %item.id, to = %result.absence, "absent from healthy fetch");
                    plan.lifecycle_changes.push(LifecycleChange {
                        item_id: item.id.clone(),
                        to: result.absence,
                    });
                }
            }
        }

        // Explicit removals reported by incremental sources
        for result in results
            .iter()
            .filter(|r| r.succeeded() && r.mode == SyncMode::Incremental)
        {
            if bad_tokens.contains(result.token_id.as_str()) {
                continue;
            }
            for external_id in &result.outcome.removed {
                let Some(item) = stored.get(&(result.key.source_id.as_str(), external_id.as_str()))
                else {
                    continue;
                };
                if item.account_id != result.key.account_id {
                    continue;
                }
                if closing.insert(item.id.as_str()) {
                    plan.lifecycle_changes.push(LifecycleChange {
                        item_id: item.id.clone(),
                        to: result.absence,
                    });
                }
            }
        }

        // Keep output stable for identical inputs
        plan.lifecycle_changes.sort_by(|a, b| a.item_id.cmp(&b.item_id));
        plan
    }

    /// Fill in ownership fields and reset placement of a fetched item
    fn normalize(fetched: &Item, user_id: &str, result: &SourceResult) -> Option<Item> {
        let mut item = fetched.clone();
        if item.user_id.trim().is_empty() {
            item.user_id = user_id.to_string();
        }
        if item.source_id.trim().is_empty() {
            item.source_id = result.key.source_id.clone();
        }
        if item.account_id.trim().is_empty() {
            item.account_id = result.key.account_id.clone();
        }
        if !item.has_natural_key() || item.user_id != user_id {
            return None;
        }
        item.id = String::new();
        item.section = SectionId::default();
        item.ordering_index = 0;
        item.manually_reordered = false;
        item.lifecycle = Lifecycle::Active;
        Some(item)
    }
}

impl ReconcilePlan {
    pub fn is_noop(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.lifecycle_changes.is_empty()
    }

    /// Write the plan; the first persistence error aborts
    pub fn apply<S: ItemStore + ?Sized>(self, store: &mut S) -> Result<ReconcileStats> {
        let mut stats = ReconcileStats {
            unchanged: self.unchanged,
            dropped: self.dropped,
            ..Default::default()
        };

        for item in self.inserts {
            let id = store.upsert_item(item)?;
            // A terminal item reported again only has its payload refreshed
            match store.find_item(&id)? {
                Some(stored) if stored.is_active() => stats.created += 1,
                _ => stats.unchanged += 1,
            }
        }
        for update in self.updates {
            if update.ordering_reset {
                debug!(item_id = %update.item_id, "ranking changed, placement reset");
            }
            store.upsert_item(update.item)?;
            stats.updated += 1;
        }
        for change in self.lifecycle_changes {
            store.mark_completed(&change.item_id, change.to)?;
            match change.to {
                Lifecycle::Deleted => stats.deleted += 1,
                _ => stats.completed += 1,
            }
        }
        Ok(stats)
    }
}
