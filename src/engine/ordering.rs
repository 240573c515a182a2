//! Contiguous per-section ordering indices

use super::comparator::CrossTypeComparator;
use crate::error::{Result, SyncError};
use crate::model::{Item, ItemStore, SectionId};
use std::collections::BTreeSet;
use tracing::debug;

/// The positions of one (user, section) scope, owned for a single compaction
#[derive(Debug, Clone)]
pub struct OrderingState {
    pub user_id: String,
    pub section: SectionId,
    items: Vec<Item>,
}

impl OrderingState {
    /// Capture the active items of `section` out of `items`
    pub fn capture(user_id: &str, section: &SectionId, items: &[Item]) -> Self {
        Self {
            user_id: user_id.to_string(),
            section: section.clone(),
            items: items
                .iter()
                .filter(|i| i.user_id == user_id && &i.section == section && i.is_active())
                .cloned()
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// One index change produced by compaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexAssignment {
    pub item_id: String,
    pub from: u32,
    pub to: u32,
}

pub struct OrderingEngine {
    comparator: CrossTypeComparator,
}

impl OrderingEngine {
    pub fn new(comparator: CrossTypeComparator) -> Self {
        Self { comparator }
    }

    /// Assign indices 1..=N to every item of the scope
    ///
    /// Pinned items (manually reordered with a position) are placed first at
    /// their own index, clamped to N; a collision moves the later pin to the
    /// nearest free slot above, then below. Every other item fills the
    /// remaining slots in seed order. Only changed indices are returned.
    pub fn compact(&self, state: OrderingState) -> Vec<IndexAssignment> {
        let n = state.items.len();
        if n == 0 {
            return Vec::new();
        }

        let (mut pinned, floating): (Vec<&Item>, Vec<&Item>) = state
            .items
            .iter()
            .partition(|i| i.manually_reordered && i.ordering_index > 0);
        pinned.sort_by(|a, b| {
            a.ordering_index
                .cmp(&b.ordering_index)
                .then_with(|| a.id.cmp(&b.id))
        });

        // slots[0] is position 1
        let mut slots: Vec<Option<&Item>> = vec![None; n];
        for item in pinned {
            let desired = (item.ordering_index as usize).min(n) - 1;
            let slot = (desired..n)
                .find(|&s| slots[s].is_none())
                .or_else(|| (0..desired).rev().find(|&s| slots[s].is_none()));
            if let Some(slot) = slot {
                slots[slot] = Some(item);
            }
        }

        let mut seeded = self.comparator.seed_order(floating).into_iter();
        for slot in slots.iter_mut().filter(|s| s.is_none()) {
            *slot = seeded.next();
        }

        slots
            .into_iter()
            .enumerate()
            .filter_map(|(pos, item)| {
                let item = item?;
                let to = pos as u32 + 1;
                (item.ordering_index != to).then(|| IndexAssignment {
                    item_id: item.id.clone(),
                    from: item.ordering_index,
                    to,
                })
            })
            .collect()
    }

    /// Compact one section of a user and persist changed indices
    #[tracing::instrument(level = "debug", skip(self, store))]
    pub fn compact_section<S: ItemStore + ?Sized>(
        &self,
        store: &mut S,
        user_id: &str,
        section: &SectionId,
    ) -> Result<Vec<IndexAssignment>> {
        let active = store.active_items(user_id)?;
        let state = OrderingState::capture(user_id, section, &active);
        self.persist(store, self.compact(state))
    }

    /// Compact every section that currently holds active items of a user
    #[tracing::instrument(level = "debug", skip(self, store))]
    pub fn compact_user<S: ItemStore + ?Sized>(
        &self,
        store: &mut S,
        user_id: &str,
    ) -> Result<Vec<IndexAssignment>> {
        let active = store.active_items(user_id)?;
        let sections: BTreeSet<&SectionId> = active.iter().map(|i| &i.section).collect();

        let mut changes = Vec::new();
        for section in sections {
            let state = OrderingState::capture(user_id, section, &active);
            changes.extend(self.compact(state));
        }
        self.persist(store, changes)
    }

    /// Pin an item at position `index` of a section
    ///
    /// Every other active item of the target section at or after `index`
    /// moves down one place before both affected sections are compacted.
    #[tracing::instrument(level = "debug", skip(self, store))]
    pub fn reorder<S: ItemStore + ?Sized>(
        &self,
        store: &mut S,
        user_id: &str,
        item_id: &str,
        section: Option<SectionId>,
        index: u32,
    ) -> Result<Vec<IndexAssignment>> {
        if index == 0 {
            return Err(SyncError::InvalidInput(
                "ordering index must be at least 1".to_string(),
            ));
        }
        let item = store
            .find_item(item_id)?
            .filter(|i| i.user_id == user_id)
            .ok_or_else(|| SyncError::NotFound(format!("item {}", item_id)))?;
        if !item.is_active() {
            return Err(SyncError::InvalidInput(format!(
                "item {} is {} and cannot be reordered",
                item_id, item.lifecycle
            )));
        }

        let from_section = item.section.clone();
        let target = section.unwrap_or_else(|| from_section.clone());

        for other in store.active_items(user_id)? {
            if other.id != item_id && other.section == target && other.ordering_index >= index {
                store.set_ordering_index(&other.id, other.ordering_index + 1)?;
            }
        }
        store.move_item(item_id, &target, index)?;
        debug!(item_id, section = %target, index, "item pinned");

        let mut changes = self.compact_section(store, user_id, &target)?;
        if from_section != target {
            changes.extend(self.compact_section(store, user_id, &from_section)?);
        }
        Ok(changes)
    }

    fn persist<S: ItemStore + ?Sized>(
        &self,
        store: &mut S,
        changes: Vec<IndexAssignment>,
    ) -> Result<Vec<IndexAssignment>> {
        for change in &changes {
            store.set_ordering_index(&change.item_id, change.to)?;
        }
        Ok(changes)
    }
}
