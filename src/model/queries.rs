//! Read-only views over SyncData used by the tool handlers

use super::cursor::RefreshCursor;
use super::item::{Item, SectionId};
use super::sync_data::SyncData;
use super::token::AccountToken;
use std::collections::BTreeSet;

impl SyncData {
    /// Active items of a user, ordered by section and then ordering index
    ///
    /// Built-in sections come first (today, blocked, backlog), user sections
    /// follow alphabetically. Unplaced items (index 0) sort last in a section.
    pub fn items_for_user(&self, user_id: &str) -> Vec<&Item> {
        let mut items: Vec<&Item> = self
            .items
            .iter()
            .filter(|i| i.user_id == user_id && i.is_active())
            .collect();
        items.sort_by(|a, b| {
            section_rank(&a.section)
                .cmp(&section_rank(&b.section))
                .then_with(|| a.section.cmp(&b.section))
                .then_with(|| placed_index(a).cmp(&placed_index(b)))
                .then_with(|| a.id.cmp(&b.id))
        });
        items
    }

    /// Active items of a user in one section, in display order
    pub fn section_items(&self, user_id: &str, section: &SectionId) -> Vec<&Item> {
        self.items_for_user(user_id)
            .into_iter()
            .filter(|i| &i.section == section)
            .collect()
    }

    /// Sections that currently hold active items of a user
    pub fn sections(&self, user_id: &str) -> BTreeSet<SectionId> {
        self.items
            .iter()
            .filter(|i| i.user_id == user_id && i.is_active())
            .map(|i| i.section.clone())
            .collect()
    }

    pub fn find_by_id(&self, item_id: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.id == item_id)
    }

    pub fn all_items(&self) -> &[Item] {
        &self.items
    }

    pub fn linked_accounts(&self, user_id: &str) -> Vec<&AccountToken> {
        self.tokens.iter().filter(|t| t.user_id == user_id).collect()
    }

    /// Stored refresh cursors of one linked account, by source id
    pub fn cursors_for_token(&self, token_id: &str) -> Vec<&RefreshCursor> {
        let mut cursors: Vec<&RefreshCursor> = self
            .cursors
            .iter()
            .filter(|c| c.token_id == token_id)
            .collect();
        cursors.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        cursors
    }
}

fn section_rank(section: &SectionId) -> u8 {
    match section.as_str() {
        super::item::SECTION_TODAY => 0,
        super::item::SECTION_BLOCKED => 1,
        super::item::SECTION_BACKLOG => 2,
        _ => 3,
    }
}

fn placed_index(item: &Item) -> u32 {
    if item.ordering_index == 0 {
        u32::MAX
    } else {
        item.ordering_index
    }
}
