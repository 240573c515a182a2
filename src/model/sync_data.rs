use super::cursor::RefreshCursor;
use super::item::{Item, Lifecycle, NaturalKey, SectionId};
use super::store::ItemStore;
use super::token::AccountToken;
use crate::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-user bookkeeping that is not tied to an item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserState {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct SyncData {
    /// Format version for the TOML file (current: 1)
    pub format_version: u32,

    /// All items ever synchronized, in insertion order
    ///
    /// A Vec keeps TOML output stable between saves. Items are never removed;
    /// lifecycle flags carry completion and deletion.
    pub(crate) items: Vec<Item>,

    /// Natural key -> internal id
    ///
    /// Not serialized; rebuilt from `items` on load.
    pub(crate) key_index: HashMap<NaturalKey, String>,

    pub(crate) tokens: Vec<AccountToken>,

    pub(crate) cursors: Vec<RefreshCursor>,

    pub(crate) users: Vec<UserState>,

    /// Counter for generating internal item ids
    pub item_counter: u64,
}

impl Default for SyncData {
    fn default() -> Self {
        Self {
            format_version: 1,
            items: Vec::new(),
            key_index: HashMap::new(),
            tokens: Vec::new(),
            cursors: Vec::new(),
            users: Vec::new(),
            item_counter: 0,
        }
    }
}

// Serialize/Deserialize implementations are in serde_impl.rs

impl SyncData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a new unique item id
    pub fn generate_item_id(&mut self) -> String {
        self.item_counter += 1;
        format!("item-{}", self.item_counter)
    }

    fn find_item_mut(&mut self, item_id: &str) -> Option<&mut Item> {
        self.items.iter_mut().find(|i| i.id == item_id)
    }

    fn find_token_mut(&mut self, token_id: &str) -> Option<&mut AccountToken> {
        self.tokens.iter_mut().find(|t| t.token_id == token_id)
    }

    /// Register a linked account, keeping the stored bad-token state of an
    /// account that is already known
    pub fn link_account(&mut self, token: AccountToken) {
        if let Some(existing) = self.find_token_mut(&token.token_id) {
            existing.user_id = token.user_id;
            existing.service = token.service;
            existing.account_id = token.account_id;
        } else {
            self.tokens.push(token);
        }
    }

    fn user_state_mut(&mut self, user_id: &str) -> &mut UserState {
        if let Some(pos) = self.users.iter().position(|u| u.user_id == user_id) {
            &mut self.users[pos]
        } else {
            self.users.push(UserState {
                user_id: user_id.to_string(),
                last_refreshed_at: None,
            });
            let last = self.users.len() - 1;
            &mut self.users[last]
        }
    }

    /// Rebuild the natural-key index from the item list
    pub(crate) fn rebuild_index(&mut self) {
        self.key_index = self
            .items
            .iter()
            .map(|item| (item.natural_key(), item.id.clone()))
            .collect();
    }
}

impl ItemStore for SyncData {
    fn active_items(&self, user_id: &str) -> Result<Vec<Item>> {
        Ok(self
            .items
            .iter()
            .filter(|i| i.user_id == user_id && i.is_active())
            .cloned()
            .collect())
    }

    fn find_item(&self, item_id: &str) -> Result<Option<Item>> {
        Ok(self.items.iter().find(|i| i.id == item_id).cloned())
    }

    fn upsert_item(&mut self, item: Item) -> Result<String> {
        if !item.has_natural_key() {
            return Err(SyncError::InvalidInput(format!(
                "item '{}' is missing natural key fields",
                item.title
            )));
        }

        let key = item.natural_key();
        if let Some(id) = self.key_index.get(&key).cloned() {
            let existing = self
                .find_item_mut(&id)
                .ok_or_else(|| SyncError::persistence(format!("index points at missing item {}", id)))?;
            if existing.is_active() {
                let created_at = existing.created_at;
                let lifecycle = existing.lifecycle;
                *existing = Item {
                    id: id.clone(),
                    created_at,
                    lifecycle,
                    ..item
                };
            } else {
                let updated_at = item.updated_at;
                existing.absorb(&item, updated_at);
            }
            return Ok(id);
        }

        let id = self.generate_item_id();
        let item = Item {
            id: id.clone(),
            lifecycle: Lifecycle::Active,
            ..item
        };
        self.key_index.insert(key, id.clone());
        self.items.push(item);
        Ok(id)
    }

    fn mark_completed(&mut self, item_id: &str, lifecycle: Lifecycle) -> Result<()> {
        let item = self
            .find_item_mut(item_id)
            .ok_or_else(|| SyncError::NotFound(format!("item {}", item_id)))?;
        item.lifecycle = item.lifecycle.transition(item_id, lifecycle)?;
        Ok(())
    }

    fn set_ordering_index(&mut self, item_id: &str, index: u32) -> Result<()> {
        let item = self
            .find_item_mut(item_id)
            .ok_or_else(|| SyncError::NotFound(format!("item {}", item_id)))?;
        item.ordering_index = index;
        Ok(())
    }

    fn move_item(&mut self, item_id: &str, section: &SectionId, index: u32) -> Result<()> {
        let item = self
            .find_item_mut(item_id)
            .ok_or_else(|| SyncError::NotFound(format!("item {}", item_id)))?;
        item.section = section.clone();
        item.ordering_index = index;
        item.manually_reordered = true;
        Ok(())
    }

    fn tokens(&self, user_id: &str) -> Result<Vec<AccountToken>> {
        Ok(self
            .tokens
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    fn mark_token_bad(&mut self, token_id: &str, at: DateTime<Utc>) -> Result<()> {
        let token = self
            .find_token_mut(token_id)
            .ok_or_else(|| SyncError::NotFound(format!("token {}", token_id)))?;
        if !token.is_bad_token {
            token.is_bad_token = true;
            token.bad_since = Some(at);
        }
        Ok(())
    }

    fn clear_token_bad(&mut self, token_id: &str) -> Result<()> {
        let token = self
            .find_token_mut(token_id)
            .ok_or_else(|| SyncError::NotFound(format!("token {}", token_id)))?;
        token.is_bad_token = false;
        token.bad_since = None;
        Ok(())
    }

    fn refresh_cursor(&self, token_id: &str, source_id: &str) -> Result<RefreshCursor> {
        Ok(self
            .cursors
            .iter()
            .find(|c| c.token_id == token_id && c.source_id == source_id)
            .cloned()
            .unwrap_or_else(|| RefreshCursor::new(token_id, source_id)))
    }

    fn set_refresh_cursor(&mut self, cursor: RefreshCursor) -> Result<()> {
        match self
            .cursors
            .iter_mut()
            .find(|c| c.token_id == cursor.token_id && c.source_id == cursor.source_id)
        {
            Some(existing) => *existing = cursor,
            None => self.cursors.push(cursor),
        }
        Ok(())
    }

    fn last_refreshed(&self, user_id: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .users
            .iter()
            .find(|u| u.user_id == user_id)
            .and_then(|u| u.last_refreshed_at))
    }

    fn set_last_refreshed(&mut self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.user_state_mut(user_id).last_refreshed_at = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemKind;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    fn task(external_id: &str) -> Item {
        Item::new(
            "u1",
            "me@corp.com",
            "jira",
            external_id,
            format!("Task {}", external_id),
            ItemKind::Task {
                due: None,
                priority: 0,
                sequence: 0,
            },
            now(),
        )
    }

    #[test]
    fn test_upsert_assigns_ids_and_indexes_by_natural_key() {
        let mut data = SyncData::new();
        let first = data.upsert_item(task("T-1")).unwrap();
        let second = data.upsert_item(task("T-2")).unwrap();
        assert_eq!(first, "item-1");
        assert_eq!(second, "item-2");
        assert_eq!(data.key_index.len(), 2);

        // Same natural key updates in place
        let mut renamed = task("T-1");
        renamed.title = "Renamed".to_string();
        let again = data.upsert_item(renamed).unwrap();
        assert_eq!(again, "item-1");
        assert_eq!(data.items.len(), 2);
        assert_eq!(data.find_item("item-1").unwrap().unwrap().title, "Renamed");
    }

    #[test]
    fn test_upsert_never_reactivates_terminal_items() {
        let mut data = SyncData::new();
        let id = data.upsert_item(task("T-1")).unwrap();
        data.mark_completed(&id, Lifecycle::Completed).unwrap();

        let mut fetched = task("T-1");
        fetched.title = "Still reported".to_string();
        data.upsert_item(fetched).unwrap();

        let stored = data.find_item(&id).unwrap().unwrap();
        assert_eq!(stored.lifecycle, Lifecycle::Completed);
        assert_eq!(stored.title, "Still reported");
        assert!(data.active_items("u1").unwrap().is_empty());
    }

    #[test]
    fn test_upsert_rejects_missing_natural_key() {
        let mut data = SyncData::new();
        let result = data.upsert_item(task(""));
        assert!(matches!(result, Err(SyncError::InvalidInput(_))));
        assert!(data.items.is_empty());
    }

    #[test]
    fn test_mark_completed_is_one_way() {
        let mut data = SyncData::new();
        let id = data.upsert_item(task("T-1")).unwrap();
        data.mark_completed(&id, Lifecycle::Deleted).unwrap();
        let err = data.mark_completed(&id, Lifecycle::Completed).unwrap_err();
        assert!(matches!(err, SyncError::InvalidTransition { .. }));
        assert!(matches!(
            data.mark_completed("item-99", Lifecycle::Completed),
            Err(SyncError::NotFound(_))
        ));
    }

    #[test]
    fn test_move_item_pins_position() {
        let mut data = SyncData::new();
        let id = data.upsert_item(task("T-1")).unwrap();
        data.move_item(&id, &SectionId::backlog(), 3).unwrap();
        let stored = data.find_item(&id).unwrap().unwrap();
        assert_eq!(stored.section, SectionId::backlog());
        assert_eq!(stored.ordering_index, 3);
        assert!(stored.manually_reordered);
    }

    #[test]
    fn test_token_health_flags() {
        let mut data = SyncData::new();
        data.link_account(AccountToken::new("u1", "google", "me@corp.com"));
        data.mark_token_bad("google:me@corp.com", now()).unwrap();
        assert!(data.tokens("u1").unwrap()[0].is_bad_token);

        // Relinking from configuration keeps the stored flag
        data.link_account(AccountToken::new("u1", "google", "me@corp.com"));
        assert_eq!(data.tokens.len(), 1);
        assert!(data.tokens[0].is_bad_token);

        data.clear_token_bad("google:me@corp.com").unwrap();
        assert!(!data.tokens("u1").unwrap()[0].is_bad_token);
        assert!(data.tokens("u2").unwrap().is_empty());
    }

    #[test]
    fn test_cursor_and_last_refreshed() {
        let mut data = SyncData::new();
        let cursor = data.refresh_cursor("google:me@corp.com", "gmail").unwrap();
        assert_eq!(cursor.last_completed_cursor, None);

        let mut updated = cursor.clone();
        updated.last_completed_cursor = Some("h-5".to_string());
        data.set_refresh_cursor(updated.clone()).unwrap();
        data.set_refresh_cursor(updated).unwrap();
        assert_eq!(data.cursors.len(), 1);

        assert_eq!(data.last_refreshed("u1").unwrap(), None);
        data.set_last_refreshed("u1", now()).unwrap();
        assert_eq!(data.last_refreshed("u1").unwrap(), Some(now()));
    }
}
