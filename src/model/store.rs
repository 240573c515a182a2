use super::cursor::RefreshCursor;
use super::item::{Item, Lifecycle, SectionId};
use super::token::AccountToken;
use crate::error::Result;
use chrono::{DateTime, Utc};

/// Persistence operations consumed by the engine
///
/// Every operation is individually atomic; the engine never composes them into
/// larger transactions and tolerates partial application across a cycle.
pub trait ItemStore {
    /// Items in the `Active` lifecycle state for a user
    fn active_items(&self, user_id: &str) -> Result<Vec<Item>>;

    fn find_item(&self, item_id: &str) -> Result<Option<Item>>;

    /// Insert or update by natural key, returning the internal id
    ///
    /// Lifecycle is never changed by an upsert. Updating an item that already
    /// left `Active` only refreshes its source payload.
    fn upsert_item(&mut self, item: Item) -> Result<String>;

    /// Move an active item to a terminal lifecycle state
    fn mark_completed(&mut self, item_id: &str, lifecycle: Lifecycle) -> Result<()>;

    fn set_ordering_index(&mut self, item_id: &str, index: u32) -> Result<()>;

    /// Pin an item at `index` in `section` (manual reorder)
    fn move_item(&mut self, item_id: &str, section: &SectionId, index: u32) -> Result<()>;

    fn tokens(&self, user_id: &str) -> Result<Vec<AccountToken>>;

    fn mark_token_bad(&mut self, token_id: &str, at: DateTime<Utc>) -> Result<()>;

    fn clear_token_bad(&mut self, token_id: &str) -> Result<()>;

    /// Stored cursor, or a fresh idle one
    fn refresh_cursor(&self, token_id: &str, source_id: &str) -> Result<RefreshCursor>;

    fn set_refresh_cursor(&mut self, cursor: RefreshCursor) -> Result<()>;

    fn last_refreshed(&self, user_id: &str) -> Result<Option<DateTime<Utc>>>;

    fn set_last_refreshed(&mut self, user_id: &str, at: DateTime<Utc>) -> Result<()>;
}
