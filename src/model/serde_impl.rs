//! Serialization and deserialization implementations for SyncData
//!
//! The natural-key index is derived state, so it is never written out and is
//! rebuilt from the item list on load.

use super::cursor::RefreshCursor;
use super::item::Item;
use super::sync_data::{SyncData, UserState};
use super::token::AccountToken;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Deserialize)]
struct SyncDataHelper {
    #[serde(default = "default_format_version")]
    format_version: u32,
    #[serde(default)]
    item_counter: u64,
    #[serde(default)]
    users: Vec<UserState>,
    #[serde(default)]
    tokens: Vec<AccountToken>,
    #[serde(default)]
    cursors: Vec<RefreshCursor>,
    #[serde(default)]
    items: Vec<Item>,
}

fn default_format_version() -> u32 {
    1
}

/// Normalize CRLF line endings in free-text fields
fn normalize_line_endings(items: &mut [Item]) {
    for item in items {
        item.title = item.title.replace("\r\n", "\n");
        if let Some(body) = &mut item.body {
            *body = body.replace("\r\n", "\n");
        }
    }
}

impl<'de> Deserialize<'de> for SyncData {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let helper = SyncDataHelper::deserialize(deserializer)?;
        let mut items = helper.items;
        normalize_line_endings(&mut items);

        // Keep the counter ahead of every stored id so new ids never collide
        let highest = items
            .iter()
            .filter_map(|i| i.id.strip_prefix("item-"))
            .filter_map(|n| n.parse::<u64>().ok())
            .max()
            .unwrap_or(0);

        let mut data = SyncData {
            format_version: helper.format_version,
            items,
            key_index: Default::default(),
            tokens: helper.tokens,
            cursors: helper.cursors,
            users: helper.users,
            item_counter: helper.item_counter.max(highest),
        };
        data.rebuild_index();
        Ok(data)
    }
}

impl Serialize for SyncData {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("SyncData", 6)?;
        state.serialize_field("format_version", &self.format_version)?;
        if self.item_counter != 0 {
            state.serialize_field("item_counter", &self.item_counter)?;
        }

        // Empty arrays are omitted to keep fresh files short
        if !self.users.is_empty() {
            state.serialize_field("users", &self.users)?;
        }
        if !self.tokens.is_empty() {
            state.serialize_field("tokens", &self.tokens)?;
        }
        if !self.cursors.is_empty() {
            state.serialize_field("cursors", &self.cursors)?;
        }
        if !self.items.is_empty() {
            state.serialize_field("items", &self.items)?;
        }

        state.end()
    }
}
