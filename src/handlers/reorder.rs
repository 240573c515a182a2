//! Reorder handler for the sync server

use crate::SyncServerHandler;
use crate::validation;
use mcp_attr::{Result as McpResult, bail, bail_public};

impl SyncServerHandler {
    /// Pins an item at a position, optionally moving it to another section.
    pub async fn handle_reorder(
        &self,
        user: Option<String>,
        id: String,
        index: u32,
        section: Option<String>,
    ) -> McpResult<String> {
        let user_id = self.resolve_user(user);
        let item_id = validation::normalize_item_id(&id)?;
        let index = validation::validate_index(index)?;
        let target = match section {
            Some(ref section_str) => Some(validation::parse_section(section_str)?),
            None => None,
        };

        match self
            .engine
            .reorder(&self.data, &user_id, &item_id, target, index)
            .await
        {
            Ok(_) => {}
            Err(e) if validation::is_user_error(&e) => bail_public!(_, "{}", e),
            Err(e) => bail!("Reorder failed: {}", e),
        }

        if let Err(e) = self.save_data() {
            bail_public!(_, "Failed to save: {}", e);
        }

        let placed = {
            let data = match self.data.lock() {
                Ok(data) => data,
                Err(e) => bail!("Data lock poisoned: {}", e),
            };
            data.find_by_id(&item_id)
                .map(|item| (item.section.clone(), item.ordering_index))
        };
        match placed {
            Some((section, position)) => Ok(format!(
                "Moved {} to position {} in {}",
                item_id, position, section
            )),
            None => bail!("Item {} vanished after reorder", item_id),
        }
    }
}
