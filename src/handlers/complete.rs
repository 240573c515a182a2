//! Complete handler for the sync server

use crate::SyncServerHandler;
use crate::validation;
use mcp_attr::{Result as McpResult, bail, bail_public};

impl SyncServerHandler {
    /// Marks items completed on the user's behalf.
    /// **Batch**: each id is handled independently; failures are listed
    /// after the successes.
    pub async fn handle_complete(
        &self,
        user: Option<String>,
        ids: Vec<String>,
    ) -> McpResult<String> {
        if ids.is_empty() {
            bail_public!(_, "No IDs provided. Please specify at least one item ID.");
        }
        let user_id = self.resolve_user(user);

        let mut successes = Vec::new();
        let mut failures = Vec::new();
        for id in &ids {
            let item_id = match validation::normalize_item_id(id) {
                Ok(item_id) => item_id,
                Err(_) => {
                    failures.push("(blank): item id must not be empty".to_string());
                    continue;
                }
            };
            match self.engine.complete(&self.data, &user_id, &item_id).await {
                Ok(()) => successes.push(item_id),
                Err(e) if validation::is_user_error(&e) => {
                    failures.push(format!("{}: {}", item_id, e));
                }
                Err(e) => bail!("Complete failed for {}: {}", item_id, e),
            }
        }

        if !successes.is_empty()
            && let Err(e) = self.save_data()
        {
            bail_public!(_, "Failed to save: {}", e);
        }

        let mut response = String::new();
        if !successes.is_empty() {
            response.push_str(&format!(
                "Successfully completed {} item{}:\n",
                successes.len(),
                if successes.len() == 1 { "" } else { "s" }
            ));
            for id in &successes {
                response.push_str(&format!("- {}\n", id));
            }
        }

        if !failures.is_empty() {
            if !response.is_empty() {
                response.push('\n');
            }
            response.push_str(&format!(
                "Failed to complete {} item{}:\n",
                failures.len(),
                if failures.len() == 1 { "" } else { "s" }
            ));
            for failure in &failures {
                response.push_str(&format!("- {}\n", failure));
            }
        }

        if successes.is_empty() {
            bail_public!(_, "{}", response.trim());
        }

        Ok(response.trim().to_string())
    }
}
