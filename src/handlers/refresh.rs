//! Refresh handler for the sync server

use crate::SyncServerHandler;
use crate::engine::RefreshOptions;
use crate::formatting;
use mcp_attr::{Result as McpResult, bail, bail_public};
use tracing::warn;

impl SyncServerHandler {
    /// Runs one refresh cycle and persists the result.
    ///
    /// A failed cycle discards its in-memory changes so the next call starts
    /// from the last saved state.
    pub async fn handle_refresh(
        &self,
        user: Option<String>,
        full_refresh: Option<bool>,
        force: Option<bool>,
    ) -> McpResult<String> {
        let user_id = self.resolve_user(user);
        let options = RefreshOptions {
            full_refresh: full_refresh.unwrap_or(false),
            force: force.unwrap_or(false),
        };

        let result = match self.engine.refresh(&self.data, &user_id, options).await {
            Ok(result) => result,
            Err(e) => {
                if let Err(reload) = self.reload_data() {
                    warn!(error = %reload, "failed to restore saved state");
                }
                bail!("Refresh failed: {}", e);
            }
        };

        if let Err(e) = self.save_data() {
            bail_public!(_, "Failed to save: {}", e);
        }

        Ok(formatting::format_cycle(&result))
    }
}
