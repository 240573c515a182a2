//! Accounts handler for the sync server

use crate::SyncServerHandler;
use crate::formatting;
use mcp_attr::{Result as McpResult, bail};

impl SyncServerHandler {
    /// Shows linked accounts, their token health and refresh progress.
    pub async fn handle_accounts(&self, user: Option<String>) -> McpResult<String> {
        let user_id = self.resolve_user(user);
        let data = match self.data.lock() {
            Ok(data) => data,
            Err(e) => bail!("Data lock poisoned: {}", e),
        };
        let accounts: Vec<_> = data
            .linked_accounts(&user_id)
            .into_iter()
            .map(|token| (token, data.cursors_for_token(&token.token_id)))
            .collect();
        Ok(formatting::format_accounts(&accounts))
    }
}
