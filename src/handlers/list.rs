//! List handler for the sync server

use crate::SyncServerHandler;
use crate::formatting;
use crate::validation;
use mcp_attr::{Result as McpResult, bail};

impl SyncServerHandler {
    /// Lists a user's active items in display order, optionally for one section.
    pub async fn handle_list(
        &self,
        user: Option<String>,
        section: Option<String>,
        exclude_body: Option<bool>,
    ) -> McpResult<String> {
        let user_id = self.resolve_user(user);
        let section_filter = match section {
            Some(ref section_str) => Some(validation::parse_section(section_str)?),
            None => None,
        };

        let data = match self.data.lock() {
            Ok(data) => data,
            Err(e) => bail!("Data lock poisoned: {}", e),
        };
        let items = match section_filter {
            Some(ref section) => data.section_items(&user_id, section),
            None => data.items_for_user(&user_id),
        };
        let mut reauth: Vec<String> = data
            .linked_accounts(&user_id)
            .into_iter()
            .filter(|t| t.is_bad_token)
            .map(|t| t.account_id.clone())
            .collect();
        reauth.sort();
        reauth.dedup();

        let mut result = String::new();
        if !reauth.is_empty() {
            result.push_str(&formatting::format_reauth_notice(&reauth));
            result.push('\n');
        }
        result.push_str(&formatting::format_items(
            &items,
            exclude_body.unwrap_or(false),
        ));
        Ok(result)
    }
}
