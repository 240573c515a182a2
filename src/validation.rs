//! Validation helper functions for tool parameters
//!
//! Parse user-supplied strings into domain values and classify engine
//! errors into those the caller can correct and internal failures.

use crate::error::SyncError;
use crate::model::SectionId;
use mcp_attr::Result as McpResult;

fn invalid_params(message: String) -> mcp_attr::Error {
    mcp_attr::Error::new(mcp_attr::ErrorCode::INVALID_PARAMS).with_message(message, true)
}

/// Parse and validate a section id
///
/// # Arguments
/// * `section_str` - Built-in (today, blocked, backlog) or user-defined section
pub fn parse_section(section_str: &str) -> McpResult<SectionId> {
    section_str.parse::<SectionId>().map_err(invalid_params)
}

/// Validate a 1-based ordering position
pub fn validate_index(index: u32) -> McpResult<u32> {
    if index == 0 {
        return Err(invalid_params(
            "Invalid index 0. Positions start at 1 (1 = top of the section)".to_string(),
        ));
    }
    Ok(index)
}

/// Trim an item id, rejecting blank ids
pub fn normalize_item_id(item_id: &str) -> McpResult<String> {
    let trimmed = item_id.trim();
    if trimmed.is_empty() {
        return Err(invalid_params("Item id must not be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

/// Engine errors the caller can fix by changing the request
pub fn is_user_error(err: &SyncError) -> bool {
    matches!(
        err,
        SyncError::InvalidInput(_) | SyncError::NotFound(_) | SyncError::InvalidTransition { .. }
    )
}
