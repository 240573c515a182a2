//! MCP tool handlers for the sync server
//!
//! Each tool lives in its own file as an `impl SyncServerHandler` block.

pub mod accounts;
pub mod complete;
pub mod list;
pub mod refresh;
pub mod reorder;
