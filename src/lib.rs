//! Tasksync MCP Server Library
//!
//! This library provides a Model Context Protocol (MCP) server that pulls work
//! items (tasks, email threads, calendar events, pull requests) from several
//! linked accounts, reconciles them into one per-user store, and keeps a
//! stable, user-adjustable ordering across refreshes.
//!
//! # Architecture
//!
//! The library follows a 3-layer architecture:
//! - **MCP Layer**: `SyncServerHandler` - Handles MCP protocol communication
//! - **Engine Layer**: `engine` module - Fan-out fetching, reconciliation,
//!   ordering and cursor tracking
//! - **Persistence Layer**: `model` and `storage` modules - The item store and
//!   its TOML file
//!
//! # Example
//!
//! ```no_run
//! use tasksync_mcp::{Config, SyncServerHandler};
//! use anyhow::Result;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load(Some(Path::new("tasksync.config.toml")))?;
//!     let handler = SyncServerHandler::new("tasksync.toml", &config)?;
//!     // Use handler with MCP server...
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
mod formatting;
mod handlers;
pub mod model;
pub mod sources;
mod storage;
mod validation;

use anyhow::{Result, anyhow};
use mcp_attr::Result as McpResult;
use mcp_attr::server::{McpServer, mcp_server};
use std::sync::Mutex;

// Re-export commonly used types
pub use config::Config;
pub use engine::{CycleResult, EngineSettings, RefreshOptions, SourceRegistry, SyncEngine};
pub use error::{SourceError, SyncError};
pub use model::{AccountToken, Item, ItemKind, ItemStore, Lifecycle, SectionId, SyncData};
pub use storage::Storage;

/// MCP Server handler for multi-source work item synchronization
///
/// Holds the in-memory store, the refresh engine and the file it persists to.
/// Every mutating tool saves the whole store after it succeeds.
pub struct SyncServerHandler {
    pub(crate) data: Mutex<SyncData>,
    pub(crate) storage: Storage,
    pub(crate) engine: SyncEngine,
    linked_accounts: Vec<AccountToken>,
    default_user: String,
}

impl SyncServerHandler {
    /// Create a new handler from a data file and a loaded configuration
    ///
    /// # Arguments
    /// * `storage_path` - Path to the sync data file (TOML format)
    /// * `config` - Linked accounts, their sources and engine settings
    pub fn new(storage_path: &str, config: &Config) -> Result<Self> {
        let engine = SyncEngine::new(config.registry(), config.settings.engine_settings());
        Self::from_parts(
            Storage::new(storage_path),
            engine,
            config.tokens(),
            &config.default_user,
        )
    }

    /// Assemble a handler from an engine built elsewhere
    pub fn from_parts(
        storage: Storage,
        engine: SyncEngine,
        linked_accounts: Vec<AccountToken>,
        default_user: &str,
    ) -> Result<Self> {
        let mut data = storage.load()?;
        for token in &linked_accounts {
            data.link_account(token.clone());
        }
        Ok(Self {
            data: Mutex::new(data),
            storage,
            engine,
            linked_accounts,
            default_user: default_user.to_string(),
        })
    }

    /// Save the current store to disk
    fn save_data(&self) -> Result<()> {
        let data = self
            .data
            .lock()
            .map_err(|e| anyhow!("data lock poisoned: {}", e))?;
        self.storage.save(&data)?;
        Ok(())
    }

    /// Replace the in-memory store with the last saved state
    fn reload_data(&self) -> Result<()> {
        let mut fresh = self.storage.load()?;
        for token in &self.linked_accounts {
            fresh.link_account(token.clone());
        }
        let mut data = self
            .data
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *data = fresh;
        drop(data);
        self.data.clear_poison();
        Ok(())
    }

    /// Resolve the user a tool call acts for, falling back to the configured default
    fn resolve_user(&self, user: Option<String>) -> String {
        match user {
            Some(user) if !user.trim().is_empty() => user.trim().to_string(),
            _ => self.default_user.clone(),
        }
    }
}

/// Work item synchronization server.
///
/// Pulls tasks, email threads, calendar events, meeting prep and pull requests
/// from every linked account into one list per user, ordered by a single
/// cross-type ranking that the user can override.
///
/// Key concepts:
/// - **refresh**: fetch all sources, reconcile, re-compact ordering
/// - **sections**: today, blocked, backlog, or any user-defined name
/// - **positions**: 1-based and contiguous within a section
/// - **pinned**: items the user moved keep their place across refreshes
///
/// Item IDs use format: item-1, item-2, item-3
#[mcp_server]
impl McpServer for SyncServerHandler {
    /// **Refresh**: Pull every linked source, reconcile, and re-rank. Run before reviewing.
    /// **Degraded sources** keep their items untouched; bad credentials are listed for re-authorization.
    /// **Paging**: when the result says more pages are pending, call refresh again.
    #[tool]
    async fn refresh(
        &self,
        /// User ID (optional, defaults to the configured user)
        user: Option<String>,
        /// Ignore saved cursors and re-fetch incremental sources from scratch (optional)
        full_refresh: Option<bool>,
        /// Fetch even if the last refresh was moments ago (optional)
        force: Option<bool>,
    ) -> McpResult<String> {
        self.handle_refresh(user, full_refresh, force).await
    }

    /// **Review**: List active items grouped by section in ranked order.
    /// **Use**: No section=all; "today"/"blocked"/"backlog" or a custom section name to filter.
    #[tool]
    async fn list(
        &self,
        /// User ID (optional, defaults to the configured user)
        user: Option<String>,
        /// Section filter: today/blocked/backlog or a custom name. Empty=all.
        section: Option<String>,
        /// Leave item bodies out of the output (optional)
        exclude_body: Option<bool>,
    ) -> McpResult<String> {
        self.handle_list(user, section, exclude_body).await
    }

    /// **Reorder**: Pin an item at a position. Pinned items keep their place across refreshes.
    /// **Move**: pass section to move the item into another section at the same time.
    #[tool]
    async fn reorder(
        &self,
        /// User ID (optional, defaults to the configured user)
        user: Option<String>,
        /// Item ID (e.g., "item-3")
        id: String,
        /// Target position, 1 = top of the section
        index: u32,
        /// Target section (optional, defaults to the item's current section)
        section: Option<String>,
    ) -> McpResult<String> {
        self.handle_reorder(user, id, index, section).await
    }

    /// **Complete**: Mark items done. Completed items leave the list and their gaps close.
    /// **Batch**: Supports multiple IDs.
    #[tool]
    async fn complete(
        &self,
        /// User ID (optional, defaults to the configured user)
        user: Option<String>,
        /// Item IDs to complete
        ids: Vec<String>,
    ) -> McpResult<String> {
        self.handle_complete(user, ids).await
    }

    /// **Accounts**: Show linked accounts, credential health and refresh progress per source.
    #[tool]
    async fn accounts(
        &self,
        /// User ID (optional, defaults to the configured user)
        user: Option<String>,
    ) -> McpResult<String> {
        self.handle_accounts(user).await
    }
}
