//! Domain models for synchronized items
//!
//! Split into submodules:
//! - `item`: items, sections and lifecycle
//! - `token`: linked accounts and their health
//! - `cursor`: resumable refresh cursors
//! - `store`: the persistence interface the engine depends on
//! - `sync_data`: the in-memory store persisted as TOML
//! - `queries`: read-only views over SyncData
//! - `serde_impl`: serialization/deserialization implementations

mod cursor;
mod item;
mod queries;
mod serde_impl;
mod store;
mod sync_data;
mod token;

pub use cursor::{RefreshCursor, RefreshState, ResumePoint};
pub use item::{
    Item, ItemKind, Lifecycle, NaturalKey, SECTION_BACKLOG, SECTION_BLOCKED, SECTION_TODAY,
    SectionId, email_domain,
};
pub use store::ItemStore;
pub use sync_data::{SyncData, UserState};
pub use token::{AccountToken, SourceKey};
