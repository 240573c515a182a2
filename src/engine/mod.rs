//! The refresh cycle
//!
//! One cycle for one user runs in three phases:
//! 1. prepare: read linked accounts and cursors under a short store lock
//! 2. fan out: fetch every (account, source) pair concurrently, no lock held
//! 3. apply: token health, reconciliation, ordering compaction and cursor
//!    updates, sequentially under the store lock
//!
//! Cycles of the same user are serialized by a per-user async lock.

pub mod comparator;
pub mod cursor;
pub mod fetcher;
pub mod ordering;
pub mod reconciler;

pub use comparator::{CrossTypeComparator, EmailOrder};
pub use cursor::{CursorUpdate, RefreshCursorTracker};
pub use fetcher::{
    FanOutFetcher, FetchOutcome, FetchRequest, SourceAdapter, SourceBinding, SourceResult,
    SyncMode, record_token_health,
};
pub use ordering::{IndexAssignment, OrderingEngine, OrderingState};
pub use reconciler::{ReconcilePlan, ReconcileStats, Reconciler};

use crate::error::{Result, SyncError};
use crate::model::{ItemStore, Lifecycle, ResumePoint, SectionId, SourceKey};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Tunables of the refresh cycle
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub email_order: EmailOrder,
    /// Window in which a due date outranks priority
    pub lookahead: Duration,
    /// Bound on a single source fetch, `None` to wait indefinitely
    pub fetch_timeout: Option<std::time::Duration>,
    /// Refreshes closer together than this only re-compact ordering
    pub min_refresh_interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            email_order: EmailOrder::default(),
            lookahead: Duration::days(7),
            fetch_timeout: Some(std::time::Duration::from_secs(30)),
            min_refresh_interval: Duration::seconds(10),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshOptions {
    /// Ignore stored cursors and fetch incremental sources from scratch
    pub full_refresh: bool,
    /// Fetch even inside the minimum refresh interval
    pub force: bool,
}

/// What a cycle reports back to its caller
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleResult {
    /// Sources whose fetch failed this cycle
    pub degraded_sources: Vec<SourceKey>,
    /// A source has more pages; run another cycle
    pub refresh_required: bool,
    /// Accounts flagged with a bad token
    pub reauth_accounts: Vec<String>,
    pub stats: ReconcileStats,
    /// Ordering indices rewritten by compaction
    pub reordered: usize,
    /// Fetching was skipped because the previous cycle was too recent
    pub skipped: bool,
}

/// Source adapters registered per linked account token
#[derive(Clone, Default)]
pub struct SourceRegistry {
    adapters: HashMap<String, Vec<Arc<dyn SourceAdapter>>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, token_id: impl Into<String>, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.entry(token_id.into()).or_default().push(adapter);
    }

    pub fn adapters_for(&self, token_id: &str) -> &[Arc<dyn SourceAdapter>] {
        self.adapters
            .get(token_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.adapters.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct SyncEngine {
    registry: SourceRegistry,
    settings: EngineSettings,
    clock: Clock,
    user_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

fn lock_store<S>(store: &Mutex<S>) -> Result<MutexGuard<'_, S>> {
    store
        .lock()
        .map_err(|e| SyncError::persistence(format!("store lock poisoned: {}", e)))
}

impl SyncEngine {
    pub fn new(registry: SourceRegistry, settings: EngineSettings) -> Self {
        Self::with_clock(registry, settings, Arc::new(Utc::now))
    }

    pub fn with_clock(registry: SourceRegistry, settings: EngineSettings, clock: Clock) -> Self {
        Self {
            registry,
            settings,
            clock,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Lock serializing the cycles of `user_id`
    ///
    /// Entries nobody holds or waits on are pruned, so the table only grows
    /// with the number of users active at the same time.
    fn user_lock(&self, user_id: &str) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .user_locks
            .lock()
            .map_err(|e| SyncError::persistence(format!("user lock table poisoned: {}", e)))?;
        locks.retain(|id, lock| id == user_id || Arc::strong_count(lock) > 1);
        Ok(Arc::clone(locks.entry(user_id.to_string()).or_default()))
    }

    fn ordering(&self, now: DateTime<Utc>) -> OrderingEngine {
        OrderingEngine::new(CrossTypeComparator::new(
            now,
            self.settings.lookahead,
            self.settings.email_order,
        ))
    }

    fn reauth_accounts<S: ItemStore + ?Sized>(store: &S, user_id: &str) -> Result<Vec<String>> {
        let mut accounts: Vec<String> = store
            .tokens(user_id)?
            .into_iter()
            .filter(|t| t.is_bad_token)
            .map(|t| t.account_id)
            .collect();
        accounts.sort();
        accounts.dedup();
        Ok(accounts)
    }

    /// Run one refresh cycle for `user_id`
    ///
    /// Per-source failures are reported in the result; any persistence
    /// error aborts the cycle.
    #[tracing::instrument(level = "debug", skip(self, store))]
    pub async fn refresh<S: ItemStore + Send>(
        &self,
        store: &Mutex<S>,
        user_id: &str,
        options: RefreshOptions,
    ) -> Result<CycleResult> {
        let user_lock = self.user_lock(user_id)?;
        let _cycle = user_lock.lock().await;
        let now = self.now();
        let ordering = self.ordering(now);

        let bindings = {
            let mut store = lock_store(store)?;
            let mut bindings = Vec::new();
            let mut in_progress = false;
            for token in store.tokens(user_id)? {
                for adapter in self.registry.adapters_for(&token.token_id) {
                    let cursor = store.refresh_cursor(&token.token_id, adapter.source_id())?;
                    in_progress |= cursor.is_in_progress();
                    let resume = RefreshCursorTracker::resume_point(&cursor, options.full_refresh);
                    let earlier_pages = match resume {
                        ResumePoint::Page(_) => cursor.pass_seen().to_vec(),
                        _ => Vec::new(),
                    };
                    bindings.push(SourceBinding {
                        token: token.clone(),
                        adapter: Arc::clone(adapter),
                        resume,
                        earlier_pages,
                    });
                }
            }

            let recent = store
                .last_refreshed(user_id)?
                .is_some_and(|last| now - last < self.settings.min_refresh_interval);
            if recent && !options.force && !options.full_refresh && !in_progress {
                let changes = ordering.compact_user(&mut *store, user_id)?;
                debug!(user = user_id, "refreshed recently, fetch skipped");
                return Ok(CycleResult {
                    reauth_accounts: Self::reauth_accounts(&*store, user_id)?,
                    reordered: changes.len(),
                    skipped: true,
                    ..Default::default()
                });
            }
            bindings
        };

        let fetcher = FanOutFetcher::new(self.settings.fetch_timeout);
        let results = fetcher.fetch_all(user_id, bindings).await;

        let mut store = lock_store(store)?;
        record_token_health(&results, &mut *store, now)?;

        let active = store.active_items(user_id)?;
        let stats = Reconciler::plan(user_id, &active, &results, now).apply(&mut *store)?;
        let changes = ordering.compact_user(&mut *store, user_id)?;

        // Cursors move only after the items they cover are stored
        let mut refresh_required = false;
        for result in results.iter().filter(|r| r.tracks_cursor()) {
            let cursor = store.refresh_cursor(&result.token_id, &result.key.source_id)?;
            let update = RefreshCursorTracker::advance(
                &cursor,
                &result.resume,
                &result.outcome,
                result.mode,
                now,
            );
            refresh_required |= update.refresh_required;
            if let Some(cursor) = update.cursor {
                store.set_refresh_cursor(cursor)?;
            }
        }
        store.set_last_refreshed(user_id, now)?;

        let result = CycleResult {
            degraded_sources: results
                .iter()
                .filter(|r| !r.succeeded())
                .map(|r| r.key.clone())
                .collect(),
            refresh_required,
            reauth_accounts: Self::reauth_accounts(&*store, user_id)?,
            stats,
            reordered: changes.len(),
            skipped: false,
        };
        info!(
            user = user_id,
            sources = results.len(),
            degraded = result.degraded_sources.len(),
            created = stats.created,
            updated = stats.updated,
            completed = stats.completed + stats.deleted,
            reordered = result.reordered,
            refresh_required,
            "refresh cycle finished"
        );
        Ok(result)
    }

    /// Pin an item at `index` of a section, serialized with refresh cycles
    #[tracing::instrument(level = "debug", skip(self, store))]
    pub async fn reorder<S: ItemStore + Send>(
        &self,
        store: &Mutex<S>,
        user_id: &str,
        item_id: &str,
        section: Option<SectionId>,
        index: u32,
    ) -> Result<Vec<IndexAssignment>> {
        let user_lock = self.user_lock(user_id)?;
        let _cycle = user_lock.lock().await;
        let ordering = self.ordering(self.now());
        let mut store = lock_store(store)?;
        ordering.reorder(&mut *store, user_id, item_id, section, index)
    }

    /// Complete an active item on the user's behalf and close its gap
    #[tracing::instrument(level = "debug", skip(self, store))]
    pub async fn complete<S: ItemStore + Send>(
        &self,
        store: &Mutex<S>,
        user_id: &str,
        item_id: &str,
    ) -> Result<()> {
        let user_lock = self.user_lock(user_id)?;
        let _cycle = user_lock.lock().await;
        let ordering = self.ordering(self.now());
        let mut store = lock_store(store)?;

        let item = store
            .find_item(item_id)?
            .filter(|i| i.user_id == user_id)
            .ok_or_else(|| SyncError::NotFound(format!("item {}", item_id)))?;
        store.mark_completed(item_id, Lifecycle::Completed)?;
        ordering.compact_section(&mut *store, user_id, &item.section)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        struct Noop;

        #[async_trait::async_trait]
        impl SourceAdapter for Noop {
            fn source_id(&self) -> &str {
                "noop"
            }

            async fn fetch(&self, _request: FetchRequest) -> FetchOutcome {
                FetchOutcome::ok(vec![])
            }
        }

        let mut registry = SourceRegistry::new();
        assert!(registry.is_empty());
        registry.register("jira:me@corp.com", Arc::new(Noop));
        registry.register("jira:me@corp.com", Arc::new(Noop));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.adapters_for("jira:me@corp.com").len(), 2);
        assert!(registry.adapters_for("google:me@corp.com").is_empty());
    }

    #[test]
    fn test_idle_user_locks_are_pruned() {
        let engine = SyncEngine::new(SourceRegistry::new(), EngineSettings::default());
        let held = engine.user_lock("u1").unwrap();
        drop(engine.user_lock("u2").unwrap());
        assert_eq!(engine.user_locks.lock().unwrap().len(), 2);

        // u2 is idle and goes away; u1 is still held
        let _u3 = engine.user_lock("u3").unwrap();
        let table = engine.user_locks.lock().unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.contains_key("u1"));
        assert!(table.contains_key("u3"));
        drop(table);
        drop(held);
    }

    #[test]
    fn test_default_settings() {
        let settings = EngineSettings::default();
        assert_eq!(settings.lookahead, Duration::days(7));
        assert_eq!(settings.min_refresh_interval, Duration::seconds(10));
        assert_eq!(
            settings.fetch_timeout,
            Some(std::time::Duration::from_secs(30))
        );
    }
}
