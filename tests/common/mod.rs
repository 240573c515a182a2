//! Common test utilities for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tasksync_mcp::engine::{FetchOutcome, FetchRequest, SourceAdapter, SyncMode};
use tasksync_mcp::{
    AccountToken, EngineSettings, Item, ItemKind, Lifecycle, SourceRegistry, SyncData, SyncEngine,
};

pub const USER: &str = "u1";
pub const ACCOUNT: &str = "me@corp.com";

/// Fixed "now" shared by every engine test
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
}

/// Source adapter that replays a queue of outcomes
///
/// Once the queue runs dry the last outcome is repeated. Every request is
/// recorded so tests can check the resume point the engine asked for.
pub struct ScriptedSource {
    source_id: String,
    mode: SyncMode,
    absence: Lifecycle,
    delay: Option<std::time::Duration>,
    queue: Mutex<VecDeque<FetchOutcome>>,
    last: Mutex<FetchOutcome>,
    requests: Mutex<Vec<FetchRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(source_id: &str, outcomes: Vec<FetchOutcome>) -> Self {
        Self {
            source_id: source_id.to_string(),
            mode: SyncMode::Snapshot,
            absence: Lifecycle::Completed,
            delay: None,
            queue: Mutex::new(outcomes.into()),
            last: Mutex::new(FetchOutcome::ok(Vec::new())),
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn incremental(mut self) -> Self {
        self.mode = SyncMode::Incremental;
        self
    }

    pub fn with_absence(mut self, absence: Lifecycle) -> Self {
        self.absence = absence;
        self
    }

    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for ScriptedSource {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn sync_mode(&self) -> SyncMode {
        self.mode
    }

    fn absence_lifecycle(&self) -> Lifecycle {
        self.absence
    }

    async fn fetch(&self, request: FetchRequest) -> FetchOutcome {
        self.requests.lock().unwrap().push(request);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = {
            let next = self.queue.lock().unwrap().pop_front();
            let mut last = self.last.lock().unwrap();
            if let Some(next) = next {
                *last = next;
            }
            last.clone()
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

pub fn token(service: &str) -> AccountToken {
    AccountToken::new(USER, service, ACCOUNT)
}

/// Store with the given services linked for the test user
pub fn store_with(services: &[&str]) -> Mutex<SyncData> {
    let mut data = SyncData::new();
    for service in services {
        data.link_account(token(service));
    }
    Mutex::new(data)
}

/// Settings that never skip a cycle and bound fetches at one second
pub fn settings() -> EngineSettings {
    EngineSettings {
        fetch_timeout: Some(std::time::Duration::from_secs(1)),
        min_refresh_interval: Duration::zero(),
        ..EngineSettings::default()
    }
}

pub fn engine(registry: SourceRegistry, settings: EngineSettings) -> SyncEngine {
    SyncEngine::with_clock(registry, settings, Arc::new(now))
}

/// Registry binding each (service, adapter) pair to the test account
pub fn registry(sources: &[(&str, Arc<ScriptedSource>)]) -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    for (service, source) in sources {
        registry.register(token(service).token_id, Arc::clone(source) as Arc<dyn SourceAdapter>);
    }
    registry
}

/// Task without due date, ranked by sequence
pub fn task(source_id: &str, external_id: &str, sequence: u64) -> Item {
    Item::new(
        USER,
        ACCOUNT,
        source_id,
        external_id,
        format!("Task {}", external_id),
        ItemKind::Task {
            due: None,
            priority: 1,
            sequence,
        },
        now(),
    )
}

pub fn email(source_id: &str, external_id: &str, sender_domain: &str, sent_at: DateTime<Utc>) -> Item {
    Item::new(
        USER,
        ACCOUNT,
        source_id,
        external_id,
        format!("Thread {}", external_id),
        ItemKind::EmailThread {
            sender: format!("someone@{}", sender_domain),
            sender_domain: sender_domain.to_string(),
            sent_at,
            message_count: 1,
            unread: true,
        },
        now(),
    )
}

/// Stored copy of an item by its source and external id
pub fn stored(store: &Mutex<SyncData>, source_id: &str, external_id: &str) -> Item {
    store
        .lock()
        .unwrap()
        .all_items()
        .iter()
        .find(|i| i.source_id == source_id && i.external_id == external_id)
        .cloned()
        .unwrap_or_else(|| panic!("{}/{} not stored", source_id, external_id))
}

/// External ids of the user's active items in display order
pub fn display_order(store: &Mutex<SyncData>) -> Vec<String> {
    store
        .lock()
        .unwrap()
        .items_for_user(USER)
        .iter()
        .map(|i| i.external_id.clone())
        .collect()
}

/// (external id, index) pairs of the user's active items in display order
pub fn layout(store: &Mutex<SyncData>) -> Vec<(String, u32)> {
    store
        .lock()
        .unwrap()
        .items_for_user(USER)
        .iter()
        .map(|i| (i.external_id.clone(), i.ordering_index))
        .collect()
}
