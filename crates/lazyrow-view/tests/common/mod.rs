//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};

use lazyrow_memory::{Filter, MemoryBackend};
use lazyrow_view::{
    BackendError, CachedView, Query, QueryPort, Record, RecordAccessor, ViewConfig,
};

/// Identities of placeholder rows start here.
pub const SENTINEL_BASE: u64 = 1_000_000;

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: u64,
    pub name: String,
    pub score: i64,
}

impl Record for Item {
    type Id = u64;

    fn id(&self) -> u64 {
        self.id
    }
}

pub struct ItemAccessor;

impl RecordAccessor<Item> for ItemAccessor {
    fn all(&self) -> Vec<String> {
        vec!["id".into(), "name".into(), "score".into()]
    }

    fn sortable(&self) -> Vec<String> {
        vec!["name".into(), "score".into()]
    }

    fn filterable(&self) -> Vec<String> {
        vec!["name".into(), "score".into()]
    }

    fn visible(&self) -> Vec<String> {
        vec!["name".into(), "score".into()]
    }

    fn column_name(&self, property: &str) -> String {
        match property {
            "id" => "ID".into(),
            "name" => "Name".into(),
            "score" => "Score".into(),
            other => other.into(),
        }
    }

    fn value(&self, record: &Item, property: &str) -> Option<Value> {
        match property {
            "id" => Some(json!(record.id)),
            "name" => Some(json!(record.name)),
            "score" => Some(json!(record.score)),
            _ => None,
        }
    }

    fn sentinel(&self, index: usize) -> Item {
        Item {
            id: SENTINEL_BASE + index as u64,
            name: "unavailable".into(),
            score: 0,
        }
    }
}

pub fn item(id: u64) -> Item {
    Item {
        id,
        name: format!("item-{id:03}"),
        score: (id * 7 % 10) as i64,
    }
}

/// Items with identities `0..n`.
pub fn items(n: u64) -> Vec<Item> {
    (0..n).map(item).collect()
}

/// Memory backend with call counters and injectable failures.
pub struct FlakyPort {
    pub backend: MemoryBackend<Item>,
    counts: AtomicUsize,
    ones: AtomicUsize,
    identity_loads: AtomicUsize,
    ranges: AtomicUsize,
    fail_next: AtomicUsize,
    fail_counts: AtomicBool,
    fail_ranges: AtomicBool,
    failing_offsets: Mutex<HashSet<usize>>,
}

impl FlakyPort {
    pub fn new(rows: Vec<Item>) -> Self {
        Self {
            backend: MemoryBackend::new(Arc::new(ItemAccessor), rows),
            counts: AtomicUsize::new(0),
            ones: AtomicUsize::new(0),
            identity_loads: AtomicUsize::new(0),
            ranges: AtomicUsize::new(0),
            fail_next: AtomicUsize::new(0),
            fail_counts: AtomicBool::new(false),
            fail_ranges: AtomicBool::new(false),
            failing_offsets: Mutex::new(HashSet::new()),
        }
    }

    pub fn counts(&self) -> usize {
        self.counts.load(Ordering::SeqCst)
    }

    pub fn ones(&self) -> usize {
        self.ones.load(Ordering::SeqCst)
    }

    /// `fetch_one` calls selecting a row by identity.
    pub fn identity_loads(&self) -> usize {
        self.identity_loads.load(Ordering::SeqCst)
    }

    pub fn ranges(&self) -> usize {
        self.ranges.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn fail_counts(&self, fail: bool) {
        self.fail_counts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_ranges(&self, fail: bool) {
        self.fail_ranges.store(fail, Ordering::SeqCst);
    }

    /// Make positional `fetch_one` fail at `offset`.
    pub fn fail_offset(&self, offset: usize) {
        self.failing_offsets.lock().unwrap().insert(offset);
    }

    fn injected(&self) -> Result<(), BackendError> {
        let pending = self.fail_next.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_next.store(pending - 1, Ordering::SeqCst);
            return Err(BackendError::Query("connection reset".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl QueryPort for FlakyPort {
    type Item = Item;
    type Predicate = Filter<u64>;

    fn identity_predicate(&self, id: &u64) -> Filter<u64> {
        self.backend.identity_predicate(id)
    }

    fn check_predicate(&self, predicate: &Filter<u64>) -> Result<(), BackendError> {
        self.backend.check_predicate(predicate)
    }

    async fn count(&self, query: &Query<Filter<u64>>) -> Result<usize, BackendError> {
        self.counts.fetch_add(1, Ordering::SeqCst);
        self.injected()?;
        if self.fail_counts.load(Ordering::SeqCst) {
            return Err(BackendError::Query("count failed".into()));
        }
        self.backend.count(query).await
    }

    async fn fetch_one(
        &self,
        query: &Query<Filter<u64>>,
        offset: usize,
    ) -> Result<Option<Item>, BackendError> {
        self.ones.fetch_add(1, Ordering::SeqCst);
        self.injected()?;
        let by_identity = matches!(query.predicates.last(), Some(Filter::Identity(_)));
        if by_identity {
            self.identity_loads.fetch_add(1, Ordering::SeqCst);
        } else if self.failing_offsets.lock().unwrap().contains(&offset) {
            return Err(BackendError::Query(format!("row {offset} unreadable")));
        }
        self.backend.fetch_one(query, offset).await
    }

    async fn fetch_range(
        &self,
        query: &Query<Filter<u64>>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Item>, BackendError> {
        self.ranges.fetch_add(1, Ordering::SeqCst);
        self.injected()?;
        if self.fail_ranges.load(Ordering::SeqCst) {
            return Err(BackendError::Query("range query failed".into()));
        }
        self.backend.fetch_range(query, offset, limit).await
    }
}

pub fn config(page_size: usize, cache_max_size: usize) -> ViewConfig {
    ViewConfig {
        page_size,
        cache_max_size,
        ..Default::default()
    }
}

/// Cached view over `n` items with the given sizes.
pub fn view(n: u64, page_size: usize, cache_max_size: usize) -> CachedView<Arc<FlakyPort>> {
    CachedView::with_config(
        Arc::new(FlakyPort::new(items(n))),
        Arc::new(ItemAccessor),
        &config(page_size, cache_max_size),
    )
    .unwrap()
}
