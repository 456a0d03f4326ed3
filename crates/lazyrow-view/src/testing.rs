//! Shared fixtures for unit tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::BackendError;
use crate::port::{Query, QueryPort};
use crate::record::{Record, RecordAccessor};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: u32,
    pub name: String,
}

impl Record for Row {
    type Id = u32;

    fn id(&self) -> u32 {
        self.id
    }
}

/// Identities handed out for placeholder rows.
pub const SENTINEL_BASE: u32 = 1_000_000;

pub struct RowAccessor;

impl RecordAccessor<Row> for RowAccessor {
    fn all(&self) -> Vec<String> {
        vec!["id".to_string(), "name".to_string()]
    }

    fn sortable(&self) -> Vec<String> {
        vec!["id".to_string(), "name".to_string()]
    }

    fn filterable(&self) -> Vec<String> {
        vec!["name".to_string()]
    }

    fn column_name(&self, property: &str) -> String {
        match property {
            "id" => "ID".to_string(),
            "name" => "Name".to_string(),
            other => other.to_string(),
        }
    }

    fn value(&self, record: &Row, property: &str) -> Option<Value> {
        match property {
            "id" => Some(json!(record.id)),
            "name" => Some(json!(record.name)),
            _ => None,
        }
    }

    fn sentinel(&self, index: usize) -> Row {
        Row {
            id: SENTINEL_BASE + index as u32,
            name: String::new(),
        }
    }
}

/// Rows `0..n` named `row-<id>`.
pub fn rows(n: u32) -> Vec<Row> {
    (0..n)
        .map(|id| Row {
            id,
            name: format!("row-{id}"),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum TestFilter {
    Id(u32),
    Even,
    NameContains(String),
    Unsupported,
}

impl TestFilter {
    fn matches(&self, row: &Row) -> bool {
        match self {
            TestFilter::Id(id) => row.id == *id,
            TestFilter::Even => row.id % 2 == 0,
            TestFilter::NameContains(s) => row.name.contains(s.as_str()),
            TestFilter::Unsupported => true,
        }
    }
}

/// Vec-backed port with call counters and fault injection.
pub struct TestPort {
    rows: Mutex<Vec<Row>>,
    count_calls: AtomicUsize,
    one_calls: AtomicUsize,
    range_calls: AtomicUsize,
    fail_next: AtomicUsize,
    fail_ranges: AtomicBool,
    fail_offsets: Mutex<HashSet<usize>>,
    delay: Mutex<Option<Duration>>,
}

impl TestPort {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: Mutex::new(rows),
            count_calls: AtomicUsize::new(0),
            one_calls: AtomicUsize::new(0),
            range_calls: AtomicUsize::new(0),
            fail_next: AtomicUsize::new(0),
            fail_ranges: AtomicBool::new(false),
            fail_offsets: Mutex::new(HashSet::new()),
            delay: Mutex::new(None),
        }
    }

    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }

    pub fn one_calls(&self) -> usize {
        self.one_calls.load(Ordering::SeqCst)
    }

    pub fn range_calls(&self) -> usize {
        self.range_calls.load(Ordering::SeqCst)
    }

    /// Fail the next `n` backend calls of any kind.
    pub fn fail_next_calls(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Make every `fetch_range` fail.
    pub fn fail_ranges(&self, fail: bool) {
        self.fail_ranges.store(fail, Ordering::SeqCst);
    }

    /// Make `fetch_one` fail at the given offset.
    pub fn fail_offset(&self, offset: usize) {
        self.fail_offsets.lock().unwrap().insert(offset);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Replace the backing rows out-of-band.
    pub fn set_rows(&self, rows: Vec<Row>) {
        *self.rows.lock().unwrap() = rows;
    }

    fn select(&self, query: &Query<TestFilter>) -> Vec<Row> {
        let mut selected: Vec<Row> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| query.predicates.iter().all(|p| p.matches(row)))
            .cloned()
            .collect();
        if let Some(sort) = &query.sort {
            match sort.property.as_str() {
                "name" => selected.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id))),
                _ => selected.sort_by_key(|row| row.id),
            }
            if !sort.ascending {
                selected.reverse();
            }
        }
        selected
    }

    async fn enter(&self) -> Result<(), BackendError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let pending = self.fail_next.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_next.store(pending - 1, Ordering::SeqCst);
            return Err(BackendError::Query("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl QueryPort for TestPort {
    type Item = Row;
    type Predicate = TestFilter;

    fn identity_predicate(&self, id: &u32) -> TestFilter {
        TestFilter::Id(*id)
    }

    fn check_predicate(&self, predicate: &TestFilter) -> Result<(), BackendError> {
        match predicate {
            TestFilter::Unsupported => Err(BackendError::Unsupported(
                "test filter not supported".to_string(),
            )),
            _ => Ok(()),
        }
    }

    async fn count(&self, query: &Query<TestFilter>) -> Result<usize, BackendError> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        Ok(self.select(query).len())
    }

    async fn fetch_one(
        &self,
        query: &Query<TestFilter>,
        offset: usize,
    ) -> Result<Option<Row>, BackendError> {
        self.one_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        if self.fail_offsets.lock().unwrap().contains(&offset) {
            return Err(BackendError::Query(format!("row {offset} unreadable")));
        }
        Ok(self.select(query).into_iter().nth(offset))
    }

    async fn fetch_range(
        &self,
        query: &Query<TestFilter>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Row>, BackendError> {
        self.range_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        if self.fail_ranges.load(Ordering::SeqCst) {
            return Err(BackendError::Query("range unreadable".to_string()));
        }
        Ok(self.select(query).into_iter().skip(offset).take(limit).collect())
    }
}
