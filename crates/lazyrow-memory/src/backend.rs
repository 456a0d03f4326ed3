//! `QueryPort` over records held in memory.

use std::sync::Arc;

use async_trait::async_trait;
use lazyrow_view::{BackendError, IdOf, Query, QueryPort, Record, RecordAccessor, SortSpec};
use tokio::sync::RwLock;
use tracing::trace;

use crate::filter::{Filter, Matcher, sort_order};

/// Reference backend evaluating [`Filter`]s over a `Vec` of records.
///
/// Every query scans all rows, so this suits tests, fixtures and small data
/// files rather than large collections. Properties are read through the
/// record accessor; filtering on a property outside `filterable()` (or any
/// property when `filterable()` is empty, outside `all()`) and ordering on
/// one outside `sortable()` are rejected as unsupported.
pub struct MemoryBackend<T: Record> {
    rows: RwLock<Vec<T>>,
    accessor: Arc<dyn RecordAccessor<T>>,
}

impl<T: Record> MemoryBackend<T> {
    pub fn new(accessor: Arc<dyn RecordAccessor<T>>, rows: Vec<T>) -> Self {
        Self {
            rows: RwLock::new(rows),
            accessor,
        }
    }

    pub fn accessor(&self) -> &Arc<dyn RecordAccessor<T>> {
        &self.accessor
    }

    /// Replace every row.
    pub async fn replace(&self, rows: Vec<T>) {
        *self.rows.write().await = rows;
    }

    /// Insert a row, replacing any row with the same identity.
    pub async fn upsert(&self, row: T) {
        let mut rows = self.rows.write().await;
        let id = row.id();
        match rows.iter_mut().find(|r| r.id() == id) {
            Some(existing) => *existing = row,
            None => rows.push(row),
        }
    }

    /// Remove the row with this identity. Returns whether a row was removed.
    pub async fn remove(&self, id: &T::Id) -> bool {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|r| r.id() != *id);
        rows.len() != before
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    fn filterable(&self) -> Vec<String> {
        let filterable = self.accessor.filterable();
        if filterable.is_empty() {
            self.accessor.all()
        } else {
            filterable
        }
    }

    fn check_sort(&self, sort: &SortSpec) -> Result<(), BackendError> {
        if self.accessor.sortable().contains(&sort.property) {
            Ok(())
        } else {
            Err(BackendError::Unsupported(format!(
                "cannot order by '{}'",
                sort.property
            )))
        }
    }

    /// Rows matching `query`, in query order.
    async fn select(&self, query: &Query<Filter<T::Id>>) -> Result<Vec<T>, BackendError> {
        let matchers = query
            .predicates
            .iter()
            .map(Matcher::compile)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| BackendError::Query(format!("invalid pattern: {e}")))?;

        let rows = self.rows.read().await;
        let mut selected: Vec<T> = rows
            .iter()
            .filter(|row| {
                let id = row.id();
                let read = |property: &str| self.accessor.value(row, property);
                matchers.iter().all(|m| m.matches(&id, &read))
            })
            .cloned()
            .collect();
        drop(rows);

        match &query.sort {
            Some(sort) => {
                self.check_sort(sort)?;
                selected.sort_by(|a, b| {
                    let order = sort_order(
                        self.accessor.value(a, &sort.property).as_ref(),
                        self.accessor.value(b, &sort.property).as_ref(),
                    );
                    let order = if sort.ascending { order } else { order.reverse() };
                    order.then_with(|| a.id().cmp(&b.id()))
                });
            }
            None => selected.sort_by_key(|row| row.id()),
        }

        trace!(
            predicates = query.predicates.len(),
            selected = selected.len(),
            "memory backend query"
        );
        Ok(selected)
    }
}

#[async_trait]
impl<T: Record> QueryPort for MemoryBackend<T> {
    type Item = T;
    type Predicate = Filter<T::Id>;

    fn identity_predicate(&self, id: &IdOf<Self>) -> Filter<T::Id> {
        Filter::Identity(id.clone())
    }

    fn check_predicate(&self, predicate: &Filter<T::Id>) -> Result<(), BackendError> {
        let filterable = self.filterable();
        for property in predicate.properties() {
            if !filterable.iter().any(|p| p == property) {
                return Err(BackendError::Unsupported(format!(
                    "cannot filter on '{property}'"
                )));
            }
        }
        Matcher::compile(predicate)
            .map(|_| ())
            .map_err(|e| BackendError::Unsupported(format!("invalid pattern: {e}")))
    }

    async fn count(&self, query: &Query<Filter<T::Id>>) -> Result<usize, BackendError> {
        Ok(self.select(query).await?.len())
    }

    async fn fetch_one(
        &self,
        query: &Query<Filter<T::Id>>,
        offset: usize,
    ) -> Result<Option<T>, BackendError> {
        Ok(self.select(query).await?.into_iter().nth(offset))
    }

    async fn fetch_range(
        &self,
        query: &Query<Filter<T::Id>>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<T>, BackendError> {
        Ok(self
            .select(query)
            .await?
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }
}
