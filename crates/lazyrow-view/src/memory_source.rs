//! Row source over a small list held entirely in memory.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::error::ViewError;
use crate::record::{Record, RecordAccessor};
use crate::source::{RowLookup, RowSource};

type Id<T> = <T as Record>::Id;

/// Source for lists small enough to load at once.
///
/// Identities are kept sorted, so index order is stable across loads. Rows
/// can be hidden without being removed; every index operation addresses the
/// visible rows only.
pub struct InMemorySource<T: Record> {
    data: HashMap<Id<T>, T>,
    /// Every row that can be shown, sorted.
    ids: Vec<Id<T>>,
    /// Rows currently shown, sorted; always a subset of `ids`.
    visible: Vec<Id<T>>,
    accessor: Arc<dyn RecordAccessor<T>>,
}

impl<T: Record> InMemorySource<T> {
    pub fn new(accessor: Arc<dyn RecordAccessor<T>>) -> Self {
        Self {
            data: HashMap::new(),
            ids: Vec::new(),
            visible: Vec::new(),
            accessor,
        }
    }

    pub fn with_rows(accessor: Arc<dyn RecordAccessor<T>>, rows: impl IntoIterator<Item = T>) -> Self {
        let mut source = Self::new(accessor);
        source.load(rows);
        source
    }

    /// Replace all rows. Every loaded row is visible.
    pub fn load(&mut self, rows: impl IntoIterator<Item = T>) {
        self.data.clear();
        for row in rows {
            self.data.insert(row.id(), row);
        }
        self.ids = self.data.keys().cloned().collect();
        self.ids.sort();
        self.visible = self.ids.clone();
        debug!(rows = self.ids.len(), "loaded in-memory rows");
    }

    /// Add a visible row. Returns false, leaving the source unchanged, when
    /// the identity is already present.
    pub fn add(&mut self, row: T) -> bool {
        let id = row.id();
        if self.data.contains_key(&id) {
            trace!(?id, "row already present");
            return false;
        }
        insert_sorted(&mut self.ids, id.clone());
        insert_sorted(&mut self.visible, id.clone());
        self.data.insert(id, row);
        true
    }

    /// Drop a row entirely.
    pub fn remove(&mut self, id: &Id<T>) -> Option<T> {
        remove_sorted(&mut self.ids, id);
        remove_sorted(&mut self.visible, id);
        self.data.remove(id)
    }

    /// Hide a row. A hard hide also excludes it from `show_all` and from
    /// `retain(true, ..)`; only `show` brings it back.
    pub fn hide(&mut self, id: &Id<T>, hard: bool) {
        remove_sorted(&mut self.visible, id);
        if hard {
            remove_sorted(&mut self.ids, id);
        }
    }

    /// Make a hidden row visible again. Returns false for unknown identities.
    pub fn show(&mut self, id: &Id<T>) -> bool {
        if !self.data.contains_key(id) {
            return false;
        }
        insert_sorted(&mut self.ids, id.clone());
        insert_sorted(&mut self.visible, id.clone());
        true
    }

    pub fn show_all(&mut self) {
        self.visible = self.ids.clone();
    }

    /// Keep visible only rows matching `predicate`, taken from all showable
    /// rows when `use_all` is set and from the visible rows otherwise.
    pub fn retain(&mut self, use_all: bool, predicate: impl Fn(&T) -> bool) {
        let candidates = if use_all { &self.ids } else { &self.visible };
        let data = &self.data;
        let kept: Vec<Id<T>> = candidates
            .iter()
            .filter(|id| data.get(*id).is_some_and(&predicate))
            .cloned()
            .collect();
        trace!(
            candidates = candidates.len(),
            kept = kept.len(),
            "filtered in-memory rows"
        );
        self.visible = kept;
    }

    /// Rows currently visible.
    pub fn len(&self) -> usize {
        self.visible.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }
}

fn insert_sorted<I: Ord>(ids: &mut Vec<I>, id: I) {
    if let Err(at) = ids.binary_search(&id) {
        ids.insert(at, id);
    }
}

fn remove_sorted<I: Ord>(ids: &mut Vec<I>, id: &I) {
    if let Ok(at) = ids.binary_search(id) {
        ids.remove(at);
    }
}

#[async_trait]
impl<T: Record> RowSource for InMemorySource<T> {
    type Item = T;

    async fn size(&mut self) -> Result<usize, ViewError> {
        Ok(self.visible.len())
    }

    async fn item_ids(&mut self, start: usize, count: usize) -> Result<Vec<Id<T>>, ViewError> {
        Ok(self
            .visible
            .iter()
            .skip(start)
            .take(count)
            .cloned()
            .collect())
    }

    async fn object_by_index(&mut self, index: usize) -> Result<RowLookup<T>, ViewError> {
        Ok(self
            .visible
            .get(index)
            .and_then(|id| self.data.get(id))
            .cloned()
            .map_or(RowLookup::Missing, RowLookup::Found))
    }

    async fn object(&mut self, id: &Id<T>) -> Result<T, ViewError> {
        if self.visible.binary_search(id).is_err() {
            return Err(ViewError::NotFound(format!("{id:?}")));
        }
        self.data
            .get(id)
            .cloned()
            .ok_or_else(|| ViewError::NotFound(format!("{id:?}")))
    }

    async fn contains_id(&mut self, id: &Id<T>) -> Result<bool, ViewError> {
        Ok(self.visible.binary_search(id).is_ok())
    }

    fn index_of_id(&self, id: &Id<T>) -> Result<usize, ViewError> {
        self.visible
            .binary_search(id)
            .map_err(|_| ViewError::NotFound(format!("no index known for {id:?}")))
    }

    fn accessor(&self) -> &Arc<dyn RecordAccessor<T>> {
        &self.accessor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Row, RowAccessor, rows};
    use pretty_assertions::assert_eq;

    fn source(n: u32) -> InMemorySource<Row> {
        // Loaded in reverse to check ordering does not depend on input order
        let mut rows = rows(n);
        rows.reverse();
        InMemorySource::with_rows(Arc::new(RowAccessor), rows)
    }

    fn row(id: u32) -> Row {
        Row {
            id,
            name: format!("row-{id}"),
        }
    }

    #[tokio::test]
    async fn test_load_sorts_ids() {
        let mut source = source(5);
        assert_eq!(source.size().await.unwrap(), 5);
        assert_eq!(source.item_ids(0, 10).await.unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(source.item_ids(3, 10).await.unwrap(), vec![3, 4]);
        assert!(source.item_ids(8, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_ignores_duplicates() {
        let mut source = source(3);
        assert!(!source.add(Row {
            id: 1,
            name: "other".to_string()
        }));
        assert_eq!(source.object(&1).await.unwrap().name, "row-1");

        assert!(source.add(row(10)));
        assert_eq!(source.index_of_id(&10).unwrap(), 3);
    }

    #[tokio::test]
    async fn test_hide_and_show() {
        let mut source = source(5);
        source.hide(&1, false);
        source.hide(&3, true);
        assert_eq!(source.item_ids(0, 5).await.unwrap(), vec![0, 2, 4]);
        assert!(!source.contains_id(&1).await.unwrap());
        assert!(matches!(source.object(&1).await, Err(ViewError::NotFound(_))));

        source.show_all();
        // Hard-hidden rows stay hidden
        assert_eq!(source.item_ids(0, 5).await.unwrap(), vec![0, 1, 2, 4]);

        assert!(source.show(&3));
        assert_eq!(source.item_ids(0, 5).await.unwrap(), vec![0, 1, 2, 3, 4]);
        assert!(!source.show(&42));
    }

    #[tokio::test]
    async fn test_retain_from_visible_or_all() {
        let mut source = source(10);
        source.retain(true, |row| row.id % 2 == 0);
        assert_eq!(source.item_ids(0, 10).await.unwrap(), vec![0, 2, 4, 6, 8]);

        source.retain(false, |row| row.id > 3);
        assert_eq!(source.item_ids(0, 10).await.unwrap(), vec![4, 6, 8]);

        source.retain(true, |row| row.id > 6);
        assert_eq!(source.item_ids(0, 10).await.unwrap(), vec![7, 8, 9]);
    }

    #[tokio::test]
    async fn test_index_operations_address_visible_rows() {
        let mut source = source(6);
        source.hide(&0, false);
        source.hide(&2, false);

        assert_eq!(source.index_of_id(&3).unwrap(), 1);
        assert!(source.index_of_id(&2).is_err());
        assert_eq!(source.object_by_index(1).await.unwrap(), RowLookup::Found(row(3)));
        assert_eq!(source.object_by_index(4).await.unwrap(), RowLookup::Missing);
    }

    #[tokio::test]
    async fn test_remove() {
        let mut source = source(3);
        assert_eq!(source.remove(&1), Some(row(1)));
        assert_eq!(source.remove(&1), None);
        assert_eq!(source.len(), 2);
        assert!(!source.show(&1));
    }
}
