//! Row sources behind a collection facade.
//!
//! [`RowSource`] is the index/identity contract a table widget consumes.
//! Filtering and sorting are separate capabilities so a facade only offers
//! them when its source actually supports them.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ViewError;
use crate::port::SortSpec;
use crate::record::{Record, RecordAccessor};

/// Identity type of the rows served by a source.
pub type SourceId<S> = <<S as RowSource>::Item as Record>::Id;

/// Outcome of an index lookup.
///
/// `Degraded` carries the accessor's placeholder row for an index that could
/// not be loaded, so a table can render the cell instead of failing the
/// whole page.
#[derive(Debug, Clone, PartialEq)]
pub enum RowLookup<T> {
    /// The row at the index.
    Found(T),
    /// No row at the index (past the end, or deleted out-of-band).
    Missing,
    /// The row could not be loaded; `sentinel` stands in for it.
    Degraded { sentinel: T, reason: String },
}

impl<T> RowLookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, RowLookup::Found(_))
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, RowLookup::Degraded { .. })
    }

    /// The loaded row, if any. Sentinels are discarded.
    pub fn found(self) -> Option<T> {
        match self {
            RowLookup::Found(item) => Some(item),
            _ => None,
        }
    }

    /// The loaded row or its placeholder.
    pub fn into_item(self) -> Option<T> {
        match self {
            RowLookup::Found(item) => Some(item),
            RowLookup::Degraded { sentinel, .. } => Some(sentinel),
            RowLookup::Missing => None,
        }
    }
}

/// Index- and identity-addressed access to a collection.
#[async_trait]
pub trait RowSource: Send {
    type Item: Record;

    /// Number of rows under the current filters.
    async fn size(&mut self) -> Result<usize, ViewError>;

    /// Identities of up to `count` rows starting at `start`.
    async fn item_ids(
        &mut self,
        start: usize,
        count: usize,
    ) -> Result<Vec<SourceId<Self>>, ViewError>;

    /// Row at `index`.
    async fn object_by_index(&mut self, index: usize)
    -> Result<RowLookup<Self::Item>, ViewError>;

    /// Row with the given identity, if it is visible under the current filters.
    async fn object(&mut self, id: &SourceId<Self>) -> Result<Self::Item, ViewError>;

    /// Whether a row with the given identity is visible.
    async fn contains_id(&mut self, id: &SourceId<Self>) -> Result<bool, ViewError>;

    /// Index of a row, if the source currently knows it.
    fn index_of_id(&self, id: &SourceId<Self>) -> Result<usize, ViewError>;

    /// Property reader for the rows.
    fn accessor(&self) -> &Arc<dyn RecordAccessor<Self::Item>>;

    /// Forget cached state after an out-of-band change.
    fn invalidate(&mut self) {}
}

/// Sources whose rows can be narrowed by consumer filters.
pub trait FilterableSource: RowSource {
    type Predicate: Clone + Debug + PartialEq + Send + Sync + 'static;

    /// Add a filter. Fails with `Misconfigured` when the backend cannot
    /// evaluate it.
    fn add_filter(&mut self, predicate: Self::Predicate) -> Result<(), ViewError>;

    /// Remove the first filter equal to `predicate`.
    fn remove_filter(&mut self, predicate: &Self::Predicate);

    /// Remove every consumer filter.
    fn remove_all_filters(&mut self);

    /// Consumer filters currently applied.
    fn filters(&self) -> Vec<Self::Predicate>;
}

/// Sources whose rows can be ordered.
pub trait SortableSource: RowSource {
    /// Order by the first of `properties`; an empty slice clears ordering.
    fn sort(&mut self, properties: &[String], ascending: &[bool]) -> Result<(), ViewError>;

    /// Active ordering.
    fn sort_spec(&self) -> Option<&SortSpec>;
}
