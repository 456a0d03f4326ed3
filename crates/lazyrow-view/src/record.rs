//! Records served by a view and the per-entity property reader.

use std::fmt::Debug;
use std::hash::Hash;

use serde_json::Value;

/// A backend-owned row with a stable identity.
///
/// Views never mutate records; a cached record is only ever replaced
/// wholesale by a fresher copy with the same identity.
pub trait Record: Clone + Send + Sync + 'static {
    /// Stable, unique, comparable key of the row.
    type Id: Clone + Eq + Hash + Ord + Debug + Send + Sync + 'static;

    /// Identity of this row.
    fn id(&self) -> Self::Id;
}

/// Describes an entity type to the collection facade.
///
/// Property ids returned by [`all`](RecordAccessor::all) name the columns a
/// table can show. The narrower lists restrict which of those may be sorted,
/// filtered or shown by default.
pub trait RecordAccessor<T: Record>: Send + Sync {
    /// Every property id, in display order.
    fn all(&self) -> Vec<String>;

    /// Properties the backend can order by.
    fn sortable(&self) -> Vec<String> {
        Vec::new()
    }

    /// Properties the backend can filter on.
    fn filterable(&self) -> Vec<String> {
        Vec::new()
    }

    /// Properties shown when the consumer has not chosen columns.
    fn visible(&self) -> Vec<String> {
        self.all()
    }

    /// Human-readable column header for a property.
    fn column_name(&self, property: &str) -> String {
        property.to_string()
    }

    /// Read one property of a record. `None` when the record has no such
    /// property.
    fn value(&self, record: &T, property: &str) -> Option<Value>;

    /// Placeholder row substituted when the row at `index` cannot be loaded.
    ///
    /// The placeholder's identity should not collide with a real row.
    fn sentinel(&self, index: usize) -> T;
}
