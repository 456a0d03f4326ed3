//! Read-only collection facade for table widgets.
//!
//! [`VirtualCollection`] serializes every operation on its source behind an
//! async mutex, exposes the accessor's property metadata, and hands out
//! bound properties that look their row up only when read.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard, broadcast};
use tracing::{debug, trace};

use crate::error::ViewError;
use crate::port::SortSpec;
use crate::record::RecordAccessor;
use crate::source::{FilterableSource, RowLookup, RowSource, SortableSource, SourceId};

const EVENT_CAPACITY: usize = 64;

/// Notification sent to subscribers of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionEvent {
    /// Rows may have been added, removed or reordered; re-read what is shown.
    ItemSetChanged,
}

/// Read-only, index-addressable collection over a [`RowSource`].
pub struct VirtualCollection<S: RowSource> {
    source: Mutex<S>,
    accessor: Arc<dyn RecordAccessor<S::Item>>,
    events: broadcast::Sender<CollectionEvent>,
}

impl<S: RowSource> VirtualCollection<S> {
    pub fn new(source: S) -> Self {
        let accessor = source.accessor().clone();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            source: Mutex::new(source),
            accessor,
            events,
        }
    }

    /// Receive item-set change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<CollectionEvent> {
        self.events.subscribe()
    }

    fn notify(&self) {
        // No receivers is fine
        let receivers = self.events.send(CollectionEvent::ItemSetChanged).unwrap_or(0);
        trace!(receivers, "item set change sent");
    }

    /// Exclusive access to the source. Call [`refresh`](Self::refresh) after
    /// changing its rows.
    pub async fn source(&self) -> MutexGuard<'_, S> {
        self.source.lock().await
    }

    /// Drop cached source state and tell subscribers to re-read.
    pub async fn refresh(&self) {
        debug!("refreshing collection");
        self.source.lock().await.invalidate();
        self.notify();
    }

    pub async fn size(&self) -> Result<usize, ViewError> {
        self.source.lock().await.size().await
    }

    pub async fn contains_id(&self, id: &SourceId<S>) -> Result<bool, ViewError> {
        self.source.lock().await.contains_id(id).await
    }

    pub async fn item_ids(&self, start: usize, count: usize) -> Result<Vec<SourceId<S>>, ViewError> {
        self.source.lock().await.item_ids(start, count).await
    }

    /// Every identity: a size query followed by one full page.
    pub async fn all_item_ids(&self) -> Result<Vec<SourceId<S>>, ViewError> {
        let mut source = self.source.lock().await;
        let size = source.size().await?;
        source.item_ids(0, size).await
    }

    pub async fn object_by_index(&self, index: usize) -> Result<RowLookup<S::Item>, ViewError> {
        self.source.lock().await.object_by_index(index).await
    }

    pub async fn object(&self, id: &SourceId<S>) -> Result<S::Item, ViewError> {
        self.source.lock().await.object(id).await
    }

    pub async fn index_of_id(&self, id: &SourceId<S>) -> Result<usize, ViewError> {
        self.source.lock().await.index_of_id(id)
    }

    /// Property ids in display order.
    pub fn property_ids(&self) -> Vec<String> {
        self.accessor.all()
    }

    pub fn visible_property_ids(&self) -> Vec<String> {
        self.accessor.visible()
    }

    pub fn column_name(&self, property: &str) -> String {
        self.accessor.column_name(property)
    }

    /// `(property, column name)` for every visible property.
    pub fn columns(&self) -> Vec<(String, String)> {
        self.accessor
            .visible()
            .into_iter()
            .map(|property| {
                let name = self.accessor.column_name(&property);
                (property, name)
            })
            .collect()
    }

    fn check_property(&self, property: &str) -> Result<(), ViewError> {
        if self.accessor.all().iter().any(|p| p == property) {
            Ok(())
        } else {
            Err(ViewError::Misconfigured(format!("unknown property '{property}'")))
        }
    }

    /// Value of `property` for the row with identity `id`.
    pub async fn property_value(&self, id: &SourceId<S>, property: &str) -> Result<Option<Value>, ViewError> {
        self.check_property(property)?;
        let row = self.object(id).await?;
        Ok(self.accessor.value(&row, property))
    }

    /// Value of `property` for the row at `index`. Placeholder rows yield the
    /// placeholder's value.
    pub async fn property_value_at(&self, index: usize, property: &str) -> Result<Option<Value>, ViewError> {
        self.check_property(property)?;
        let row = self
            .object_by_index(index)
            .await?
            .into_item()
            .ok_or_else(|| ViewError::NotFound(format!("no row at index {index}")))?;
        Ok(self.accessor.value(&row, property))
    }

    /// Handle for the row with identity `id`. Nothing is loaded until one of
    /// its properties is read.
    pub fn item(self: &Arc<Self>, id: SourceId<S>) -> RowItem<S> {
        RowItem {
            collection: Arc::clone(self),
            id,
        }
    }

    /// Property of one row, resolved on read.
    pub fn property(self: &Arc<Self>, id: SourceId<S>, property: &str) -> Result<BoundProperty<S>, ViewError> {
        self.check_property(property)?;
        Ok(BoundProperty {
            collection: Arc::clone(self),
            id,
            property: property.to_string(),
        })
    }
}

impl<S: FilterableSource> VirtualCollection<S> {
    pub fn filterable_property_ids(&self) -> Vec<String> {
        self.accessor.filterable()
    }

    pub async fn add_filter(&self, predicate: S::Predicate) -> Result<(), ViewError> {
        self.source.lock().await.add_filter(predicate)?;
        self.notify();
        Ok(())
    }

    pub async fn remove_filter(&self, predicate: &S::Predicate) {
        self.source.lock().await.remove_filter(predicate);
        self.notify();
    }

    pub async fn remove_all_filters(&self) {
        self.source.lock().await.remove_all_filters();
        self.notify();
    }

    pub async fn filters(&self) -> Vec<S::Predicate> {
        self.source.lock().await.filters()
    }
}

impl<S: SortableSource> VirtualCollection<S> {
    pub fn sortable_property_ids(&self) -> Vec<String> {
        self.accessor.sortable()
    }

    pub async fn sort(&self, properties: &[String], ascending: &[bool]) -> Result<(), ViewError> {
        self.source.lock().await.sort(properties, ascending)?;
        self.notify();
        Ok(())
    }

    pub async fn sort_spec(&self) -> Option<SortSpec> {
        self.source.lock().await.sort_spec().cloned()
    }
}

/// A row of a [`VirtualCollection`], addressed by identity.
pub struct RowItem<S: RowSource> {
    collection: Arc<VirtualCollection<S>>,
    id: SourceId<S>,
}

impl<S: RowSource> RowItem<S> {
    pub fn id(&self) -> &SourceId<S> {
        &self.id
    }

    pub fn property_ids(&self) -> Vec<String> {
        self.collection.property_ids()
    }

    pub fn property(&self, property: &str) -> Result<BoundProperty<S>, ViewError> {
        self.collection.property(self.id.clone(), property)
    }

    /// Every property value, loading the row once.
    pub async fn values(&self) -> Result<Vec<(String, Option<Value>)>, ViewError> {
        let row = self.collection.object(&self.id).await?;
        let accessor = &self.collection.accessor;
        Ok(accessor
            .all()
            .into_iter()
            .map(|property| {
                let value = accessor.value(&row, &property);
                (property, value)
            })
            .collect())
    }
}

/// A `(row identity, property)` pair whose value is looked up on every read.
pub struct BoundProperty<S: RowSource> {
    collection: Arc<VirtualCollection<S>>,
    id: SourceId<S>,
    property: String,
}

impl<S: RowSource> BoundProperty<S> {
    pub fn id(&self) -> &SourceId<S> {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.property
    }

    pub async fn value(&self) -> Result<Option<Value>, ViewError> {
        self.collection.property_value(&self.id, &self.property).await
    }
}
