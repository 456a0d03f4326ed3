//! Bounded read-through cache over a paged query backend.
//!
//! A `CachedView` keeps two structures:
//! - the identity cache: identity -> row, bounded by `cache_max_size`
//! - the index map: row index -> identity, under the current filters and sort
//!
//! Index entries may dangle. When the identity cache overflows, rows outside
//! the most recently requested range are evicted but their index entries are
//! kept, so a later lookup at that index resolves by identity (one
//! `fetch_one` with an identity predicate) instead of reloading the page.
//! Both structures, and the known size, are dropped on every filter or sort
//! change and on `invalidate()`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use crate::config::{CACHE_MAX_SIZE, DEFAULT_PAGE_SIZE, ViewConfig};
use crate::error::ViewError;
use crate::guarded::GuardedPort;
use crate::port::{IdOf, Query, QueryPort, SortSpec};
use crate::predicates::{NoCorePredicates, PredicateProvider, PredicateSet};
use crate::record::{Record, RecordAccessor};
use crate::source::{FilterableSource, RowLookup, RowSource, SortableSource};

/// One position of a loaded range.
enum Slot<T> {
    Row(T),
    /// Placeholder for a row whose per-row load failed. Never cached.
    Sentinel { item: T, reason: String },
}

/// A position that a page load could not fill.
struct Placeholder<T> {
    index: usize,
    sentinel: T,
    reason: String,
}

/// Cached, filterable, sortable view of a backend collection.
pub struct CachedView<P: QueryPort> {
    port: P,
    accessor: Arc<dyn RecordAccessor<P::Item>>,
    core: Arc<dyn PredicateProvider<P::Predicate>>,
    predicates: PredicateSet<P::Predicate>,
    sort: Option<SortSpec>,
    /// Row count under the current query; `None` forces a recount.
    total_size: Option<usize>,
    identity_cache: HashMap<IdOf<P>, P::Item>,
    index_map: BTreeMap<usize, IdOf<P>>,
    page_size: usize,
    cache_max_size: usize,
}

impl<P: QueryPort> CachedView<P> {
    /// Create a view with default page size and cache bound and no core
    /// predicates.
    pub fn new(port: P, accessor: Arc<dyn RecordAccessor<P::Item>>) -> Self {
        Self {
            port,
            accessor,
            core: Arc::new(NoCorePredicates),
            predicates: PredicateSet::new(),
            sort: None,
            total_size: None,
            identity_cache: HashMap::new(),
            index_map: BTreeMap::new(),
            page_size: DEFAULT_PAGE_SIZE,
            cache_max_size: CACHE_MAX_SIZE,
        }
    }

    /// Create a view using the sizes from `config`.
    ///
    /// The port is used as given; see [`CachedView::guarded`] to also apply
    /// the configured timeout and retries.
    pub fn with_config(
        port: P,
        accessor: Arc<dyn RecordAccessor<P::Item>>,
        config: &ViewConfig,
    ) -> Result<Self, ViewError> {
        config.validate()?;
        let mut view = Self::new(port, accessor);
        view.page_size = config.page_size;
        view.cache_max_size = config.cache_max_size;
        Ok(view)
    }

    /// Create a view whose port is wrapped with the configured timeout and
    /// retry policy.
    pub fn guarded(
        port: P,
        accessor: Arc<dyn RecordAccessor<P::Item>>,
        config: &ViewConfig,
    ) -> Result<CachedView<GuardedPort<P>>, ViewError> {
        CachedView::with_config(GuardedPort::new(port, config), accessor, config)
    }

    /// Scope the view with core predicates owned elsewhere.
    ///
    /// The provider is polled before every backend call; a generation change
    /// invalidates the view.
    pub fn with_core_predicates(
        mut self,
        core: Arc<dyn PredicateProvider<P::Predicate>>,
    ) -> Self {
        self.core = core;
        self.predicates = PredicateSet::new();
        self.invalidate();
        self
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn accessor(&self) -> &Arc<dyn RecordAccessor<P::Item>> {
        &self.accessor
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn set_page_size(&mut self, page_size: usize) -> Result<(), ViewError> {
        if page_size == 0 {
            return Err(ViewError::Misconfigured(
                "page_size must be positive".to_string(),
            ));
        }
        self.page_size = page_size;
        Ok(())
    }

    pub fn cache_max_size(&self) -> usize {
        self.cache_max_size
    }

    /// Number of rows held in the identity cache.
    pub fn cached_len(&self) -> usize {
        self.identity_cache.len()
    }

    /// Number of index positions with a known identity.
    pub fn mapped_len(&self) -> usize {
        self.index_map.len()
    }

    /// Whether the row with this identity is in the identity cache.
    pub fn is_cached(&self, id: &IdOf<P>) -> bool {
        self.identity_cache.contains_key(id)
    }

    /// Identity known for an index, without touching the backend.
    pub fn mapped_id(&self, index: usize) -> Option<&IdOf<P>> {
        self.index_map.get(&index)
    }

    /// Size from the last successful count, if still valid.
    pub fn known_size(&self) -> Option<usize> {
        self.total_size
    }

    pub fn sort_spec(&self) -> Option<&SortSpec> {
        self.sort.as_ref()
    }

    /// Consumer filters, in the order they were added.
    pub fn filters(&self) -> &[P::Predicate] {
        self.predicates.filters()
    }

    /// Core filters as of the last backend call.
    pub fn core_filters(&self) -> &[P::Predicate] {
        self.predicates.core()
    }

    /// Current query: consumer filters, core filters and ordering.
    pub fn query(&self) -> Query<P::Predicate> {
        Query::new(self.predicates.combined(), self.sort.clone())
    }

    /// Drop the known size, the identity cache and the index map.
    pub fn invalidate(&mut self) {
        debug!(
            cached = self.identity_cache.len(),
            mapped = self.index_map.len(),
            "invalidating view"
        );
        self.total_size = None;
        self.identity_cache.clear();
        self.index_map.clear();
    }

    /// Re-read core predicates if their owner changed them.
    async fn sync_core(&mut self) {
        let generation = self.core.generation();
        if !self.predicates.core_is_stale(generation) {
            return;
        }
        let core = self.core.snapshot().await;
        trace!(generation, count = core.len(), "core predicates refreshed");
        self.predicates.set_core(core, generation);
        self.invalidate();
    }

    /// Number of rows under the current query.
    ///
    /// Counts once and reuses the result until the next invalidation.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn size(&mut self) -> Result<usize, ViewError> {
        self.sync_core().await;
        if let Some(size) = self.total_size {
            return Ok(size);
        }
        let size = self
            .port
            .count(&self.query())
            .await
            .map_err(|e| ViewError::backend("size", e))?;
        trace!(size, "counted rows");
        self.total_size = Some(size);
        Ok(size)
    }

    /// Identities of up to `count` rows starting at `start`.
    ///
    /// Mapped positions are served from the index map. The first unmapped
    /// position triggers one range load for everything still missing, after
    /// which the scan stops; later gaps are left for the next call. A failed
    /// range load degrades to per-row loads, and rows that still fail are
    /// represented by the accessor's sentinel identity.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn item_ids(&mut self, start: usize, count: usize) -> Result<Vec<IdOf<P>>, ViewError> {
        self.sync_core().await;
        let (ids, _) = self.fill(start, count).await;
        Ok(ids)
    }

    /// Scan and load for `item_ids`, also reporting the positions that were
    /// replaced by placeholders.
    async fn fill(&mut self, start: usize, count: usize) -> (Vec<IdOf<P>>, Vec<Placeholder<P::Item>>) {
        let mut result = Vec::with_capacity(count);
        let mut degraded = Vec::new();
        let end = start.saturating_add(count);
        for index in start..end {
            if let Some(id) = self.index_map.get(&index) {
                result.push(id.clone());
                continue;
            }

            let remaining = count - (index - start);
            let slots = self.load_range(index, remaining).await;
            for (offset, slot) in slots.into_iter().enumerate() {
                match slot {
                    Slot::Row(item) => {
                        let id = item.id();
                        self.insert(index + offset, item);
                        result.push(id);
                    }
                    Slot::Sentinel { item, reason } => {
                        result.push(item.id());
                        degraded.push(Placeholder {
                            index: index + offset,
                            sentinel: item,
                            reason,
                        });
                    }
                }
            }
            break;
        }

        self.enforce_bound(&result);
        (result, degraded)
    }

    /// Load `limit` rows at `offset`, degrading to per-row loads on failure.
    async fn load_range(&self, offset: usize, limit: usize) -> Vec<Slot<P::Item>> {
        let query = self.query();
        let error = match self.port.fetch_range(&query, offset, limit).await {
            Ok(items) => {
                trace!(offset, limit, loaded = items.len(), "range loaded");
                return items.into_iter().map(Slot::Row).collect();
            }
            Err(e) => e,
        };

        // Rows past a known end would only produce placeholders
        let limit = match self.total_size {
            Some(total) => limit.min(total.saturating_sub(offset)),
            None => limit,
        };
        warn!(offset, limit, error = %error, "range load failed, loading rows one by one");

        let mut slots = Vec::with_capacity(limit);
        for index in offset..offset + limit {
            match self.port.fetch_one(&query, index).await {
                Ok(Some(item)) => slots.push(Slot::Row(item)),
                Ok(None) => break,
                Err(e) => {
                    warn!(index, error = %e, "row load failed, substituting placeholder");
                    slots.push(Slot::Sentinel {
                        item: self.accessor.sentinel(index),
                        reason: e.to_string(),
                    });
                }
            }
        }
        slots
    }

    fn insert(&mut self, index: usize, item: P::Item) {
        let id = item.id();
        self.index_map.insert(index, id.clone());
        self.identity_cache.insert(id, item);
    }

    /// Evict every cached row outside `keep` once the cache exceeds its bound.
    /// Index entries survive.
    fn enforce_bound(&mut self, keep: &[IdOf<P>]) {
        if self.identity_cache.len() <= self.cache_max_size {
            return;
        }
        let keep: HashSet<&IdOf<P>> = keep.iter().collect();
        let before = self.identity_cache.len();
        self.identity_cache.retain(|id, _| keep.contains(id));
        debug!(
            evicted = before - self.identity_cache.len(),
            kept = self.identity_cache.len(),
            "identity cache over bound, evicted rows outside requested range"
        );
    }

    /// Row at `index`.
    ///
    /// Resolution order: index map plus identity cache (or a by-identity load
    /// for a dangling entry), then a page load of `page_size` rows starting at
    /// `index`, then a single-row load. If the row still cannot be loaded the
    /// accessor's sentinel is returned as [`RowLookup::Degraded`].
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn object_by_index(&mut self, index: usize) -> Result<RowLookup<P::Item>, ViewError> {
        self.sync_core().await;

        if let Some(id) = self.index_map.get(&index).cloned() {
            trace!(index, "index mapped");
            return Ok(self.resolve_mapped(index, &id).await);
        }

        if self.total_size.is_some_and(|total| index >= total) {
            return Ok(RowLookup::Missing);
        }

        let page_size = self.page_size;
        let (_, degraded) = self.fill(index, page_size).await;
        if let Some(id) = self.index_map.get(&index).cloned() {
            return Ok(self.resolve_mapped(index, &id).await);
        }
        // The page load already tried this row on its own
        if let Some(failed) = degraded.into_iter().find(|d| d.index == index) {
            return Ok(RowLookup::Degraded {
                sentinel: failed.sentinel,
                reason: failed.reason,
            });
        }

        warn!(index, page_size, "row not cached by page load, loading it directly");
        match self.port.fetch_one(&self.query(), index).await {
            Ok(Some(item)) => {
                self.insert(index, item.clone());
                Ok(RowLookup::Found(item))
            }
            Ok(None) => Ok(RowLookup::Missing),
            Err(e) => {
                warn!(index, error = %e, "row unavailable, returning placeholder");
                Ok(RowLookup::Degraded {
                    sentinel: self.accessor.sentinel(index),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn resolve_mapped(&mut self, index: usize, id: &IdOf<P>) -> RowLookup<P::Item> {
        match self.object(id).await {
            Ok(item) => RowLookup::Found(item),
            Err(ViewError::NotFound(_)) => RowLookup::Missing,
            Err(e) => {
                warn!(index, ?id, error = %e, "mapped row unavailable, returning placeholder");
                RowLookup::Degraded {
                    sentinel: self.accessor.sentinel(index),
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Row with the given identity, if it passes the current filters.
    ///
    /// Cache hits return directly; misses load by identity and cache the
    /// result.
    pub async fn object(&mut self, id: &IdOf<P>) -> Result<P::Item, ViewError> {
        self.sync_core().await;
        if let Some(item) = self.identity_cache.get(id) {
            return Ok(item.clone());
        }

        trace!(?id, "identity not cached, loading by identity");
        let query = self.query().and(self.port.identity_predicate(id));
        let item = self
            .port
            .fetch_one(&query, 0)
            .await
            .map_err(|e| ViewError::backend("object", e))?;

        match item {
            Some(item) => {
                self.identity_cache.insert(item.id(), item.clone());
                Ok(item)
            }
            None => {
                debug!(?id, "no row with identity under current filters");
                Err(ViewError::NotFound(format!("{id:?}")))
            }
        }
    }

    /// Whether a row with this identity passes the current filters.
    ///
    /// Checks the identity cache first; otherwise this queries the backend.
    pub async fn contains_id(&mut self, id: &IdOf<P>) -> Result<bool, ViewError> {
        self.sync_core().await;
        if self.identity_cache.contains_key(id) {
            return Ok(true);
        }
        debug!(?id, "contains_id on uncached identity, querying backend");
        match self.object(id).await {
            Ok(_) => Ok(true),
            Err(ViewError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Index of a row. Only rows paged in since the last invalidation are
    /// known; after a core predicate change nothing is known until the next
    /// backend call.
    pub fn index_of_id(&self, id: &IdOf<P>) -> Result<usize, ViewError> {
        if self.predicates.core_is_stale(self.core.generation()) {
            return Err(ViewError::NotFound(format!(
                "no index known for {id:?}: core predicates changed"
            )));
        }
        self.index_map
            .iter()
            .find(|(_, mapped)| *mapped == id)
            .map(|(index, _)| *index)
            .ok_or_else(|| ViewError::NotFound(format!("no index known for {id:?}")))
    }

    /// Add a consumer filter. Predicates the backend cannot evaluate are
    /// rejected.
    pub fn add_filter(&mut self, predicate: P::Predicate) -> Result<(), ViewError> {
        self.port
            .check_predicate(&predicate)
            .map_err(|e| ViewError::Misconfigured(format!("{predicate:?}: {e}")))?;
        self.predicates.add(predicate);
        self.invalidate();
        Ok(())
    }

    /// Remove the first consumer filter equal to `predicate`.
    pub fn remove_filter(&mut self, predicate: &P::Predicate) {
        if !self.predicates.remove(predicate) {
            debug!(?predicate, "remove_filter on a filter that is not applied");
        }
        self.invalidate();
    }

    pub fn remove_all_filters(&mut self) {
        self.predicates.clear();
        self.invalidate();
    }

    /// Order by the first of `properties`. An empty slice clears ordering.
    ///
    /// Extra keys are ignored with a warning. A missing direction means
    /// ascending.
    pub fn sort(&mut self, properties: &[String], ascending: &[bool]) -> Result<(), ViewError> {
        let spec = match properties {
            [] => None,
            [first, rest @ ..] => {
                if !rest.is_empty() {
                    warn!(
                        property = %first,
                        ignored = ?rest,
                        "multiple sort keys requested, only the first is used"
                    );
                }
                Some(SortSpec {
                    property: first.clone(),
                    ascending: ascending.first().copied().unwrap_or(true),
                })
            }
        };
        self.set_sort(spec)
    }

    /// Replace the ordering.
    pub fn set_sort(&mut self, spec: Option<SortSpec>) -> Result<(), ViewError> {
        if let Some(spec) = &spec
            && !self.accessor.sortable().contains(&spec.property)
        {
            return Err(ViewError::Misconfigured(format!(
                "property '{}' is not sortable",
                spec.property
            )));
        }
        self.sort = spec;
        self.invalidate();
        Ok(())
    }
}

#[async_trait]
impl<P: QueryPort> RowSource for CachedView<P> {
    type Item = P::Item;

    async fn size(&mut self) -> Result<usize, ViewError> {
        CachedView::size(self).await
    }

    async fn item_ids(&mut self, start: usize, count: usize) -> Result<Vec<IdOf<P>>, ViewError> {
        CachedView::item_ids(self, start, count).await
    }

    async fn object_by_index(&mut self, index: usize) -> Result<RowLookup<P::Item>, ViewError> {
        CachedView::object_by_index(self, index).await
    }

    async fn object(&mut self, id: &IdOf<P>) -> Result<P::Item, ViewError> {
        CachedView::object(self, id).await
    }

    async fn contains_id(&mut self, id: &IdOf<P>) -> Result<bool, ViewError> {
        CachedView::contains_id(self, id).await
    }

    fn index_of_id(&self, id: &IdOf<P>) -> Result<usize, ViewError> {
        CachedView::index_of_id(self, id)
    }

    fn accessor(&self) -> &Arc<dyn RecordAccessor<P::Item>> {
        &self.accessor
    }

    fn invalidate(&mut self) {
        CachedView::invalidate(self);
    }
}

impl<P: QueryPort> FilterableSource for CachedView<P> {
    type Predicate = P::Predicate;

    fn add_filter(&mut self, predicate: P::Predicate) -> Result<(), ViewError> {
        CachedView::add_filter(self, predicate)
    }

    fn remove_filter(&mut self, predicate: &P::Predicate) {
        CachedView::remove_filter(self, predicate);
    }

    fn remove_all_filters(&mut self) {
        CachedView::remove_all_filters(self);
    }

    fn filters(&self) -> Vec<P::Predicate> {
        self.predicates.filters().to_vec()
    }
}

impl<P: QueryPort> SortableSource for CachedView<P> {
    fn sort(&mut self, properties: &[String], ascending: &[bool]) -> Result<(), ViewError> {
        CachedView::sort(self, properties, ascending)
    }

    fn sort_spec(&self) -> Option<&SortSpec> {
        self.sort.as_ref()
    }
}
