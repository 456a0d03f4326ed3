//! Cached, virtualized collection views over paged query backends.
//!
//! This crate provides:
//! - `CachedView`: a bounded read-through cache over a `QueryPort`, paging
//!   rows by index and resolving them by identity
//! - `VirtualCollection`: a read-only facade for table widgets with bound
//!   properties and change notification
//! - `InMemorySource`: a row source for small lists loaded at once
//! - `TimedCache`: a single-key cache valid for a short wall-clock window
//! - `GuardedPort`: per-call timeout and retry around any port

pub mod config;
mod error;
pub mod facade;
mod guarded;
mod memory_source;
pub mod port;
pub mod predicates;
mod record;
pub mod source;
#[cfg(test)]
mod testing;
mod timed;
mod view;

pub use config::{CACHE_MAX_SIZE, DEFAULT_PAGE_SIZE, RetryConfig, ViewConfig};
pub use error::{BackendError, ViewError};
pub use facade::{BoundProperty, CollectionEvent, RowItem, VirtualCollection};
pub use guarded::GuardedPort;
pub use memory_source::InMemorySource;
pub use port::{IdOf, Query, QueryPort, SortSpec};
pub use predicates::{NoCorePredicates, PredicateProvider, PredicateSet, SharedPredicates};
pub use record::{Record, RecordAccessor};
pub use source::{FilterableSource, RowLookup, RowSource, SortableSource, SourceId};
pub use timed::{DEFAULT_TTL_MS, TimedCache};
pub use view::CachedView;
