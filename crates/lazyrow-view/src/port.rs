//! The query backend a cached view pages against.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::record::Record;

/// Single-key ordering applied by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    /// Property to order by.
    pub property: String,
    /// Ascending when true.
    pub ascending: bool,
}

impl SortSpec {
    pub fn ascending(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            ascending: true,
        }
    }

    pub fn descending(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            ascending: false,
        }
    }
}

/// Query shape handed to the backend: conjunctive predicates plus ordering.
///
/// Predicates are passed through untouched; only the backend interprets them.
#[derive(Debug, Clone, PartialEq)]
pub struct Query<P> {
    pub predicates: Vec<P>,
    pub sort: Option<SortSpec>,
}

impl<P> Query<P> {
    pub fn new(predicates: Vec<P>, sort: Option<SortSpec>) -> Self {
        Self { predicates, sort }
    }

    /// Unfiltered, unordered query.
    pub fn all() -> Self {
        Self {
            predicates: Vec::new(),
            sort: None,
        }
    }

    /// Copy of this query with one more predicate.
    pub fn and(&self, predicate: P) -> Self
    where
        P: Clone,
    {
        let mut predicates = self.predicates.clone();
        predicates.push(predicate);
        Self {
            predicates,
            sort: self.sort.clone(),
        }
    }
}

/// Identity type of the rows served by a port.
pub type IdOf<P> = <<P as QueryPort>::Item as Record>::Id;

/// Paged read access to a backend collection.
///
/// Implementations answer three questions efficiently: how many rows match,
/// the single row at an offset, and a contiguous range of rows. Rows come
/// back in the order given by the query's sort spec.
#[async_trait]
pub trait QueryPort: Send + Sync {
    /// Row type.
    type Item: Record;

    /// Backend-specific filter condition.
    type Predicate: Clone + Debug + PartialEq + Send + Sync + 'static;

    /// Equality predicate selecting the row with the given identity.
    fn identity_predicate(&self, id: &IdOf<Self>) -> Self::Predicate;

    /// Reject predicates the backend cannot evaluate.
    fn check_predicate(&self, _predicate: &Self::Predicate) -> Result<(), BackendError> {
        Ok(())
    }

    /// Number of rows matching the query.
    async fn count(&self, query: &Query<Self::Predicate>) -> Result<usize, BackendError>;

    /// The row at `offset`, or `None` past the end.
    async fn fetch_one(
        &self,
        query: &Query<Self::Predicate>,
        offset: usize,
    ) -> Result<Option<Self::Item>, BackendError>;

    /// Up to `limit` rows starting at `offset`.
    async fn fetch_range(
        &self,
        query: &Query<Self::Predicate>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Self::Item>, BackendError>;
}

#[async_trait]
impl<P: QueryPort> QueryPort for Arc<P> {
    type Item = P::Item;
    type Predicate = P::Predicate;

    fn identity_predicate(&self, id: &IdOf<Self>) -> Self::Predicate {
        (**self).identity_predicate(id)
    }

    fn check_predicate(&self, predicate: &Self::Predicate) -> Result<(), BackendError> {
        (**self).check_predicate(predicate)
    }

    async fn count(&self, query: &Query<Self::Predicate>) -> Result<usize, BackendError> {
        (**self).count(query).await
    }

    async fn fetch_one(
        &self,
        query: &Query<Self::Predicate>,
        offset: usize,
    ) -> Result<Option<Self::Item>, BackendError> {
        (**self).fetch_one(query, offset).await
    }

    async fn fetch_range(
        &self,
        query: &Query<Self::Predicate>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Self::Item>, BackendError> {
        (**self).fetch_range(query, offset, limit).await
    }
}
