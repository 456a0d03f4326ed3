//! Consumer filters and externally owned core filters.
//!
//! A view's predicate set has two halves. The consumer half is edited through
//! the view (`add_filter`, `remove_filter`, ...). The core half scopes the view
//! (e.g. "only rows owned by the current user") and belongs to someone else;
//! the view observes it through a [`PredicateProvider`] and re-reads it when
//! the provider's generation moves.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Source of core predicates the consumer cannot remove.
#[async_trait]
pub trait PredicateProvider<P>: Send + Sync {
    /// Current core predicates.
    async fn snapshot(&self) -> Vec<P>;

    /// Bumped on every change to the core predicates.
    fn generation(&self) -> u64;
}

/// Provider for views without core predicates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCorePredicates;

#[async_trait]
impl<P: Send + 'static> PredicateProvider<P> for NoCorePredicates {
    async fn snapshot(&self) -> Vec<P> {
        Vec::new()
    }

    fn generation(&self) -> u64 {
        0
    }
}

/// Core predicate list shared between an owner and any number of views.
///
/// Every mutation bumps the generation so views pick up the change on their
/// next backend call.
pub struct SharedPredicates<P> {
    predicates: RwLock<Vec<P>>,
    generation: AtomicU64,
}

impl<P: Clone + PartialEq + Send + Sync + 'static> SharedPredicates<P> {
    pub fn new(initial: Vec<P>) -> Arc<Self> {
        Arc::new(Self {
            predicates: RwLock::new(initial),
            generation: AtomicU64::new(0),
        })
    }

    /// Append a predicate.
    pub async fn push(&self, predicate: P) {
        self.predicates.write().await.push(predicate);
        self.bump();
    }

    /// Remove the first predicate equal to `predicate`. Returns whether one
    /// was removed.
    pub async fn remove(&self, predicate: &P) -> bool {
        let mut predicates = self.predicates.write().await;
        let Some(pos) = predicates.iter().position(|p| p == predicate) else {
            return false;
        };
        predicates.remove(pos);
        drop(predicates);
        self.bump();
        true
    }

    /// Replace the whole list.
    pub async fn replace(&self, predicates: Vec<P>) {
        *self.predicates.write().await = predicates;
        self.bump();
    }

    pub async fn clear(&self) {
        self.predicates.write().await.clear();
        self.bump();
    }

    pub async fn len(&self) -> usize {
        self.predicates.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.predicates.read().await.is_empty()
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl<P: Clone + PartialEq + Send + Sync + 'static> PredicateProvider<P> for SharedPredicates<P> {
    async fn snapshot(&self) -> Vec<P> {
        self.predicates.read().await.clone()
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

/// Active predicates of one view: consumer filters first, then core filters.
#[derive(Debug, Clone)]
pub struct PredicateSet<P> {
    filters: Vec<P>,
    core: Vec<P>,
    /// Provider generation `core` was read at; `None` until first read.
    core_generation: Option<u64>,
}

impl<P> Default for PredicateSet<P> {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            core: Vec::new(),
            core_generation: None,
        }
    }
}

impl<P: Clone + PartialEq> PredicateSet<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, predicate: P) {
        self.filters.push(predicate);
    }

    /// Remove the first consumer filter equal to `predicate`.
    pub fn remove(&mut self, predicate: &P) -> bool {
        match self.filters.iter().position(|p| p == predicate) {
            Some(pos) => {
                self.filters.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Drop every consumer filter. Core filters are untouched.
    pub fn clear(&mut self) {
        self.filters.clear();
    }

    pub fn filters(&self) -> &[P] {
        &self.filters
    }

    pub fn core(&self) -> &[P] {
        &self.core
    }

    /// Whether the stored core snapshot is older than `generation`.
    pub fn core_is_stale(&self, generation: u64) -> bool {
        self.core_generation != Some(generation)
    }

    pub fn set_core(&mut self, core: Vec<P>, generation: u64) {
        self.core = core;
        self.core_generation = Some(generation);
    }

    /// Consumer filters followed by core filters.
    pub fn combined(&self) -> Vec<P> {
        self.filters.iter().chain(self.core.iter()).cloned().collect()
    }
}
