//! Error types for cached views and their backends.

use thiserror::Error;

/// Errors a query backend reports to the view.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The query itself failed (connection lost, statement error, ...).
    #[error("query failed: {0}")]
    Query(String),

    /// The call did not complete in time.
    #[error("backend call timed out after {0}ms")]
    Timeout(u64),

    /// The backend cannot evaluate the given predicate or ordering.
    #[error("unsupported by backend: {0}")]
    Unsupported(String),
}

/// Errors that can occur in view operations.
#[derive(Debug, Error)]
pub enum ViewError {
    /// A count or fetch call failed or timed out.
    #[error("backend unavailable during {operation}: {source}")]
    BackendUnavailable {
        /// The view operation that needed the backend.
        operation: &'static str,
        #[source]
        source: BackendError,
    },

    /// Identity not resolvable through the index map or the backend.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unsupported predicate, non-sortable property or invalid configuration.
    #[error("misconfigured: {0}")]
    Misconfigured(String),
}

impl ViewError {
    pub(crate) fn backend(operation: &'static str, source: BackendError) -> Self {
        ViewError::BackendUnavailable { operation, source }
    }

    /// Whether this error came from the backend rather than from the caller.
    pub fn is_backend(&self) -> bool {
        matches!(self, ViewError::BackendUnavailable { .. })
    }
}
