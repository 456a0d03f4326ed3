//! View configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ViewError;

/// Identity cache bound. When exceeded, rows outside the most recently
/// requested range are dropped.
pub const CACHE_MAX_SIZE: usize = 200;

/// Rows loaded around a single index lookup.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Tunables for a cached view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Rows loaded when an index lookup misses the index map.
    pub page_size: usize,
    /// Identity cache bound.
    pub cache_max_size: usize,
    /// Per-call backend deadline; no deadline when absent.
    pub fetch_timeout_ms: Option<u64>,
    /// Retry policy for failed backend calls.
    pub retry: RetryConfig,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            cache_max_size: CACHE_MAX_SIZE,
            fetch_timeout_ms: None,
            retry: RetryConfig::default(),
        }
    }
}

impl ViewConfig {
    /// Reject settings the view cannot work with.
    pub fn validate(&self) -> Result<(), ViewError> {
        if self.page_size == 0 {
            return Err(ViewError::Misconfigured(
                "page_size must be positive".to_string(),
            ));
        }
        if self.cache_max_size == 0 {
            return Err(ViewError::Misconfigured(
                "cache_max_size must be positive".to_string(),
            ));
        }
        if self.fetch_timeout_ms == Some(0) {
            return Err(ViewError::Misconfigured(
                "fetch_timeout_ms must be positive when set".to_string(),
            ));
        }
        self.retry.validate()
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }
}

/// Exponential backoff between retries of a failed backend call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Extra attempts after the first failure. Zero disables retrying.
    pub max_retries: u32,
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_interval_ms: 100,
            max_interval_ms: 2_000,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), ViewError> {
        if self.initial_interval_ms > self.max_interval_ms {
            return Err(ViewError::Misconfigured(format!(
                "retry initial interval {}ms exceeds max interval {}ms",
                self.initial_interval_ms, self.max_interval_ms
            )));
        }
        Ok(())
    }

    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }
}
