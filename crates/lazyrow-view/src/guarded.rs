//! Timeout and retry wrapper for query ports.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use tracing::{debug, warn};

use crate::config::{RetryConfig, ViewConfig};
use crate::error::BackendError;
use crate::port::{IdOf, Query, QueryPort};

/// Wraps a port with a per-call deadline and exponential-backoff retries.
///
/// A call that exceeds the deadline fails with [`BackendError::Timeout`],
/// which the view reports as `BackendUnavailable`. `Unsupported` errors are
/// never retried.
pub struct GuardedPort<P> {
    inner: P,
    timeout: Option<Duration>,
    retry: RetryConfig,
}

impl<P: QueryPort> GuardedPort<P> {
    pub fn new(inner: P, config: &ViewConfig) -> Self {
        Self {
            inner,
            timeout: config.fetch_timeout(),
            retry: config.retry.clone(),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.retry.initial_interval(),
            initial_interval: self.retry.initial_interval(),
            max_interval: self.retry.max_interval(),
            max_elapsed_time: None, // bounded by max_retries instead
            ..Default::default()
        }
    }

    async fn call<T, F, Fut>(&self, operation: &'static str, f: F) -> Result<T, BackendError>
    where
        T: Send,
        F: Fn() -> Fut + Send,
        Fut: Future<Output = Result<T, BackendError>> + Send,
    {
        let mut backoff = self.backoff();
        let mut attempt = 0u32;

        loop {
            let result = match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, f()).await {
                    Ok(result) => result,
                    Err(_) => Err(BackendError::Timeout(limit.as_millis() as u64)),
                },
                None => f().await,
            };

            match result {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation, attempt, "backend call recovered after retry");
                    }
                    return Ok(value);
                }
                Err(e @ BackendError::Unsupported(_)) => return Err(e),
                Err(e) if attempt < self.retry.max_retries => {
                    attempt += 1;
                    let wait = backoff
                        .next_backoff()
                        .unwrap_or_else(|| self.retry.max_interval());
                    warn!(
                        operation,
                        attempt,
                        error = %e,
                        wait_ms = wait.as_millis() as u64,
                        "backend call failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl<P: QueryPort> QueryPort for GuardedPort<P> {
    type Item = P::Item;
    type Predicate = P::Predicate;

    fn identity_predicate(&self, id: &IdOf<Self>) -> Self::Predicate {
        self.inner.identity_predicate(id)
    }

    fn check_predicate(&self, predicate: &Self::Predicate) -> Result<(), BackendError> {
        self.inner.check_predicate(predicate)
    }

    async fn count(&self, query: &Query<Self::Predicate>) -> Result<usize, BackendError> {
        self.call("count", move || self.inner.count(query)).await
    }

    async fn fetch_one(
        &self,
        query: &Query<Self::Predicate>,
        offset: usize,
    ) -> Result<Option<Self::Item>, BackendError> {
        self.call("fetch_one", move || self.inner.fetch_one(query, offset))
            .await
    }

    async fn fetch_range(
        &self,
        query: &Query<Self::Predicate>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Self::Item>, BackendError> {
        self.call("fetch_range", move || self.inner.fetch_range(query, offset, limit))
            .await
    }
}
