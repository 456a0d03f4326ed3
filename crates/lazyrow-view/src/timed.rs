//! Single-key cache valid for a short wall-clock window.

use std::collections::HashMap;
use std::hash::Hash;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::trace;

/// Milliseconds a key stays valid after [`TimedCache::set_key`].
pub const DEFAULT_TTL_MS: i64 = 1_000;

/// Values cached for one access key at a time.
///
/// Setting a key discards everything cached for the previous key, even when
/// the previous window has not elapsed. Expiry is checked when the cache is
/// read; nothing runs in the background. Callers pass `now` so reads of one
/// render pass can share a timestamp.
#[derive(Debug, Clone)]
pub struct TimedCache<K, I, T> {
    key: Option<K>,
    set_at: DateTime<Utc>,
    ttl: TimeDelta,
    values: HashMap<I, T>,
    /// Ids in insertion order.
    ids: Vec<I>,
}

impl<K, I, T> Default for TimedCache<K, I, T> {
    fn default() -> Self {
        Self::with_ttl(TimeDelta::milliseconds(DEFAULT_TTL_MS))
    }
}

impl<K, I, T> TimedCache<K, I, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: TimeDelta) -> Self {
        Self {
            key: None,
            set_at: DateTime::<Utc>::MIN_UTC,
            ttl,
            values: HashMap::new(),
            ids: Vec::new(),
        }
    }

    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    /// Drop all values and the key.
    pub fn invalidate(&mut self) {
        self.values.clear();
        self.ids.clear();
        self.key = None;
    }

    /// Ids cached under the current key, in insertion order.
    pub fn keys(&self) -> &[I] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl<K: Eq, I: Eq + Hash + Clone, T> TimedCache<K, I, T> {
    /// Start a new window for `key`, discarding previous values.
    pub fn set_key(&mut self, key: K, now: DateTime<Utc>) {
        self.invalidate();
        self.key = Some(key);
        self.set_at = now;
    }

    /// Whether `key` is the current key and its window is still open.
    pub fn is_valid(&self, key: &K, now: DateTime<Utc>) -> bool {
        match &self.key {
            Some(current) => current == key && now - self.set_at < self.ttl,
            None => false,
        }
    }

    /// Value cached for `id`, provided `key` is still valid. An expired or
    /// mismatched key empties the cache.
    pub fn get(&mut self, key: &K, id: &I, now: DateTime<Utc>) -> Option<&T> {
        if !self.is_valid(key, now) {
            if self.key.is_some() {
                trace!("timed cache expired");
                self.invalidate();
            }
            return None;
        }
        self.values.get(id)
    }

    /// Cache `value` under the current key.
    pub fn set(&mut self, id: I, value: T) {
        if self.values.insert(id.clone(), value).is_none() {
            self.ids.push(id);
        }
    }

    /// Whether `id` is cached, without checking the window.
    pub fn contains_id(&self, id: &I) -> bool {
        self.values.contains_key(id)
    }
}
