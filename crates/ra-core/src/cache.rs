//! Process-lifetime memoization of successful research results.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use crate::schema::ResearchResponse;

pub const DEFAULT_CACHE_CAPACITY: usize = 128;

/// Successful responses keyed by the exact query text.
///
/// Entries never expire by time. When `capacity` is reached the oldest
/// insertion is evicted. A capacity of zero disables caching.
pub struct ResultCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, ResearchResponse>,
    order: VecDeque<String>,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn get(&self, query: &str) -> Option<ResearchResponse> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.entries.get(query).cloned()
    }

    pub fn insert(&self, query: &str, response: ResearchResponse) {
        if self.capacity == 0 {
            return;
        }

        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.entries.insert(query.to_string(), response).is_some() {
            return;
        }

        inner.order.push_back(query.to_string());
        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
