// SPDX-License-Identifier: MPL-2.0

//! Cache warming
//!
//! A prefetch is fire-and-forget: nothing waits on it and a failure is only
//! logged. The surface that later shows the asset goes through its own
//! load/timeout/retry cycle regardless.

use crate::constants::preload::RESPONSE_CACHE_ENTRIES;
use crate::errors::{AppError, AppResult};
use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Timeout for a single warming request
const WARM_TIMEOUT: Duration = Duration::from_secs(30);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Something that can pull a URL into a cache
pub trait Prefetcher: Send + Sync {
    /// Start fetching `url`; returns immediately
    fn warm(&self, url: &str);
}

/// Prefetcher that only records what it was asked to warm
#[derive(Debug, Default)]
pub struct RecordingPrefetcher {
    urls: Mutex<Vec<String>>,
}

impl RecordingPrefetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every URL passed to `warm`, in call order
    pub fn warmed(&self) -> Vec<String> {
        lock(&self.urls).clone()
    }

    pub fn count(&self) -> usize {
        lock(&self.urls).len()
    }
}

impl Prefetcher for RecordingPrefetcher {
    fn warm(&self, url: &str) {
        lock(&self.urls).push(url.to_string());
    }
}

/// Bounded, session-only response cache with FIFO eviction
#[derive(Debug)]
pub struct ResponseCache {
    capacity: usize,
    order: VecDeque<String>,
    bodies: HashMap<String, Bytes>,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            bodies: HashMap::new(),
        }
    }

    pub fn get(&self, url: &str) -> Option<Bytes> {
        self.bodies.get(url).cloned()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.bodies.contains_key(url)
    }

    pub fn insert(&mut self, url: String, body: Bytes) {
        if self.bodies.insert(url.clone(), body).is_some() {
            return;
        }
        self.order.push_back(url);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.bodies.remove(&evicted);
                debug!(url = %evicted, "Evicted cached response");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(RESPONSE_CACHE_ENTRIES)
    }
}

/// Plain HTTP GET warming into a [`ResponseCache`]
pub struct HttpPrefetcher {
    client: reqwest::Client,
    runtime: Handle,
    cache: Arc<Mutex<ResponseCache>>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl HttpPrefetcher {
    /// Must be called from within a tokio runtime
    pub fn new(capacity: usize) -> AppResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| AppError::Other(format!("No tokio runtime for prefetching: {}", e)))?;
        let client = reqwest::Client::builder()
            .timeout(WARM_TIMEOUT)
            .build()
            .map_err(|e| AppError::Other(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            runtime,
            cache: Arc::new(Mutex::new(ResponseCache::new(capacity))),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    /// Cached body for `url`, if it was warmed and not evicted
    pub fn cached(&self, url: &str) -> Option<Bytes> {
        lock(&self.cache).get(url)
    }

    pub fn cached_count(&self) -> usize {
        lock(&self.cache).len()
    }

    pub fn in_flight_count(&self) -> usize {
        lock(&self.in_flight).len()
    }

    async fn fetch(client: &reqwest::Client, url: &str) -> Result<Bytes, reqwest::Error> {
        client.get(url).send().await?.error_for_status()?.bytes().await
    }
}

impl Prefetcher for HttpPrefetcher {
    fn warm(&self, url: &str) {
        if lock(&self.cache).contains(url) {
            debug!(url, "Already cached");
            return;
        }
        if !lock(&self.in_flight).insert(url.to_string()) {
            debug!(url, "Already warming");
            return;
        }

        let client = self.client.clone();
        let cache = Arc::clone(&self.cache);
        let in_flight = Arc::clone(&self.in_flight);
        let url = url.to_string();
        self.runtime.spawn(async move {
            match Self::fetch(&client, &url).await {
                Ok(body) => {
                    debug!(url = %url, bytes = body.len(), "Warmed");
                    lock(&cache).insert(url.clone(), body);
                }
                Err(e) => warn!(url = %url, error = %e, "Prefetch failed"),
            }
            lock(&in_flight).remove(&url);
        });
    }
}

impl std::fmt::Debug for HttpPrefetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPrefetcher")
            .field("cached", &self.cached_count())
            .field("in_flight", &self.in_flight_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_evicts_oldest() {
        let mut cache = ResponseCache::new(2);
        cache.insert("a".into(), Bytes::from_static(b"1"));
        cache.insert("b".into(), Bytes::from_static(b"2"));
        cache.insert("a".into(), Bytes::from_static(b"1"));
        cache.insert("c".into(), Bytes::from_static(b"3"));
        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn unreachable_url_is_not_cached() {
        let prefetcher = HttpPrefetcher::new(4).unwrap();
        prefetcher.warm("http://127.0.0.1:9/unreachable.jpg");
        prefetcher.warm("http://127.0.0.1:9/unreachable.jpg");
        assert!(prefetcher.in_flight_count() <= 1);
        for _ in 0..200 {
            if prefetcher.in_flight_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        assert_eq!(prefetcher.cached_count(), 0);
    }

    #[test]
    fn prefetcher_requires_runtime() {
        assert!(HttpPrefetcher::new(4).is_err());
    }
}
