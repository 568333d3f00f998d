/*!
 * Local-Asset Cache
 * Pluggable cache store plus the strategy layer applied to
 * mediator-local asset requests
 */

use super::upstream::{Upstream, UpstreamError, UpstreamResponse};
use crate::core::types::{now_ms, TimestampMs};
use crate::policy::CacheStrategy;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use url::Url;

/// One cached response
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub body: Bytes,
    pub content_type: Option<String>,
    pub stored_at_ms: TimestampMs,
}

impl CacheEntry {
    fn from_response(response: &UpstreamResponse) -> Self {
        Self {
            body: response.body.clone(),
            content_type: response.content_type.clone(),
            stored_at_ms: now_ms(),
        }
    }
}

/// Persistent cache store seam: lookup/put keyed by request identity
/// (the full request URL).
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn lookup(&self, key: &str) -> Option<CacheEntry>;
    async fn put(&self, key: &str, entry: CacheEntry);
}

/// In-memory store with read/write counters
pub struct MemoryCacheStore {
    entries: DashMap<String, CacheEntry>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn lookup(&self, key: &str) -> Option<CacheEntry> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.entries.get(key).map(|e| e.clone())
    }

    async fn put(&self, key: &str, entry: CacheEntry) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(key.to_string(), entry);
    }
}

/// Applies the policy cache strategy to local-asset requests
pub struct CacheManager {
    store: Arc<dyn CacheStore>,
}

impl CacheManager {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Serve a local asset under the given strategy.
    ///
    /// `network-first` fetches, refreshes the cache, and falls back to a
    /// cached entry on failure. `cache-first` serves a hit without any
    /// fetch, otherwise fetches and populates. `network-only` never
    /// touches the store in either direction.
    pub async fn serve(
        &self,
        strategy: CacheStrategy,
        method: &str,
        url: &Url,
        upstream: &dyn Upstream,
    ) -> Result<CacheEntry, UpstreamError> {
        let key = url.as_str();
        match strategy {
            CacheStrategy::NetworkFirst => match upstream.fetch(method, url, None).await {
                Ok(response) => {
                    let entry = CacheEntry::from_response(&response);
                    self.store.put(key, entry.clone()).await;
                    Ok(entry)
                }
                Err(err) => {
                    debug!("network-first fetch failed for {}, trying cache: {}", key, err);
                    match self.store.lookup(key).await {
                        Some(entry) => Ok(entry),
                        None => Err(err),
                    }
                }
            },
            CacheStrategy::CacheFirst => {
                if let Some(entry) = self.store.lookup(key).await {
                    return Ok(entry);
                }
                let response = upstream.fetch(method, url, None).await?;
                let entry = CacheEntry::from_response(&response);
                self.store.put(key, entry.clone()).await;
                Ok(entry)
            }
            CacheStrategy::NetworkOnly => {
                let response = upstream.fetch(method, url, None).await?;
                Ok(CacheEntry::from_response(&response))
            }
        }
    }
}
