//! Response cache in front of any network.
//!
//! Query responses are kept for a TTL, keyed by operation text and variables.
//! Mutations clear everything, uploads are never served from cache, and
//! responses carrying GraphQL errors are not stored.

use crate::error::FetchError;
use crate::fetch::{FetchOptions, Network, Uploadables};
use crate::operation::QueryDescriptor;
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tracing::debug;

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Maximum number of cached responses
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_capacity() -> usize {
    250
}

fn default_ttl_secs() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            capacity: default_capacity(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.capacity == 0 {
            return Err("cache capacity must be greater than zero".to_string());
        }
        if self.ttl_secs == 0 {
            return Err("cache ttl_secs must be greater than zero".to_string());
        }
        Ok(())
    }
}

struct CacheEntry {
    response: Value,
    stored_at: Instant,
}

/// Least-recently-used entries are evicted first once capacity is reached
struct ResponseCache {
    entries: LruCache<String, CacheEntry>,
}

impl ResponseCache {
    fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    fn get(&mut self, key: &str, ttl: Duration) -> Option<Value> {
        match self.entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < ttl => return Some(entry.response.clone()),
            Some(_) => {}
            None => return None,
        }
        self.entries.pop(key);
        None
    }

    fn set(&mut self, key: String, response: Value) {
        self.entries.put(
            key,
            CacheEntry {
                response,
                stored_at: Instant::now(),
            },
        );
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Wraps a network with a TTL response cache
pub struct CachedNetwork<N> {
    inner: N,
    config: CacheConfig,
    cache: Mutex<ResponseCache>,
}

impl<N: Network> CachedNetwork<N> {
    pub fn new(inner: N, config: CacheConfig) -> Self {
        Self {
            inner,
            cache: Mutex::new(ResponseCache::new(config.capacity)),
            config,
        }
    }

    pub fn inner(&self) -> &N {
        &self.inner
    }

    /// Number of stored entries (expired entries may still be counted)
    pub fn len(&self) -> usize {
        self.cache.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }
}

fn has_graphql_errors(response: &Value) -> bool {
    response
        .get("errors")
        .and_then(Value::as_array)
        .map(|errors| !errors.is_empty())
        .unwrap_or(false)
}

#[async_trait]
impl<N: Network> Network for CachedNetwork<N> {
    async fn fetch(
        &self,
        descriptor: &QueryDescriptor,
        options: FetchOptions,
        uploadables: Option<&Uploadables>,
    ) -> Result<Value, FetchError> {
        let cacheable = !descriptor.is_mutation() && uploadables.is_none();
        let key = descriptor.cache_key();

        if cacheable && !options.force {
            if let Some(hit) = self.cache.lock().get(&key, self.config.ttl()) {
                debug!(operation = %descriptor.name, "Response cache hit");
                return Ok(hit);
            }
        }

        let response = self.inner.fetch(descriptor, options, uploadables).await?;

        if descriptor.is_mutation() {
            debug!(operation = %descriptor.name, "Mutation clears response cache");
            self.cache.lock().clear();
        } else if cacheable && !has_graphql_errors(&response) {
            self.cache.lock().set(key, response.clone());
        }

        Ok(response)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
