//! Caching strategies and the per-class policy table.
//!
//! | Class | Strategy | Bucket | Max entries | Max age |
//! |---|---|---|---|---|
//! | document | network-first (timeout) | `html-cache` | 20 | 7 days |
//! | script-or-style | cache-first | `static-resources` | 60 | 30 days |
//! | image | cache-first | `image-cache` | 150 | 90 days |
//! | font | cache-first | `font-cache` | 30 | 1 year |
//! | first-party-feed | cache-first | `history-feed-primary` | 180 | 1 year |
//! | cross-origin-feed-b | cache-first | `history-feed-mirror` | 180 | 1 year |
//! | cross-origin-feed-a | stale-while-revalidate | `latest-feed` | 1 | 7 days |
//! | manifest-or-text | stale-while-revalidate | `text-assets` | 10 | 7 days |
//! | connectivity-probe | network-only | none | | |
//!
//! Denied requests have no policy at all.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use haven_core::{CacheDb, Error, Request, Response, ResponseKind};

use super::ResponseSource;
use super::route::ResourceClass;
use crate::fetch::Network;

const DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Try the network for at most `timeout`, then fall back to the bucket.
    NetworkFirst { timeout: Duration },
    CacheFirst,
    /// Serve the bucket immediately and refresh it in the background.
    StaleWhileRevalidate,
    /// Always the network; no bucket is read or written.
    NetworkOnly,
}

/// Bucket bounds. Either limit may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExpirationPolicy {
    pub max_entries: Option<usize>,
    pub max_age: Option<Duration>,
}

impl ExpirationPolicy {
    pub const fn new(max_entries: usize, max_age_secs: u64) -> Self {
        Self { max_entries: Some(max_entries), max_age: Some(Duration::from_secs(max_age_secs)) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutePolicy {
    pub strategy: Strategy,
    /// `None` only for [`Strategy::NetworkOnly`].
    pub bucket: Option<&'static str>,
    pub expiration: ExpirationPolicy,
}

/// A bucket together with its bounds, as used by the caching strategies.
#[derive(Debug, Clone, Copy)]
struct Bucket {
    name: &'static str,
    expiration: ExpirationPolicy,
}

/// Bucket names owned by the runtime strategies.
pub const RUNTIME_BUCKETS: &[&str] = &[
    "html-cache",
    "static-resources",
    "image-cache",
    "font-cache",
    "history-feed-primary",
    "history-feed-mirror",
    "latest-feed",
    "text-assets",
];

/// The policy bound to a class, or `None` for requests left to the network untouched.
pub fn policy_for(class: ResourceClass, navigation_timeout: Duration) -> Option<RoutePolicy> {
    let (strategy, bucket, expiration) = match class {
        ResourceClass::Document => (
            Strategy::NetworkFirst { timeout: navigation_timeout },
            "html-cache",
            ExpirationPolicy::new(20, 7 * DAY),
        ),
        ResourceClass::ScriptOrStyle => (Strategy::CacheFirst, "static-resources", ExpirationPolicy::new(60, 30 * DAY)),
        ResourceClass::Image => (Strategy::CacheFirst, "image-cache", ExpirationPolicy::new(150, 90 * DAY)),
        ResourceClass::Font => (Strategy::CacheFirst, "font-cache", ExpirationPolicy::new(30, 365 * DAY)),
        ResourceClass::FirstPartyFeed => {
            (Strategy::CacheFirst, "history-feed-primary", ExpirationPolicy::new(180, 365 * DAY))
        }
        ResourceClass::CrossOriginFeedB => {
            (Strategy::CacheFirst, "history-feed-mirror", ExpirationPolicy::new(180, 365 * DAY))
        }
        ResourceClass::CrossOriginFeedA => {
            (Strategy::StaleWhileRevalidate, "latest-feed", ExpirationPolicy::new(1, 7 * DAY))
        }
        ResourceClass::ManifestOrText => {
            (Strategy::StaleWhileRevalidate, "text-assets", ExpirationPolicy::new(10, 7 * DAY))
        }
        ResourceClass::ConnectivityProbe => {
            return Some(RoutePolicy {
                strategy: Strategy::NetworkOnly,
                bucket: None,
                expiration: ExpirationPolicy::default(),
            });
        }
        ResourceClass::Denied => return None,
    };
    Some(RoutePolicy { strategy, bucket: Some(bucket), expiration })
}

/// Only complete `200` responses and opaque cross-origin responses are stored.
pub fn is_cacheable(response: &Response) -> bool {
    response.status == 200 || response.kind == ResponseKind::Opaque
}

/// A response produced by a strategy.
#[derive(Debug)]
pub struct Resolution {
    pub response: Response,
    pub source: ResponseSource,
    /// Background refresh started by stale-while-revalidate.
    pub revalidation: Option<JoinHandle<()>>,
}

impl Resolution {
    fn network(response: Response) -> Self {
        Self { response, source: ResponseSource::Network, revalidation: None }
    }

    fn cache(response: Response) -> Self {
        Self { response, source: ResponseSource::Cache, revalidation: None }
    }
}

/// Runs strategies against the shared buckets and the network.
#[derive(Clone)]
pub struct StrategyEngine {
    cache: CacheDb,
    network: Arc<dyn Network>,
}

impl StrategyEngine {
    pub fn new(cache: CacheDb, network: Arc<dyn Network>) -> Self {
        Self { cache, network }
    }

    pub fn network(&self) -> &Arc<dyn Network> {
        &self.network
    }

    /// Execute `policy` for `request`.
    ///
    /// # Errors
    ///
    /// Returns the network error when the network failed and the bucket had
    /// nothing to offer, and `Error::InvalidInput` for a caching strategy
    /// without a bucket.
    pub async fn execute(&self, policy: &RoutePolicy, request: &Request) -> Result<Resolution, Error> {
        let bucket = policy.bucket.map(|name| Bucket { name, expiration: policy.expiration });
        match (policy.strategy, bucket) {
            (Strategy::NetworkOnly, _) => Ok(Resolution::network(self.network.fetch(request).await?)),
            (Strategy::NetworkFirst { timeout }, Some(bucket)) => self.network_first(bucket, request, timeout).await,
            (Strategy::CacheFirst, Some(bucket)) => self.cache_first(bucket, request).await,
            (Strategy::StaleWhileRevalidate, Some(bucket)) => self.stale_while_revalidate(bucket, request).await,
            (strategy, None) => Err(Error::InvalidInput(format!("{strategy:?} needs a cache bucket"))),
        }
    }

    async fn network_first(&self, bucket: Bucket, request: &Request, timeout: Duration) -> Result<Resolution, Error> {
        let err = match tokio::time::timeout(timeout, self.fetch_and_store(bucket, request)).await {
            Ok(Ok(response)) => return Ok(Resolution::network(response)),
            Ok(Err(e)) => e,
            Err(_) => Error::FetchTimeout(format!("{} after {}ms", request.url, timeout.as_millis())),
        };

        tracing::debug!(url = %request.url, bucket = bucket.name, "network-first falling back to cache: {}", err);
        match self.lookup(bucket, request).await {
            Some(cached) => Ok(Resolution::cache(cached)),
            None => Err(err),
        }
    }

    async fn cache_first(&self, bucket: Bucket, request: &Request) -> Result<Resolution, Error> {
        if let Some(cached) = self.lookup(bucket, request).await {
            tracing::debug!(url = %request.url, bucket = bucket.name, "cache hit");
            return Ok(Resolution::cache(cached));
        }
        tracing::debug!(url = %request.url, bucket = bucket.name, "cache miss");
        Ok(Resolution::network(self.fetch_and_store(bucket, request).await?))
    }

    async fn stale_while_revalidate(&self, bucket: Bucket, request: &Request) -> Result<Resolution, Error> {
        match self.lookup(bucket, request).await {
            Some(cached) => {
                let revalidation = self.spawn_revalidation(bucket, request.clone());
                Ok(Resolution { response: cached, source: ResponseSource::Cache, revalidation: Some(revalidation) })
            }
            None => Ok(Resolution::network(self.fetch_and_store(bucket, request).await?)),
        }
    }

    /// Fire-and-forget refresh. This is the only place a strategy error is dropped.
    fn spawn_revalidation(&self, bucket: Bucket, request: Request) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.fetch_and_store(bucket, &request).await {
                tracing::debug!(url = %request.url, bucket = bucket.name, "background revalidation failed: {}", e);
            }
        })
    }

    async fn lookup(&self, bucket: Bucket, request: &Request) -> Option<Response> {
        let key = request.cache_key();
        match self.cache.match_entry(bucket.name, &key, bucket.expiration.max_age).await {
            Ok(entry) => entry.map(|e| e.response),
            Err(e) => {
                tracing::warn!(url = %key, bucket = bucket.name, "cache lookup failed, treating as miss: {}", e);
                None
            }
        }
    }

    async fn fetch_and_store(&self, bucket: Bucket, request: &Request) -> Result<Response, Error> {
        let response = self.network.fetch(request).await?;
        if is_cacheable(&response) {
            if let Err(e) = self.store(bucket, request, &response).await {
                tracing::warn!(url = %request.url, bucket = bucket.name, "cache write failed: {}", e);
            }
        } else {
            tracing::debug!(url = %request.url, status = response.status, "response not cacheable");
        }
        Ok(response)
    }

    async fn store(&self, bucket: Bucket, request: &Request, response: &Response) -> Result<(), Error> {
        let key = request.cache_key();
        self.cache.put_entry(bucket.name, &key, &key, response).await?;
        if let Some(max_entries) = bucket.expiration.max_entries {
            let evicted = self.cache.evict_lru(bucket.name, max_entries).await?;
            if evicted > 0 {
                tracing::debug!(bucket = bucket.name, evicted, "evicted least recently used entries");
            }
        }
        if let Some(max_age) = bucket.expiration.max_age {
            let expired = self.cache.purge_expired(bucket.name, max_age).await?;
            if expired > 0 {
                tracing::debug!(bucket = bucket.name, expired, "purged expired entries");
            }
        }
        Ok(())
    }
}
