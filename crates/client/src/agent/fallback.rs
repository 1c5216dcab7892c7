//! Offline fallback for failed navigations.
//!
//! Steps run strictly in order and the first hit wins:
//!
//! 1. the requested URL in any bucket
//! 2. the entry document in the precache bucket, by source URL
//! 3. the entry document's absolute URL in any bucket
//! 4. the offline document in the precache bucket, by source URL
//! 5. the offline document's absolute URL in any bucket
//!
//! A URL that cannot be built, or a lookup that fails, only skips its own step.

use serde::Serialize;

use haven_core::{BucketEntry, CacheDb, Error, Request, Response};

use super::scope::RegistrationScope;
use crate::fetch::origin_of;

/// Which lookup satisfied a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackStep {
    RuntimeCache,
    ShellByKey,
    ShellByUrl,
    OfflineByKey,
    OfflineByUrl,
}

impl FallbackStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackStep::RuntimeCache => "runtime-cache",
            FallbackStep::ShellByKey => "shell-by-key",
            FallbackStep::ShellByUrl => "shell-by-url",
            FallbackStep::OfflineByKey => "offline-by-key",
            FallbackStep::OfflineByUrl => "offline-by-url",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NavigationFallback {
    cache: CacheDb,
    entry_document: String,
    offline_document: String,
}

impl NavigationFallback {
    pub fn new(cache: CacheDb, entry_document: impl Into<String>, offline_document: impl Into<String>) -> Self {
        Self { cache, entry_document: entry_document.into(), offline_document: offline_document.into() }
    }

    /// Find something to show for a navigation the network could not serve.
    ///
    /// `precache_bucket` is the bucket of the version currently in control.
    ///
    /// # Errors
    ///
    /// - `Error::CrossOrigin` if the request is not on the scope's origin.
    ///   No lookup is attempted in that case.
    /// - `Error::NetworkError` when every step misses, or when the scope is
    ///   unusable and the origin cannot be checked.
    pub async fn resolve(
        &self, request: &Request, scope: &RegistrationScope, precache_bucket: Option<&str>,
    ) -> Result<(Response, FallbackStep), Error> {
        let scope_origin = match scope.origin() {
            Ok(origin) => origin,
            Err(e) => {
                tracing::error!("cannot verify request origin: {}", e);
                return Err(Error::NetworkError(format!("no usable registration scope for {}", request.url)));
            }
        };
        let request_origin = origin_of(&request.url);
        if request_origin != scope_origin {
            tracing::warn!(url = %request.url, scope = %scope_origin, "refusing fallback for foreign origin");
            return Err(Error::CrossOrigin { request: request_origin, scope: scope_origin });
        }

        let runtime = self.cache.match_any(&request.cache_key()).await;
        if let Some(hit) = or_miss(runtime, FallbackStep::RuntimeCache) {
            return Ok(hit_from(hit, FallbackStep::RuntimeCache, request));
        }

        let documents = [
            (self.entry_document.as_str(), FallbackStep::ShellByKey, FallbackStep::ShellByUrl),
            (self.offline_document.as_str(), FallbackStep::OfflineByKey, FallbackStep::OfflineByUrl),
        ];
        for (document, by_key, by_url) in documents {
            if let Some(hit) = or_miss(self.precached(scope, precache_bucket, document).await, by_key) {
                return Ok(hit_from(hit, by_key, request));
            }
            if let Some(hit) = or_miss(self.by_scope_url(scope, document).await, by_url) {
                return Ok(hit_from(hit, by_url, request));
            }
        }

        tracing::debug!(url = %request.url, "navigation fallback exhausted");
        Err(Error::NetworkError(format!("no cached response for {}", request.url)))
    }

    async fn precached(
        &self, scope: &RegistrationScope, bucket: Option<&str>, document: &str,
    ) -> Result<Option<BucketEntry>, Error> {
        let Some(bucket) = bucket else {
            return Ok(None);
        };
        match scope.resolve_absolute(document) {
            Ok(url) => self.cache.match_source(bucket, url.as_str()).await,
            Err(e) => {
                tracing::warn!(document, "could not build precache URL: {}", e);
                Ok(None)
            }
        }
    }

    async fn by_scope_url(&self, scope: &RegistrationScope, document: &str) -> Result<Option<BucketEntry>, Error> {
        match scope.resolve_url(document) {
            Ok(url) => self.cache.match_any(url.as_str()).await,
            Err(e) => {
                tracing::warn!(document, "could not build scope URL: {}", e);
                Ok(None)
            }
        }
    }
}

fn or_miss(lookup: Result<Option<BucketEntry>, Error>, step: FallbackStep) -> Option<BucketEntry> {
    lookup.unwrap_or_else(|e| {
        tracing::warn!(step = step.as_str(), "fallback lookup failed, skipping step: {}", e);
        None
    })
}

fn hit_from(entry: BucketEntry, step: FallbackStep, request: &Request) -> (Response, FallbackStep) {
    tracing::debug!(url = %request.url, bucket = %entry.bucket, step = step.as_str(), "navigation fallback hit");
    (entry.response, step)
}
