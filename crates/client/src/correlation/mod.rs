//! Request correlation for page-originated fetches.
//!
//! A session id is created on first use, persisted in the durable store and
//! sent with every same-origin request together with a fresh per-call id.
//! Cross-origin requests are never tagged so the id does not leak to third
//! parties.

mod store;

pub use store::DurableStore;

use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use url::Url;
use uuid::Uuid;

use haven_core::{Destination, Error, Request, RequestMode, Response};

use crate::fetch::{Network, same_origin};

/// Durable store key holding the session id.
pub const SESSION_KEY: &str = "x-request-id";

pub const CORRELATION_HEADER: &str = "X-Correlation-ID";
/// Alias of [`CORRELATION_HEADER`] for backends that expect it.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";
pub const CALL_ID_HEADER: &str = "X-Call-ID";

/// Options for a page-issued request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self { method: "GET".to_string(), headers: Vec::new(), body: None }
    }
}

impl RequestOptions {
    pub fn new(method: impl Into<String>) -> Self {
        Self { method: method.into(), ..Self::default() }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    /// Replace any header with the same name, ignoring case.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Holds the session id for one page origin.
pub struct CorrelationTagger {
    store: Arc<dyn DurableStore>,
    page: Url,
    /// Set whenever the durable store could not be read or written; it then
    /// holds the authoritative id for this process.
    ephemeral: Mutex<Option<String>>,
}

impl CorrelationTagger {
    pub fn new(store: Arc<dyn DurableStore>, page: Url) -> Self {
        Self { store, page, ephemeral: Mutex::new(None) }
    }

    /// The current session id, created and persisted on first use.
    ///
    /// Never fails: when the store cannot be used an in-memory id is returned.
    pub async fn get_session_id(&self) -> String {
        if let Some(id) = self.ephemeral_id() {
            return id;
        }
        match self.store.get(SESSION_KEY).await {
            Ok(Some(id)) if !id.is_empty() => id,
            Ok(_) => {
                let id = new_id();
                match self.store.set(SESSION_KEY, &id).await {
                    Ok(()) => id,
                    Err(e) => {
                        tracing::warn!("session id not persisted: {}", e);
                        self.ephemeral_or(id)
                    }
                }
            }
            Err(e) => {
                tracing::warn!("durable store unavailable, using ephemeral session id: {}", e);
                self.ephemeral_or(new_id())
            }
        }
    }

    /// Start a new session and return its id.
    pub async fn reset_session_id(&self) -> String {
        let id = new_id();
        let persisted = match self.store.set(SESSION_KEY, &id).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("reset session id not persisted: {}", e);
                false
            }
        };
        // The stored value is stale when the write failed.
        *self.ephemeral.lock().unwrap_or_else(PoisonError::into_inner) = (!persisted).then(|| id.clone());
        id
    }

    fn ephemeral_id(&self) -> Option<String> {
        self.ephemeral.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn ephemeral_or(&self, candidate: String) -> String {
        self.ephemeral
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(candidate)
            .clone()
    }

    /// Copy of `options` carrying the session id under both correlation headers.
    pub async fn with_correlation_headers(&self, options: &RequestOptions) -> RequestOptions {
        let id = self.get_session_id().await;
        let mut tagged = options.clone();
        tagged.set_header(CORRELATION_HEADER, id.clone());
        tagged.set_header(REQUEST_ID_HEADER, id);
        tagged
    }

    /// Build the request a page would send for `target`.
    ///
    /// `target` may be relative to the page. Only same-origin targets are
    /// tagged, each with a fresh call id.
    pub async fn prepare(&self, target: &str, options: &RequestOptions) -> Result<Request, Error> {
        let url = self.page.join(target)?;
        let same = same_origin(&url, &self.page);

        let options = if same {
            let mut tagged = self.with_correlation_headers(options).await;
            tagged.set_header(CALL_ID_HEADER, new_id());
            tagged
        } else {
            tracing::debug!(url = %url, "cross-origin target, not tagging");
            options.clone()
        };

        Ok(Request {
            method: options.method,
            url,
            destination: Destination::Empty,
            mode: if same { RequestMode::SameOrigin } else { RequestMode::Cors },
            headers: options.headers,
            body: options.body,
        })
    }

    pub async fn fetch_with_correlation(
        &self, target: &str, options: &RequestOptions, network: &dyn Network,
    ) -> Result<Response, Error> {
        let request = self.prepare(target, options).await?;
        network.fetch(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FailingStore, MockNetwork, ReadOnlyStore};
    use haven_core::CacheDb;

    async fn tagger() -> (CorrelationTagger, CacheDb) {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let tagger = CorrelationTagger::new(Arc::new(cache.clone()), "https://example.com/app/".parse().unwrap());
        (tagger, cache)
    }

    #[tokio::test]
    async fn test_session_id_is_stable() {
        let (tagger, cache) = tagger().await;
        let first = tagger.get_session_id().await;
        let second = tagger.get_session_id().await;
        assert_eq!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());
        assert_eq!(cache.kv_get(SESSION_KEY).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_session_id_survives_new_tagger() {
        let (tagger, cache) = tagger().await;
        let id = tagger.get_session_id().await;
        let reopened = CorrelationTagger::new(Arc::new(cache), "https://example.com/".parse().unwrap());
        assert_eq!(reopened.get_session_id().await, id);
    }

    #[tokio::test]
    async fn test_reset_session_id() {
        let (tagger, _) = tagger().await;
        let before = tagger.get_session_id().await;
        let reset = tagger.reset_session_id().await;
        assert_ne!(before, reset);
        assert_eq!(tagger.get_session_id().await, reset);
    }

    #[tokio::test]
    async fn test_unavailable_store_falls_back_to_ephemeral() {
        let tagger = CorrelationTagger::new(Arc::new(FailingStore), "https://example.com/".parse().unwrap());
        let first = tagger.get_session_id().await;
        assert!(Uuid::parse_str(&first).is_ok());
        assert_eq!(tagger.get_session_id().await, first);

        let reset = tagger.reset_session_id().await;
        assert_ne!(reset, first);
        assert_eq!(tagger.get_session_id().await, reset);
    }

    #[tokio::test]
    async fn test_reset_wins_over_unwritable_store() {
        let store = Arc::new(ReadOnlyStore::new("old-session"));
        let tagger = CorrelationTagger::new(store, "https://example.com/".parse().unwrap());
        assert_eq!(tagger.get_session_id().await, "old-session");

        let reset = tagger.reset_session_id().await;
        assert_ne!(reset, "old-session");
        assert_eq!(tagger.get_session_id().await, reset);
        assert_eq!(tagger.get_session_id().await, reset);
    }

    #[tokio::test]
    async fn test_reset_after_successful_write_reads_store() {
        let (tagger, cache) = tagger().await;
        let reset = tagger.reset_session_id().await;
        cache.kv_set(SESSION_KEY, "set-by-another-tab").await.unwrap();
        assert_ne!(tagger.get_session_id().await, reset);
    }

    #[tokio::test]
    async fn test_with_correlation_headers_keeps_options() {
        let (tagger, _) = tagger().await;
        let options = RequestOptions::new("POST").with_header("Content-Type", "application/json");

        let tagged = tagger.with_correlation_headers(&options).await;
        assert_eq!(tagged.method, "POST");
        assert_eq!(tagged.header("content-type"), Some("application/json"));
        let correlation = tagged.header(CORRELATION_HEADER).unwrap();
        assert_eq!(tagged.header(REQUEST_ID_HEADER), Some(correlation));
        assert_eq!(options.headers.len(), 1);
    }

    #[tokio::test]
    async fn test_with_correlation_headers_replaces_stale_ids() {
        let (tagger, _) = tagger().await;
        let options = RequestOptions::default().with_header("x-correlation-id", "stale");
        let tagged = tagger.with_correlation_headers(&options).await;
        assert_eq!(tagged.headers.iter().filter(|(k, _)| k.eq_ignore_ascii_case(CORRELATION_HEADER)).count(), 1);
        assert_ne!(tagged.header(CORRELATION_HEADER), Some("stale"));
    }

    #[tokio::test]
    async fn test_fetch_with_correlation_same_origin() {
        let (tagger, _) = tagger().await;
        let network = MockNetwork::new();
        network.respond("https://example.com/api/rates", 200, "{}");

        let res = tagger.fetch_with_correlation("/api/rates", &RequestOptions::default(), &network).await.unwrap();
        assert_eq!(res.status, 200);
        tagger.fetch_with_correlation("/api/rates", &RequestOptions::default(), &network).await.unwrap();

        let calls = network.calls();
        let session = tagger.get_session_id().await;
        assert_eq!(calls[0].header(CORRELATION_HEADER), Some(session.as_str()));
        assert_eq!(calls[0].header(REQUEST_ID_HEADER), Some(session.as_str()));
        assert_eq!(calls[0].mode, RequestMode::SameOrigin);
        assert_ne!(calls[0].header(CALL_ID_HEADER), calls[1].header(CALL_ID_HEADER));
    }

    #[tokio::test]
    async fn test_fetch_with_correlation_cross_origin_untouched() {
        let (tagger, _) = tagger().await;
        let network = MockNetwork::new();
        let options = RequestOptions::default().with_header("Accept", "application/json");

        tagger
            .fetch_with_correlation("https://cdn.jsdelivr.net/gh/o/r/latest.json", &options, &network)
            .await
            .unwrap();

        let call = &network.calls()[0];
        assert_eq!(call.headers, options.headers);
        assert!(call.header(CORRELATION_HEADER).is_none());
        assert!(call.header(CALL_ID_HEADER).is_none());
    }
}
