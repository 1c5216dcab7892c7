//! Scripted network and storage doubles for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use haven_core::{Error, Request, Response};

use crate::correlation::DurableStore;
use crate::fetch::Network;

/// Serves canned responses by URL, falling back to the URL without its query,
/// and records every request it sees.
///
/// Unknown URLs get a 404. While offline every request fails. A malformed
/// method is rejected the way [`crate::FetchClient`] rejects it.
#[derive(Default)]
pub(crate) struct MockNetwork {
    routes: Mutex<HashMap<String, Response>>,
    calls: Mutex<Vec<Request>>,
    offline: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MockNetwork {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(&self, url: &str, status: u16, body: &str) {
        self.respond_with(url, Response::new(url, status, body.to_string()));
    }

    pub(crate) fn respond_with(&self, url: &str, response: Response) {
        self.routes.lock().unwrap().insert(url.to_string(), response);
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn calls(&self) -> Vec<Request> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|r| r.url.as_str() == url).count()
    }
}

#[async_trait]
impl Network for MockNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        self.calls.lock().unwrap().push(request.clone());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if request.method.is_empty() || request.method.contains(char::is_whitespace) {
            return Err(Error::InvalidInput(format!("invalid method {}", request.method)));
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("offline: {}", request.url)));
        }

        let mut without_query = request.url.clone();
        without_query.set_query(None);

        let routes = self.routes.lock().unwrap();
        Ok(routes
            .get(request.url.as_str())
            .or_else(|| routes.get(without_query.as_str()))
            .cloned()
            .unwrap_or_else(|| Response::new(request.url.as_str(), 404, "not found")))
    }
}

/// A durable store that is never available, like storage in a locked-down
/// browsing context.
pub(crate) struct FailingStore;

#[async_trait]
impl DurableStore for FailingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Err(Error::StorageUnavailable(format!("cannot read {key}")))
    }

    async fn set(&self, key: &str, _value: &str) -> Result<(), Error> {
        Err(Error::StorageUnavailable(format!("cannot write {key}")))
    }
}

/// A store whose reads succeed but whose writes are rejected.
pub(crate) struct ReadOnlyStore {
    value: Option<String>,
}

impl ReadOnlyStore {
    pub(crate) fn new(value: &str) -> Self {
        Self { value: Some(value.to_string()) }
    }
}

#[async_trait]
impl DurableStore for ReadOnlyStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, Error> {
        Ok(self.value.clone())
    }

    async fn set(&self, key: &str, _value: &str) -> Result<(), Error> {
        Err(Error::StorageUnavailable(format!("quota exceeded writing {key}")))
    }
}
