//! Shared state behind every tool call.

use std::sync::Arc;

use url::Url;

use haven_client::{ConnectivityCheck, CorrelationTagger, FetchClient, FetchConfig, Network, ServiceAgent};
use haven_core::{AppConfig, CacheDb, Error};

pub struct AppState {
    pub config: AppConfig,
    pub cache: CacheDb,
    pub agent: ServiceAgent,
    /// Present when a registration scope gives the page an origin.
    pub tagger: Option<CorrelationTagger>,
    pub connectivity: ConnectivityCheck,
}

impl AppState {
    /// Wire the agent and page-side utilities to one network and one store.
    pub fn new(config: AppConfig, cache: CacheDb, network: Arc<dyn Network>) -> Result<Self, Error> {
        let agent = ServiceAgent::new(&config, cache.clone(), network.clone())?;
        let tagger = match &config.registration_scope {
            Some(scope) => Some(CorrelationTagger::new(Arc::new(cache.clone()), Url::parse(scope)?)),
            None => None,
        };
        let connectivity = ConnectivityCheck::new(network, agent.scope().clone(), &config.routes.probe_marker);
        Ok(Self { config, cache, agent, tagger, connectivity })
    }

    /// Open storage from configuration and use the real network.
    pub async fn open(config: AppConfig) -> Result<Self, Error> {
        let cache = CacheDb::open(&config.db_path).await?;
        let network: Arc<dyn Network> = Arc::new(FetchClient::new(FetchConfig::from(&config))?);
        Self::new(config, cache, network)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use rmcp::model::CallToolResult;

    use haven_core::{Request, Response};

    use super::*;

    pub(crate) const SCOPE: &str = "https://example.com/app/";

    /// Fixed responses by URL; 404 for anything else.
    #[derive(Default)]
    pub(crate) struct StubNetwork {
        pages: Mutex<HashMap<String, Response>>,
        offline: AtomicBool,
    }

    impl StubNetwork {
        pub(crate) fn page(&self, url: &str, status: u16, body: &str) {
            self.pages.lock().unwrap().insert(url.to_string(), Response::new(url, status, body.to_string()));
        }

        pub(crate) fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Network for StubNetwork {
        async fn fetch(&self, request: &Request) -> Result<Response, Error> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(Error::Network("offline".into()));
            }
            let mut url = request.url.clone();
            url.set_query(None);
            let pages = self.pages.lock().unwrap();
            Ok(pages
                .get(url.as_str())
                .cloned()
                .unwrap_or_else(|| Response::new(request.url.as_str(), 404, "not found")))
        }
    }

    pub(crate) async fn state_with(config: AppConfig) -> (AppState, Arc<StubNetwork>) {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let network = Arc::new(StubNetwork::default());
        network.page("https://example.com/app/index.html", 200, "<html>shell</html>");
        network.page("https://example.com/app/offline.html", 200, "<html>offline</html>");
        (AppState::new(config, cache, network.clone()).unwrap(), network)
    }

    pub(crate) async fn state() -> (AppState, Arc<StubNetwork>) {
        state_with(AppConfig { registration_scope: Some(SCOPE.to_string()), ..AppConfig::default() }).await
    }

    /// Parse the JSON text of a tool result.
    pub(crate) fn output<T: serde::de::DeserializeOwned>(result: &CallToolResult) -> T {
        let content = serde_json::to_value(&result.content[0]).unwrap();
        let text = content.get("text").and_then(|v| v.as_str()).expect("Expected text field in content");
        serde_json::from_str(text).unwrap()
    }
}
