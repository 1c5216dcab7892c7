//! Page-side reachability check.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use haven_core::Request;

use crate::agent::RegistrationScope;
use crate::fetch::Network;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Asks the network, never a cache, whether the origin is reachable.
pub struct ConnectivityCheck {
    network: Arc<dyn Network>,
    scope: RegistrationScope,
    probe_marker: String,
    timeout: Duration,
}

impl ConnectivityCheck {
    pub fn new(network: Arc<dyn Network>, scope: RegistrationScope, probe_marker: impl Into<String>) -> Self {
        Self { network, scope, probe_marker: probe_marker.into(), timeout: PROBE_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `HEAD` the probe path with a cache-busting query.
    ///
    /// Any error, timeout or non-2xx status counts as offline.
    pub async fn is_online(&self) -> bool {
        let mut url = match self.scope.resolve_absolute(&self.probe_marker) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("cannot build probe URL: {}", e);
                return false;
            }
        };
        url.set_query(Some(&format!("t={}", Utc::now().timestamp_millis())));

        let mut request = Request::get(url);
        request.method = "HEAD".to_string();
        request.headers.push(("Cache-Control".to_string(), "no-store".to_string()));

        match tokio::time::timeout(self.timeout, self.network.fetch(&request)).await {
            Ok(Ok(response)) => response.ok(),
            Ok(Err(e)) => {
                tracing::debug!("connectivity probe failed: {}", e);
                false
            }
            Err(_) => {
                tracing::debug!(timeout_ms = self.timeout.as_millis() as u64, "connectivity probe timed out");
                false
            }
        }
    }
}
