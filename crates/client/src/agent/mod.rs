//! The interception agent.
//!
//! [`ServiceAgent`] owns one registration scope and routes every event through
//! a single dispatch match. Fetches are classified, run through the strategy
//! bound to their class, and failed navigations fall back to cached documents.
//! Until a version has activated, fetches go straight to the network.

pub mod fallback;
pub mod lifecycle;
pub mod precache;
pub mod route;
pub mod scope;
pub mod strategy;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use haven_core::{AppConfig, CacheDb, Error, Request, Response};

use crate::fetch::Network;

pub use fallback::{FallbackStep, NavigationFallback};
pub use lifecycle::{ActivationReport, AgentEvent, EventOutcome, LifecycleState};
pub use precache::{InstallReport, ManifestEntry, PrecacheLoader, PrecacheManifest};
pub use route::{ResourceClass, RouteClassifier};
pub use scope::RegistrationScope;
pub use strategy::{ExpirationPolicy, RoutePolicy, Strategy, StrategyEngine, policy_for};

use lifecycle::{ActiveVersion, Lifecycle};

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    Fallback(FallbackStep),
    /// Not intercepted: denied routes and fetches before activation.
    Passthrough,
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseSource::Network => f.write_str("network"),
            ResponseSource::Cache => f.write_str("cache"),
            ResponseSource::Fallback(step) => write!(f, "fallback:{}", step.as_str()),
            ResponseSource::Passthrough => f.write_str("passthrough"),
        }
    }
}

impl Serialize for ResponseSource {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Result of handling one fetch event.
#[derive(Debug)]
pub struct FetchOutcome {
    pub response: Response,
    pub class: ResourceClass,
    pub source: ResponseSource,
    /// Background refresh, if the strategy started one.
    pub revalidation: Option<JoinHandle<()>>,
}

/// Snapshot of the agent's lifecycle for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentStatus {
    pub state: LifecycleState,
    /// Manifest generation of the version in control.
    pub version: Option<String>,
    pub claimed: bool,
    pub scope: Option<String>,
}

pub struct ServiceAgent {
    scope: RegistrationScope,
    classifier: RouteClassifier,
    engine: StrategyEngine,
    precache: PrecacheLoader,
    fallback: NavigationFallback,
    navigation_timeout: Duration,
    lifecycle: Mutex<Lifecycle>,
}

impl ServiceAgent {
    /// Build an agent from configuration.
    ///
    /// # Errors
    ///
    /// Fails if the route configuration does not compile.
    pub fn new(config: &AppConfig, cache: CacheDb, network: Arc<dyn Network>) -> Result<Self, Error> {
        let scope = match &config.registration_scope {
            Some(raw) => RegistrationScope::new(raw.clone()),
            None => RegistrationScope::absent(),
        };
        Ok(Self {
            scope,
            classifier: RouteClassifier::new(&config.routes)?,
            engine: StrategyEngine::new(cache.clone(), network.clone()),
            precache: PrecacheLoader::new(cache.clone(), network),
            fallback: NavigationFallback::new(cache, &config.entry_document, &config.offline_document),
            navigation_timeout: config.navigation_timeout(),
            lifecycle: Mutex::new(Lifecycle::default()),
        })
    }

    pub fn scope(&self) -> &RegistrationScope {
        &self.scope
    }

    pub fn classifier(&self) -> &RouteClassifier {
        &self.classifier
    }

    pub async fn status(&self) -> AgentStatus {
        let lifecycle = self.lifecycle.lock().await;
        AgentStatus {
            state: lifecycle.state,
            version: lifecycle.active.as_ref().map(|v| v.generation.clone()),
            claimed: lifecycle.claimed,
            scope: self.scope.raw().map(str::to_string),
        }
    }

    /// Route one event to its handler.
    pub async fn dispatch(&self, event: AgentEvent) -> Result<EventOutcome, Error> {
        tracing::debug!(event = event.name(), "dispatching agent event");
        match event {
            AgentEvent::Install(manifest) => self.install(&manifest).await,
            AgentEvent::Activate => self.activate().await,
            AgentEvent::Fetch(request) => Ok(EventOutcome::Response(Box::new(self.handle_fetch(&request).await?))),
        }
    }

    /// Precache `manifest`, then activate it without waiting for pages to close.
    async fn install(&self, manifest: &PrecacheManifest) -> Result<EventOutcome, Error> {
        let prior = {
            let mut lifecycle = self.lifecycle.lock().await;
            if lifecycle.state.is_transitioning() {
                return Err(Error::InvalidTransition { event: "install".into(), state: lifecycle.state.to_string() });
            }
            std::mem::replace(&mut lifecycle.state, LifecycleState::Installing)
        };
        tracing::info!(generation = %manifest.generation(), "installing");

        let install = match self.precache.install(manifest, &self.scope).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!("install failed, previous version stays in control: {}", e);
                self.lifecycle.lock().await.state = prior;
                return Err(e);
            }
        };

        // Straight to Activating: a concurrent Activate must never take this install.
        self.lifecycle.lock().await.state = LifecycleState::Activating;
        tracing::info!(generation = %install.generation, "installed, skipping wait");

        let activation = self.complete_activation(install.clone()).await?;
        Ok(EventOutcome::Installed { install, activation })
    }

    /// Activate a pending install left behind by a failed activation.
    async fn activate(&self) -> Result<EventOutcome, Error> {
        let pending = {
            let mut lifecycle = self.lifecycle.lock().await;
            match lifecycle.state {
                LifecycleState::Activated => return Ok(EventOutcome::AlreadyActive),
                LifecycleState::Installed => {}
                state => {
                    return Err(Error::InvalidTransition { event: "activate".into(), state: state.to_string() });
                }
            }
            let Some(pending) = lifecycle.pending.take() else {
                return Err(Error::InvalidTransition { event: "activate".into(), state: "installed".into() });
            };
            lifecycle.state = LifecycleState::Activating;
            pending
        };
        Ok(EventOutcome::Activated(self.complete_activation(pending).await?))
    }

    /// Remove outdated precaches and claim open pages. The state must already
    /// be `Activating`.
    async fn complete_activation(&self, pending: InstallReport) -> Result<ActivationReport, Error> {
        tracing::info!(generation = %pending.generation, "activating");

        let deleted_buckets = match self.precache.cleanup(&pending.bucket).await {
            Ok(deleted) => deleted,
            Err(e) => {
                let mut lifecycle = self.lifecycle.lock().await;
                lifecycle.state = LifecycleState::Installed;
                lifecycle.pending = Some(pending);
                return Err(e);
            }
        };

        let mut lifecycle = self.lifecycle.lock().await;
        lifecycle.active = Some(ActiveVersion { generation: pending.generation.clone(), bucket: pending.bucket });
        lifecycle.claimed = true;
        lifecycle.state = LifecycleState::Activated;
        tracing::info!(generation = %pending.generation, "activated and claimed open pages");

        Ok(ActivationReport { generation: pending.generation, deleted_buckets, claimed: true })
    }

    /// Serve one intercepted request.
    ///
    /// # Errors
    ///
    /// - `Error::CrossOrigin` for a failed navigation outside the scope's origin.
    /// - `Error::NetworkError` when a failed navigation has no cached fallback.
    /// - The network error itself for other classes with nothing cached.
    pub async fn handle_fetch(&self, request: &Request) -> Result<FetchOutcome, Error> {
        let class = self.classifier.classify(request);
        let active = self.lifecycle.lock().await.active.clone();

        let Some(active) = active else {
            tracing::debug!(url = %request.url, "no active version, passing through");
            return self.passthrough(request, class, ResponseSource::Passthrough).await;
        };

        let Some(policy) = policy_for(class, self.navigation_timeout) else {
            return self.passthrough(request, class, ResponseSource::Passthrough).await;
        };

        match self.engine.execute(&policy, request).await {
            Ok(resolution) => Ok(FetchOutcome {
                response: resolution.response,
                class,
                source: resolution.source,
                revalidation: resolution.revalidation,
            }),
            Err(e) if e.is_network() && class == ResourceClass::Document && request.is_navigation() => {
                tracing::debug!(url = %request.url, "navigation failed, trying fallbacks: {}", e);
                let (response, step) = self.fallback.resolve(request, &self.scope, Some(&active.bucket)).await?;
                Ok(FetchOutcome { response, class, source: ResponseSource::Fallback(step), revalidation: None })
            }
            Err(e) => Err(e),
        }
    }

    async fn passthrough(
        &self, request: &Request, class: ResourceClass, source: ResponseSource,
    ) -> Result<FetchOutcome, Error> {
        let response = self.engine.network().fetch(request).await?;
        Ok(FetchOutcome { response, class, source, revalidation: None })
    }
}
