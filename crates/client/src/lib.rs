//! Client side of haven.
//!
//! This crate provides the network resiliency layer: the `Network` seam and its
//! reqwest implementation, the interception agent with its routing, caching
//! strategies, offline fallbacks and lifecycle, and the page-side request
//! correlation and connectivity utilities.

pub mod agent;
pub mod connectivity;
pub mod correlation;
pub mod fetch;

#[cfg(test)]
pub(crate) mod test_support;

pub use agent::{
    AgentEvent, AgentStatus, EventOutcome, FallbackStep, FetchOutcome, InstallReport, LifecycleState, PrecacheManifest,
    RegistrationScope, ResourceClass, ResponseSource, RouteClassifier, ServiceAgent,
};
pub use connectivity::ConnectivityCheck;
pub use correlation::{CorrelationTagger, DurableStore, RequestOptions};
pub use fetch::{FetchClient, FetchConfig, Network};
