//! Lifecycle states and events of the interception agent.

use std::fmt;

use serde::Serialize;

use haven_core::Request;

use super::FetchOutcome;
use super::precache::{InstallReport, PrecacheManifest};

/// Lifecycle of one agent version.
///
/// `Idle` is the state before the first install. There is no redundant
/// state: a failed install returns to the state it started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Idle,
    Installing,
    Installed,
    Activating,
    Activated,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Installing => "installing",
            LifecycleState::Installed => "installed",
            LifecycleState::Activating => "activating",
            LifecycleState::Activated => "activated",
        }
    }

    /// Whether an install or activation is in flight.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, LifecycleState::Installing | LifecycleState::Activating)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum AgentEvent {
    Install(PrecacheManifest),
    Activate,
    Fetch(Request),
}

impl AgentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AgentEvent::Install(_) => "install",
            AgentEvent::Activate => "activate",
            AgentEvent::Fetch(_) => "fetch",
        }
    }
}

/// What activation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    pub generation: String,
    /// Outdated precache buckets that were removed.
    pub deleted_buckets: Vec<String>,
    /// Open pages are now controlled by this version.
    pub claimed: bool,
}

#[derive(Debug)]
pub enum EventOutcome {
    /// Install finished and, skipping the wait, the new version activated.
    Installed { install: InstallReport, activation: ActivationReport },
    Activated(ActivationReport),
    /// Activation requested for a version that is already active.
    AlreadyActive,
    Response(Box<FetchOutcome>),
}

/// The version currently serving requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ActiveVersion {
    pub(crate) generation: String,
    pub(crate) bucket: String,
}

/// Mutable lifecycle bookkeeping guarded by the agent.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    pub(crate) state: LifecycleState,
    /// Installed version waiting for activation.
    pub(crate) pending: Option<InstallReport>,
    pub(crate) active: Option<ActiveVersion>,
    pub(crate) claimed: bool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self { state: LifecycleState::Idle, pending: None, active: None, claimed: false }
    }
}
