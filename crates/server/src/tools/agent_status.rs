//! agent_status and agent_update tool implementations.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use haven_client::{AgentEvent, EventOutcome, PrecacheManifest};
use haven_core::cache::hash::is_precache_bucket;

use super::json_result;
use crate::error::ServerError;
use crate::state::AppState;

/// Input parameters for the agent_status tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct AgentStatusParams {
    /// Also probe the network for reachability.
    #[serde(default)]
    pub check_connectivity: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AgentStatusOutput {
    /// idle, installing, installed, activating or activated.
    pub state: String,
    /// Manifest generation of the version in control.
    pub version: Option<String>,
    pub claimed: bool,
    pub scope: Option<String>,
    pub buckets: Vec<String>,
    pub precache_buckets: usize,
    pub online: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AgentUpdateOutput {
    pub generation: String,
    pub fetched: usize,
    pub reused: usize,
    pub skipped: usize,
    /// Assets left to runtime caching.
    pub failed: Vec<String>,
    pub deleted_buckets: Vec<String>,
    pub claimed: bool,
}

/// Implementation of the agent_status tool.
pub async fn status_impl(state: &AppState, params: AgentStatusParams) -> Result<CallToolResult, McpError> {
    let status = state.agent.status().await;
    let buckets = state.cache.bucket_names().await?;
    let online = if params.check_connectivity { Some(state.connectivity.is_online().await) } else { None };

    json_result(&AgentStatusOutput {
        state: status.state.to_string(),
        version: status.version,
        claimed: status.claimed,
        scope: status.scope,
        precache_buckets: buckets.iter().filter(|b| is_precache_bucket(b)).count(),
        buckets,
        online,
    })
}

/// Implementation of the agent_update tool: install and activate the configured manifest.
pub async fn update_impl(state: &AppState) -> Result<CallToolResult, McpError> {
    let path = state
        .config
        .manifest_path
        .as_ref()
        .ok_or_else(|| ServerError::NotConfigured("manifest_path is not set (HAVEN_MANIFEST_PATH)".into()))?;
    let manifest = PrecacheManifest::load(path).await?;

    match state.agent.dispatch(AgentEvent::Install(manifest)).await? {
        EventOutcome::Installed { install, activation } => json_result(&AgentUpdateOutput {
            generation: install.generation,
            fetched: install.fetched,
            reused: install.reused,
            skipped: install.skipped,
            failed: install.failed,
            deleted_buckets: activation.deleted_buckets,
            claimed: activation.claimed,
        }),
        other => Err(haven_core::Error::InvalidInput(format!("unexpected install outcome: {other:?}")).into()),
    }
}
