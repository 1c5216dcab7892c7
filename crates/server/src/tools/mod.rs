//! MCP tool implementations.
//!
//! This module contains all tools exposed by the haven server.

pub mod agent_fetch;
pub mod agent_status;
pub mod cache;

pub use agent_fetch::{AgentFetchParams, fetch_impl};
pub use agent_status::{AgentStatusParams, status_impl, update_impl};

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

use haven_core::Error;

/// Serialize `output` as the tool's pretty-printed JSON text.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
