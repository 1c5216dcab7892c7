//! agent_fetch tool implementation.
//!
//! Sends one request through the interception agent the way a page would:
//! same-origin requests are tagged with correlation ids first.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use haven_client::RequestOptions;
use haven_client::fetch::canonicalize;
use haven_core::{Destination, Error, Request, RequestMode};

use super::json_result;
use crate::state::AppState;

const PREVIEW_CHARS: usize = 512;

/// Input parameters for the agent_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AgentFetchParams {
    /// Absolute URL, or a path relative to the registration scope.
    pub url: String,

    /// Request destination: document, script, style, image, font, manifest or empty.
    #[serde(default = "default_destination")]
    pub destination: Destination,

    /// Treat the request as a top-level page navigation.
    #[serde(default)]
    pub navigate: bool,

    #[serde(default = "default_method")]
    pub method: String,
}

fn default_destination() -> Destination {
    Destination::Empty
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for the agent_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AgentFetchOutput {
    pub url: String,
    /// Resource class the request was routed as.
    pub class: String,
    /// network, cache, fallback:<step> or passthrough.
    pub source: String,
    pub status: u16,
    pub kind: String,
    pub content_type: Option<String>,
    pub body_bytes: usize,
    /// Start of the body, decoded lossily.
    pub body_preview: String,
    /// Session id sent with the request, if it was tagged.
    pub correlation_id: Option<String>,
}

/// Implementation of the agent_fetch tool.
pub async fn fetch_impl(state: &AppState, params: AgentFetchParams) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(Error::InvalidInput("url cannot be empty".into()).into());
    }

    let options = RequestOptions::new(params.method.to_ascii_uppercase());
    let mut request = match &state.tagger {
        Some(tagger) => tagger.prepare(&params.url, &options).await?,
        None => {
            let url = canonicalize(&params.url).map_err(Error::from)?;
            Request { method: options.method, ..Request::get(url) }
        }
    };

    if params.navigate {
        request.destination = Destination::Document;
        request.mode = RequestMode::Navigate;
    } else {
        request.destination = params.destination;
        if request.mode != RequestMode::SameOrigin && params.destination != Destination::Empty {
            request.mode = RequestMode::NoCors;
        }
    }

    let correlation_id = request.header(haven_client::correlation::CORRELATION_HEADER).map(str::to_string);
    let outcome = state.agent.handle_fetch(&request).await?;
    // A background revalidation keeps running after the handle is dropped.
    drop(outcome.revalidation);

    let response = outcome.response;
    let preview: String = String::from_utf8_lossy(&response.body).chars().take(PREVIEW_CHARS).collect();
    let output = AgentFetchOutput {
        url: request.url.to_string(),
        class: outcome.class.to_string(),
        source: outcome.source.to_string(),
        status: response.status,
        kind: response.kind.to_string(),
        content_type: response.content_type().map(str::to_string),
        body_bytes: response.body.len(),
        body_preview: preview,
        correlation_id,
    };

    tracing::debug!(url = %output.url, class = %output.class, source = %output.source, "agent_fetch served");
    json_result(&output)
}
