//! haven server entry point.
//!
//! Boots the offline agent from configuration, installs the build manifest if
//! one is configured, then serves MCP on stdio. Logging goes to stderr to avoid
//! interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

use haven_client::{AgentEvent, PrecacheManifest};
use haven_core::AppConfig;

mod error;
mod handler;
mod state;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    if config.registration_scope.is_none() {
        tracing::warn!("no registration scope configured, fallbacks will be rejected");
    }

    let state = Arc::new(state::AppState::open(config).await?);
    install_configured_manifest(&state).await;

    tracing::info!("Starting haven server on stdio transport");

    let handler = handler::HavenServer::new(state);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}

/// A failed startup install leaves fetches passing through; the server still runs.
async fn install_configured_manifest(state: &state::AppState) {
    let Some(path) = &state.config.manifest_path else {
        tracing::info!("no manifest configured, agent stays idle");
        return;
    };

    let manifest = match PrecacheManifest::load(path).await {
        Ok(manifest) => manifest,
        Err(e) => {
            tracing::error!(path = %path.display(), "cannot load manifest: {}", e);
            return;
        }
    };

    if let Err(e) = state.agent.dispatch(AgentEvent::Install(manifest)).await {
        tracing::error!("startup install failed: {}", e);
    }
}
