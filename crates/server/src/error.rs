//! Host-level errors for the haven server.
//!
//! Agent and storage failures already carry codes through `haven_core::Error`;
//! these cover what only the host can get wrong.

use rmcp::model::{ErrorCode, ErrorData as McpError};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// An operation needs a setting that was not provided.
    #[error("NOT_CONFIGURED: {0}")]
    NotConfigured(String),
}

impl From<ServerError> for McpError {
    fn from(err: ServerError) -> Self {
        let code = match &err {
            ServerError::NotConfigured(_) => -32012,
        };
        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}
