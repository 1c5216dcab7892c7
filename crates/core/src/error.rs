//! Unified error types for haven.
//!
//! Every variant's display string starts with a stable code so callers (and the
//! MCP surface) can tell recoverable network failures from safety rejections.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the haven agent and its host.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., unknown destination).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// No cache entry found for the given key.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A stored snapshot could not be encoded or decoded.
    #[error("CACHE_ERROR: corrupt entry: {0}")]
    CorruptEntry(String),

    /// The durable key-value store could not be read or written.
    #[error("STORAGE_UNAVAILABLE: {0}")]
    StorageUnavailable(String),

    /// Network fetch did not complete in time.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// Transport-level failure while talking to the network.
    #[error("HTTP_ERROR: {0}")]
    Network(String),

    /// Request origin differs from the registration origin.
    #[error("CROSS_ORIGIN_REJECTED: {request} is not served under {scope}")]
    CrossOrigin { request: String, scope: String },

    /// Every strategy and fallback missed; the generic network error.
    #[error("NETWORK_ERROR: {0}")]
    NetworkError(String),

    /// Lifecycle event arrived in a state that cannot accept it.
    #[error("LIFECYCLE_ERROR: cannot {event} while {state}")]
    InvalidTransition { event: String, state: String },

    /// Build manifest could not be read or parsed.
    #[error("MANIFEST_ERROR: {0}")]
    Manifest(String),
}

impl Error {
    /// Whether the failure came from the network rather than from local state.
    ///
    /// Only these send a failed navigation to the offline fallback chain.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::FetchTimeout(_) | Error::FetchTooLarge(_) | Error::NetworkError(_)
        )
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidUrl(err.to_string())
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::InvalidUrl(msg) => (-32003, msg.clone()),
            Error::CacheMiss(msg) => (-32001, msg.clone()),
            Error::Database(e) => (-32002, e.to_string()),
            Error::MigrationFailed(msg) => (-32002, msg.clone()),
            Error::CorruptEntry(msg) => (-32002, msg.clone()),
            Error::StorageUnavailable(msg) => (-32013, msg.clone()),
            Error::FetchTimeout(msg) => (-32006, msg.clone()),
            Error::FetchTooLarge(msg) => (-32007, msg.clone()),
            Error::Network(msg) => (-32008, msg.clone()),
            Error::CrossOrigin { .. } => (-32004, err.to_string()),
            Error::NetworkError(msg) => (-32009, msg.clone()),
            Error::InvalidTransition { .. } => (-32010, err.to_string()),
            Error::Manifest(msg) => (-32011, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::CacheMiss("https://example.com/app/".to_string());
        assert!(err.to_string().contains("CACHE_MISS"));
        assert!(err.to_string().contains("https://example.com/app/"));
    }

    #[test]
    fn test_cross_origin_display() {
        let err = Error::CrossOrigin {
            request: "https://evil.example".to_string(),
            scope: "https://app.example".to_string(),
        };
        assert!(err.to_string().starts_with("CROSS_ORIGIN_REJECTED"));
    }

    #[test]
    fn test_is_network() {
        assert!(Error::Network("reset".into()).is_network());
        assert!(Error::FetchTimeout("2s".into()).is_network());
        assert!(!Error::InvalidUrl("x".into()).is_network());
        assert!(
            !Error::CrossOrigin { request: "a".into(), scope: "b".into() }.is_network()
        );
    }

    #[test]
    fn test_error_to_mcp_error() {
        let err = Error::CacheMiss("abc123".to_string());
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32001);

        let err = Error::InvalidTransition { event: "activate".into(), state: "installing".into() };
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32010);
    }
}
