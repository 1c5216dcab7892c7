//! cache_purge tool implementation.
//!
//! Deletes one bucket, or every bucket when none is named. The durable
//! key-value store is left alone.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use haven_core::CacheDb;

use crate::tools::json_result;

/// Parameters for the cache_purge tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {
    /// Bucket to delete. Omit to delete all buckets.
    #[serde(default)]
    pub bucket: Option<String>,
}

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    /// Number of buckets deleted.
    pub deleted: u64,
}

/// Implementation of the cache_purge tool.
pub async fn purge_impl(cache: &CacheDb, params: CachePurgeParams) -> Result<CallToolResult, McpError> {
    let deleted = match &params.bucket {
        Some(bucket) => u64::from(cache.delete_bucket(bucket).await?),
        None => cache.clear_all_buckets().await?,
    };
    tracing::info!(bucket = ?params.bucket, deleted, "purged cache buckets");

    json_result(&CachePurgeOutput { deleted })
}
