//! cache_get tool implementation.
//!
//! Looks up a stored response by request URL.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use haven_core::{CacheDb, Error};

use crate::tools::json_result;

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// The cache key: the request URL, or the revisioned URL for precached assets.
    pub url: String,

    /// Restrict the lookup to one bucket. All buckets are searched otherwise.
    #[serde(default)]
    pub bucket: Option<String>,
}

/// Metadata of a stored entry. The body itself is not returned.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    pub bucket: String,
    pub url: String,
    pub source_url: String,
    pub status: u16,
    pub kind: String,
    pub content_type: Option<String>,
    pub body_bytes: usize,
    /// RFC 3339 write time.
    pub stored_at: String,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(cache: &CacheDb, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let entry = match &params.bucket {
        Some(bucket) => cache.match_entry(bucket, &params.url, None).await?,
        None => cache.match_any(&params.url).await?,
    }
    .ok_or_else(|| Error::CacheMiss(params.url.clone()))?;

    json_result(&CacheGetOutput {
        content_type: entry.response.content_type().map(str::to_string),
        body_bytes: entry.response.body.len(),
        status: entry.response.status,
        kind: entry.response.kind.to_string(),
        bucket: entry.bucket,
        url: entry.url,
        source_url: entry.source_url,
        stored_at: entry.stored_at.to_rfc3339(),
    })
}
