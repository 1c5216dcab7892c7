//! Durable page-side key-value storage.

use async_trait::async_trait;

use haven_core::{CacheDb, Error};

/// Storage that outlives a single page session.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;

    async fn set(&self, key: &str, value: &str) -> Result<(), Error>;
}

#[async_trait]
impl DurableStore for CacheDb {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        self.kv_get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.kv_set(key, value).await
    }
}
