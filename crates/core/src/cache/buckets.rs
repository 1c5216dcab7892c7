//! Bucket management.
//!
//! Buckets are created lazily the first time something is written to them and
//! live until they are deleted explicitly. Deleting a bucket cascades to every
//! entry it holds.

use super::connection::CacheDb;
use crate::Error;
use tokio_rusqlite::params;

impl CacheDb {
    /// Create the bucket if it does not exist yet.
    pub async fn open_bucket(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO cache_buckets (name, created_at) VALUES (?1, ?2)",
                    params![name, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    pub async fn has_bucket(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM cache_buckets WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Names of every bucket, oldest first.
    pub async fn bucket_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM cache_buckets ORDER BY created_at ASC, rowid ASC")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a bucket and all of its entries.
    ///
    /// Returns false if there was no such bucket.
    pub async fn delete_bucket(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM cache_buckets WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every bucket. The durable key-value store is left alone.
    ///
    /// Returns the number of buckets deleted.
    pub async fn clear_all_buckets(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let deleted = conn.execute("DELETE FROM cache_buckets", [])?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries currently stored in a bucket.
    pub async fn bucket_len(&self, name: &str) -> Result<u64, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM cache_entries WHERE bucket = ?1", params![name], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Response;

    #[tokio::test]
    async fn test_open_bucket_is_idempotent() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_bucket("html-cache").await.unwrap();
        db.open_bucket("html-cache").await.unwrap();

        assert!(db.has_bucket("html-cache").await.unwrap());
        assert_eq!(db.bucket_names().await.unwrap(), vec!["html-cache".to_string()]);
    }

    #[tokio::test]
    async fn test_bucket_names_in_creation_order() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_bucket("b").await.unwrap();
        db.open_bucket("a").await.unwrap();
        assert_eq!(db.bucket_names().await.unwrap(), vec!["b".to_string(), "a".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_bucket_cascades() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let res = Response::new("https://example.com/a.js", 200, "x");
        db.put_entry("static-resources", "https://example.com/a.js", "https://example.com/a.js", &res)
            .await
            .unwrap();
        assert_eq!(db.bucket_len("static-resources").await.unwrap(), 1);

        assert!(db.delete_bucket("static-resources").await.unwrap());
        assert!(!db.has_bucket("static-resources").await.unwrap());
        assert!(db.match_any("https://example.com/a.js").await.unwrap().is_none());
        assert!(!db.delete_bucket("static-resources").await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_all_buckets_keeps_store() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_bucket("image-cache").await.unwrap();
        db.open_bucket("font-cache").await.unwrap();
        db.kv_set("x-request-id", "abc").await.unwrap();

        assert_eq!(db.clear_all_buckets().await.unwrap(), 2);
        assert!(db.bucket_names().await.unwrap().is_empty());
        assert_eq!(db.kv_get("x-request-id").await.unwrap().as_deref(), Some("abc"));
    }
}
