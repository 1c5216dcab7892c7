//! Cache entry operations.
//!
//! An entry is a full response snapshot stored under a request URL inside one
//! bucket. Writes always replace the whole entry. Every write and every hit
//! takes the next value of a global access sequence, which gives an exact
//! least-recently-used order for eviction.

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};

use super::connection::CacheDb;
use crate::{Error, Response};

/// A stored response snapshot and where it lives.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketEntry {
    pub bucket: String,
    /// Lookup key (request URL, or revisioned URL for precached assets).
    pub url: String,
    /// The URL the snapshot was fetched from, without any revision marker.
    pub source_url: String,
    pub response: Response,
    pub stored_at: DateTime<Utc>,
}

impl BucketEntry {
    /// Age of the entry relative to `now`.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.stored_at).to_std().unwrap_or_default()
    }
}

/// Row as read from SQLite, decoded outside the connection thread.
struct RawEntry {
    bucket: String,
    url: String,
    source_url: String,
    status: i64,
    kind: String,
    headers_json: String,
    body: Vec<u8>,
    stored_at_ms: i64,
}

const ENTRY_COLUMNS: &str = "bucket, url, source_url, status, kind, headers_json, body, stored_at_ms";

fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok(RawEntry {
        bucket: row.get(0)?,
        url: row.get(1)?,
        source_url: row.get(2)?,
        status: row.get(3)?,
        kind: row.get(4)?,
        headers_json: row.get(5)?,
        body: row.get(6)?,
        stored_at_ms: row.get(7)?,
    })
}

impl TryFrom<RawEntry> for BucketEntry {
    type Error = Error;

    fn try_from(raw: RawEntry) -> Result<Self, Self::Error> {
        let headers: Vec<(String, String)> =
            serde_json::from_str(&raw.headers_json).map_err(|e| Error::CorruptEntry(e.to_string()))?;
        let status = u16::try_from(raw.status).map_err(|e| Error::CorruptEntry(e.to_string()))?;
        let stored_at = Utc
            .timestamp_millis_opt(raw.stored_at_ms)
            .single()
            .ok_or_else(|| Error::CorruptEntry(format!("bad timestamp {}", raw.stored_at_ms)))?;

        Ok(BucketEntry {
            bucket: raw.bucket,
            url: raw.url.clone(),
            source_url: raw.source_url,
            response: Response {
                url: raw.url,
                status,
                kind: raw.kind.parse()?,
                headers,
                body: Bytes::from(raw.body),
            },
            stored_at,
        })
    }
}

fn is_expired(stored_at_ms: i64, max_age: Option<Duration>, now: DateTime<Utc>) -> bool {
    match max_age {
        Some(max_age) => now.timestamp_millis() - stored_at_ms > max_age.as_millis() as i64,
        None => false,
    }
}

impl CacheDb {
    /// Store a response under `key`, replacing any prior entry.
    ///
    /// The bucket is created on first use.
    pub async fn put_entry(&self, bucket: &str, key: &str, source_url: &str, response: &Response) -> Result<(), Error> {
        self.put_entry_at(bucket, key, source_url, response, Utc::now()).await
    }

    /// Store a response with an explicit insertion time.
    pub async fn put_entry_at(
        &self, bucket: &str, key: &str, source_url: &str, response: &Response, stored_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        let source_url = source_url.to_string();
        let status = i64::from(response.status);
        let kind = response.kind.as_str();
        let headers_json =
            serde_json::to_string(&response.headers).map_err(|e| Error::CorruptEntry(e.to_string()))?;
        let body = response.body.to_vec();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO cache_buckets (name, created_at) VALUES (?1, ?2)",
                    params![bucket, Utc::now().to_rfc3339()],
                )?;
                tx.execute(
                    "INSERT INTO cache_entries (
                        bucket, url, source_url, status, kind, headers_json, body,
                        stored_at, stored_at_ms, access_seq
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9,
                        (SELECT COALESCE(MAX(access_seq), 0) + 1 FROM cache_entries))
                    ON CONFLICT(bucket, url) DO UPDATE SET
                        source_url = excluded.source_url,
                        status = excluded.status,
                        kind = excluded.kind,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        stored_at = excluded.stored_at,
                        stored_at_ms = excluded.stored_at_ms,
                        access_seq = excluded.access_seq",
                    params![
                        bucket,
                        key,
                        source_url,
                        status,
                        kind,
                        headers_json,
                        body,
                        stored_at.to_rfc3339(),
                        stored_at.timestamp_millis(),
                    ],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Look up `key` in one bucket.
    ///
    /// Entries older than `max_age` are treated as absent and removed. A hit
    /// counts as a use for LRU purposes.
    pub async fn match_entry(
        &self, bucket: &str, key: &str, max_age: Option<Duration>,
    ) -> Result<Option<BucketEntry>, Error> {
        self.match_entry_at(bucket, key, max_age, Utc::now()).await
    }

    async fn match_entry_at(
        &self, bucket: &str, key: &str, max_age: Option<Duration>, now: DateTime<Utc>,
    ) -> Result<Option<BucketEntry>, Error> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        let raw = self
            .conn
            .call(move |conn| -> Result<Option<RawEntry>, Error> {
                let raw = conn
                    .query_row(
                        &format!("SELECT {ENTRY_COLUMNS} FROM cache_entries WHERE bucket = ?1 AND url = ?2"),
                        params![bucket, key],
                        read_raw,
                    )
                    .optional()?;

                let Some(raw) = raw else {
                    return Ok(None);
                };

                if is_expired(raw.stored_at_ms, max_age, now) {
                    conn.execute("DELETE FROM cache_entries WHERE bucket = ?1 AND url = ?2", params![bucket, key])?;
                    return Ok(None);
                }

                conn.execute(
                    "UPDATE cache_entries
                    SET access_seq = (SELECT COALESCE(MAX(access_seq), 0) + 1 FROM cache_entries)
                    WHERE bucket = ?1 AND url = ?2",
                    params![bucket, key],
                )?;
                Ok(Some(raw))
            })
            .await
            .map_err(Error::from)?;

        raw.map(BucketEntry::try_from).transpose()
    }

    /// Look up `key` across every bucket, oldest bucket first.
    ///
    /// Like a page-level cache match this ignores expiration policies.
    pub async fn match_any(&self, key: &str) -> Result<Option<BucketEntry>, Error> {
        let key = key.to_string();
        let raw = self
            .conn
            .call(move |conn| -> Result<Option<RawEntry>, Error> {
                let raw = conn
                    .query_row(
                        "SELECT e.bucket, e.url, e.source_url, e.status, e.kind, e.headers_json, e.body, e.stored_at_ms
                        FROM cache_entries e JOIN cache_buckets b ON b.name = e.bucket
                        WHERE e.url = ?1
                        ORDER BY b.created_at ASC, b.rowid ASC
                        LIMIT 1",
                        params![key],
                        read_raw,
                    )
                    .optional()?;
                Ok(raw)
            })
            .await
            .map_err(Error::from)?;

        raw.map(BucketEntry::try_from).transpose()
    }

    /// Look up an entry in `bucket` by the URL it was fetched from.
    pub async fn match_source(&self, bucket: &str, source_url: &str) -> Result<Option<BucketEntry>, Error> {
        let bucket = bucket.to_string();
        let source_url = source_url.to_string();
        let raw = self
            .conn
            .call(move |conn| -> Result<Option<RawEntry>, Error> {
                let raw = conn
                    .query_row(
                        &format!(
                            "SELECT {ENTRY_COLUMNS} FROM cache_entries
                            WHERE bucket = ?1 AND source_url = ?2
                            ORDER BY access_seq DESC LIMIT 1"
                        ),
                        params![bucket, source_url],
                        read_raw,
                    )
                    .optional()?;
                Ok(raw)
            })
            .await
            .map_err(Error::from)?;

        raw.map(BucketEntry::try_from).transpose()
    }

    /// Copy the entry stored under `key` from one bucket into another.
    ///
    /// Returns false if the source bucket has no such entry.
    pub async fn copy_entry(&self, from: &str, to: &str, key: &str) -> Result<bool, Error> {
        let from = from.to_string();
        let to = to.to_string();
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO cache_buckets (name, created_at) VALUES (?1, ?2)",
                    params![to, Utc::now().to_rfc3339()],
                )?;
                let copied = tx.execute(
                    "INSERT OR REPLACE INTO cache_entries (
                        bucket, url, source_url, status, kind, headers_json, body,
                        stored_at, stored_at_ms, access_seq
                    )
                    SELECT ?2, url, source_url, status, kind, headers_json, body,
                        stored_at, stored_at_ms,
                        (SELECT COALESCE(MAX(access_seq), 0) + 1 FROM cache_entries)
                    FROM cache_entries WHERE bucket = ?1 AND url = ?3",
                    params![from, to, key],
                )?;
                tx.commit()?;
                Ok(copied > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove one entry. Returns false if it was not present.
    pub async fn delete_entry(&self, bucket: &str, key: &str) -> Result<bool, Error> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted =
                    conn.execute("DELETE FROM cache_entries WHERE bucket = ?1 AND url = ?2", params![bucket, key])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Keys stored in a bucket, least recently used first.
    pub async fn entry_keys(&self, bucket: &str) -> Result<Vec<String>, Error> {
        let bucket = bucket.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT url FROM cache_entries WHERE bucket = ?1 ORDER BY access_seq ASC")?;
                let keys = stmt
                    .query_map(params![bucket], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    /// Evict least recently used entries until at most `max_entries` remain.
    ///
    /// Returns the number of deleted entries.
    pub async fn evict_lru(&self, bucket: &str, max_entries: usize) -> Result<u64, Error> {
        let bucket = bucket.to_string();
        let max = max_entries as i64;
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM cache_entries WHERE bucket = ?1", params![bucket], |row| {
                        row.get(0)
                    })?;
                if count <= max {
                    return Ok(0);
                }

                let to_delete = count - max;
                let deleted = conn.execute(
                    "DELETE FROM cache_entries WHERE bucket = ?1 AND url IN (
                        SELECT url FROM cache_entries WHERE bucket = ?1 ORDER BY access_seq ASC LIMIT ?2
                    )",
                    params![bucket, to_delete],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete entries older than `max_age`.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_expired(&self, bucket: &str, max_age: Duration) -> Result<u64, Error> {
        let bucket = bucket.to_string();
        let cutoff = Utc::now().timestamp_millis() - max_age.as_millis() as i64;
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let deleted = conn.execute(
                    "DELETE FROM cache_entries WHERE bucket = ?1 AND stored_at_ms < ?2",
                    params![bucket, cutoff],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }
}
