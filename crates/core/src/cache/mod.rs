//! SQLite-backed cache buckets and durable key-value store.
//!
//! This module provides the storage the interception agent relies on between
//! events, using SQLite with async access via tokio-rusqlite. It supports:
//!
//! - Named, isolated buckets of (request URL -> response snapshot)
//! - Full-replace writes, max-age lookups and exact LRU eviction per bucket
//! - Revisioned precache keys and manifest generation hashing
//! - A small durable key-value store for page-side state
//! - Automatic schema migrations and WAL mode for concurrent access

pub mod buckets;
pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::BucketEntry;
