//! Core types and shared functionality for haven.
//!
//! This crate provides:
//! - Request/response snapshot model shared by the agent and its storage
//! - Cache buckets and the durable key-value store, backed by SQLite
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod http;

pub use cache::{BucketEntry, CacheDb};
pub use config::{AppConfig, ConfigError, RoutesConfig};
pub use error::Error;
pub use http::{Destination, Request, RequestMode, Response, ResponseKind};
