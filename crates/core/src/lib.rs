//! Franq core - cache and change-feed primitives for the franchise back office
//!
//! This crate provides:
//! - Query keys with prefix-based invalidation
//! - The shared query-result cache (`QueryCache`) and its `CacheClient` seam
//! - The realtime change-event model
//! - Well-known table names
//! - TOML configuration

pub mod cache;
pub mod config;
pub mod error;
pub mod event;
pub mod key;
pub mod table;

// Re-export main types for convenience
pub use cache::{CacheClient, CacheEntry, Freshness, QueryCache};
pub use config::{Binding, LogConfig, RealtimeConfig, RealtimeSection};
pub use error::CoreError;
pub use event::{ChangeEvent, EventFilter, EventType};
pub use key::QueryKey;
pub use table::TableName;

/// Common result type used throughout franq-core
pub type Result<T> = std::result::Result<T, CoreError>;
