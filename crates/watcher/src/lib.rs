//! Realtime change watching for the franchise back office
//!
//! This crate turns per-table change feeds into cache invalidations:
//! - Per-(table, consumer) debouncing (500ms default, configurable)
//! - Burst coalescing into a single invalidation
//! - Disposable subscriptions that cancel pending work on teardown
//! - Periodic fallback refresh when live updates are unavailable

pub mod debounce;
pub mod error;
pub mod feed;
pub mod reconcile;
pub mod subscription;

pub use debounce::{DebounceState, Debouncer};
pub use error::WatchError;
pub use feed::loopback::LoopbackFeed;
pub use feed::{ChangeFeed, ChannelId, ChannelStatus, ChannelTopic, FeedChannel, FeedMessage};
pub use reconcile::PeriodicReconciler;
pub use subscription::{Invalidator, TableSubscription};

/// Result type for watcher operations
pub type Result<T> = std::result::Result<T, WatchError>;
