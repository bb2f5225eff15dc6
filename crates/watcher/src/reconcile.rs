//! Periodic fallback refresh
//!
//! Realtime channels are not retried once they fail, so cached results can
//! quietly go out of date. The reconciler invalidates a fixed set of keys on
//! an interval so consumers still refetch now and then.

use franq_core::{CacheClient, QueryKey};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Periodic invalidation of a fixed set of keys
pub struct PeriodicReconciler {
    /// Keys refreshed on every tick
    keys: Vec<QueryKey>,

    /// Time between refreshes
    interval: Duration,

    cache: Arc<dyn CacheClient>,
}

impl PeriodicReconciler {
    pub fn new(keys: Vec<QueryKey>, interval: Duration, cache: Arc<dyn CacheClient>) -> Self {
        Self { keys, interval, cache }
    }

    /// Run forever. The first refresh happens one interval after start.
    pub async fn run(self) {
        let mut timer = interval_at(Instant::now() + self.interval, self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Starting periodic refresh of {} keys (interval: {:?})",
            self.keys.len(),
            self.interval
        );

        loop {
            timer.tick().await;
            let staled = self.refresh();
            debug!(staled, "Periodic refresh");
        }
    }

    /// Spawn `run` on the current runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Invalidate every key once; returns entries staled
    pub fn refresh(&self) -> usize {
        self.keys.iter().map(|key| self.cache.invalidate(key)).sum()
    }
}
