//! Shared fixtures for realtime invalidation tests

#![allow(dead_code)]

use franq_core::{CacheClient, ChangeEvent, EventType, QueryKey, RealtimeSection, TableName};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use watcher::{Invalidator, LoopbackFeed};

/// Debounce delay used throughout the tests
pub const D: Duration = Duration::from_millis(500);

/// Cache double that records every invalidation call with its time
#[derive(Default)]
pub struct RecordingCache {
    calls: Mutex<Vec<(QueryKey, Instant)>>,
}

impl RecordingCache {
    pub fn calls(&self) -> Vec<(QueryKey, Instant)> {
        self.calls.lock().clone()
    }

    pub fn keys(&self) -> Vec<QueryKey> {
        self.calls.lock().iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl CacheClient for RecordingCache {
    fn invalidate(&self, key: &QueryKey) -> usize {
        self.calls.lock().push((key.clone(), Instant::now()));
        1
    }
}

pub struct Harness {
    pub feed: Arc<LoopbackFeed>,
    pub cache: Arc<RecordingCache>,
    pub invalidator: Invalidator,
}

impl Harness {
    pub fn new() -> Self {
        let feed = Arc::new(LoopbackFeed::new());
        let cache = Arc::new(RecordingCache::default());
        let settings = RealtimeSection {
            debounce_ms: D.as_millis() as u64,
            ..RealtimeSection::default()
        };
        let invalidator = Invalidator::new(feed.clone(), cache.clone(), settings);
        Self { feed, cache, invalidator }
    }

    pub fn change(&self, name: &str) {
        self.feed.publish(&ChangeEvent::new(EventType::Update, table(name)));
    }
}

pub fn table(name: &str) -> TableName {
    TableName::new(name).unwrap()
}

pub fn key(s: &str) -> QueryKey {
    s.parse().unwrap()
}

/// Let spawned tasks drain their channels without moving the clock much
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
