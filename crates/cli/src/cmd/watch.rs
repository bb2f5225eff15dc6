//! Watch command
//!
//! Subscribes every bound table on an in-process change feed, then replays
//! change events read as NDJSON (one backend payload per line) into it.
//! Each bound key is seeded into the cache as if a consumer had fetched it,
//! and is "refetched" whenever an invalidation stales it.

use crate::util;
use anyhow::{Context, Result};
use franq_core::{Binding, ChangeEvent, QueryCache, QueryKey};
use owo_colors::OwoColorize;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use watcher::{Invalidator, LoopbackFeed, PeriodicReconciler, TableSubscription};

/// Extra wait after input ends, on top of the debounce delay
const DRAIN_MARGIN: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct InputStats {
    events: usize,
    malformed: usize,
    unrouted: usize,
}

pub async fn run(
    config_path: &Path,
    input: Option<PathBuf>,
    delay_ms: Option<u64>,
    tables: &[String],
) -> Result<()> {
    let mut config = util::load_config(config_path)?;

    if let Some(ms) = delay_ms {
        config.realtime.debounce_ms = ms;
    }
    if !tables.is_empty() {
        config.bindings = tables
            .iter()
            .map(|raw| Binding::parse(raw).with_context(|| format!("Invalid --table '{}'", raw)))
            .collect::<Result<_>>()?;
    }
    config.validate().context("Invalid configuration")?;

    if config.bindings.is_empty() {
        anyhow::bail!("No tables to watch (configure bindings or pass --table)");
    }

    let feed = Arc::new(LoopbackFeed::new());
    let cache = Arc::new(QueryCache::new());
    let invalidator = Invalidator::new(feed.clone(), cache.clone(), config.realtime.clone());

    for binding in &config.bindings {
        cache.insert(binding.key.clone(), json!({ "seeded": true }));
    }

    let refetcher = tokio::spawn(refetch_loop(cache.clone(), cache.subscribe_invalidations()));

    let reconciler = config.realtime.fallback_poll().map(|interval| {
        let keys = config.bindings.iter().map(|b| b.key.clone()).collect();
        PeriodicReconciler::new(keys, interval, cache.clone()).spawn()
    });

    let subscriptions = invalidator.subscribe_all(&config.bindings).await;
    if subscriptions.is_empty() {
        anyhow::bail!("Every subscription failed; nothing to watch");
    }

    tracing::info!(
        tables = subscriptions.len(),
        debounce_ms = config.realtime.debounce_ms,
        "Watching for changes"
    );

    let stats = match input {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            replay(BufReader::new(file), &feed).await?
        }
        None => replay(BufReader::new(tokio::io::stdin()), &feed).await?,
    };

    // Let the last burst settle before tearing down
    tokio::time::sleep(invalidator.debounce() + DRAIN_MARGIN).await;

    print_summary(&stats, &subscriptions);

    for subscription in subscriptions {
        subscription.unsubscribe();
    }
    if let Some(handle) = reconciler {
        handle.abort();
    }
    refetcher.abort();

    Ok(())
}

/// Publish every event line until EOF or Ctrl-C
async fn replay<R>(reader: R, feed: &LoopbackFeed) -> Result<InputStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = InputStats::default();

    // One listener for the whole replay
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read input")?,
            _ = &mut interrupt => {
                tracing::info!("Interrupted, stopping");
                break;
            }
        };

        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match ChangeEvent::from_json(line) {
            Ok(event) => {
                stats.events += 1;
                if feed.publish(&event) == 0 {
                    stats.unrouted += 1;
                    tracing::debug!(table = %event.table, "No subscription for event");
                }
            }
            Err(e) => {
                stats.malformed += 1;
                tracing::warn!("Skipping malformed event: {}", e);
            }
        }
    }

    Ok(stats)
}

/// Stand-in consumer: refetch whatever an invalidation staled
async fn refetch_loop(cache: Arc<QueryCache>, mut invalidated: broadcast::Receiver<QueryKey>) {
    loop {
        let prefix = match invalidated.recv().await {
            Ok(prefix) => prefix,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "Refetcher lagged behind invalidations");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        println!("{} {}", "invalidated".yellow(), prefix);

        for key in cache.keys().into_iter().filter(|k| prefix.is_prefix_of(k)) {
            let result = cache
                .get_or_fetch(&key, || async { Ok(json!({ "refetched": true })) })
                .await;
            if let Err(e) = result {
                tracing::warn!(key = %key, "Refetch failed: {}", e);
            }
        }
    }
}

fn print_summary(stats: &InputStats, subscriptions: &[TableSubscription]) {
    let mut per_binding = BTreeMap::new();
    for sub in subscriptions {
        per_binding.insert(format!("{} -> {}", sub.table(), sub.key()), sub.invalidations());
    }

    println!("\n{}", "Summary".bold());
    println!("Events read: {}", stats.events);
    println!("Malformed lines: {}", stats.malformed);
    println!("Unrouted events: {}", stats.unrouted);
    println!("Invalidations:");
    for (binding, count) in per_binding {
        println!("  {}: {}", binding, count);
    }
}
