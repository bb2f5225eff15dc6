//! Per-(table, consumer) realtime subscriptions
//!
//! Each subscription owns one feed channel and one task. The task listens on
//! the channel and drives a `Debouncer`; when the quiet period ends it
//! invalidates the consumer's cache key. Teardown tells the task to cancel
//! its pending deadline and stop, and nothing fires after it returns.

use crate::debounce::Debouncer;
use crate::feed::{ChangeFeed, ChannelId, ChannelStatus, ChannelTopic, FeedChannel, FeedMessage};
use crate::Result;
use franq_core::{Binding, CacheClient, EventFilter, QueryKey, RealtimeSection, TableName};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use ulid::Ulid;

/// Opens debounced invalidating subscriptions
///
/// Both collaborators are injected: tests build isolated feeds and caches,
/// the application shares one `QueryCache` across all subscriptions.
#[derive(Clone)]
pub struct Invalidator {
    feed: Arc<dyn ChangeFeed>,
    cache: Arc<dyn CacheClient>,
    settings: RealtimeSection,
}

impl Invalidator {
    pub fn new(
        feed: Arc<dyn ChangeFeed>,
        cache: Arc<dyn CacheClient>,
        settings: RealtimeSection,
    ) -> Self {
        Self { feed, cache, settings }
    }

    pub fn debounce(&self) -> Duration {
        self.settings.debounce()
    }

    /// Invalidate `key` after every burst of changes on `table`
    pub async fn subscribe(&self, table: TableName, key: QueryKey) -> Result<TableSubscription> {
        self.open(table, key, EventFilter::ALL).await
    }

    pub async fn subscribe_binding(&self, binding: &Binding) -> Result<TableSubscription> {
        self.open(binding.table.clone(), binding.key.clone(), binding.events).await
    }

    /// Subscribe every binding. Failed bindings are logged and skipped.
    pub async fn subscribe_all(&self, bindings: &[Binding]) -> Vec<TableSubscription> {
        let mut subscriptions = Vec::with_capacity(bindings.len());

        for binding in bindings {
            match self.subscribe_binding(binding).await {
                Ok(subscription) => subscriptions.push(subscription),
                Err(e) => warn!(table = %binding.table, key = %binding.key, "Skipping binding: {}", e),
            }
        }

        subscriptions
    }

    async fn open(
        &self,
        table: TableName,
        key: QueryKey,
        events: EventFilter,
    ) -> Result<TableSubscription> {
        let topic = ChannelTopic::new(table.clone())
            .with_schema(self.settings.schema.clone())
            .with_events(events);
        let channel_name = topic.channel_name();

        let FeedChannel { id: channel, messages, .. } = match self.feed.subscribe(topic).await {
            Ok(channel) => channel,
            Err(e) => {
                warn!(table = %table, channel = %channel_name, "Realtime subscribe failed: {}", e);
                return Err(e);
            }
        };

        let id = Ulid::new();
        let shared = Arc::new(Shared::default());
        let (status_tx, status) = watch::channel(ChannelStatus::Joining);
        let (shutdown, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(run_channel(ChannelTask {
            subscription: id,
            table: table.clone(),
            key: key.clone(),
            messages,
            shutdown: shutdown_rx,
            cache: self.cache.clone(),
            shared: shared.clone(),
            status: status_tx,
            delay: self.debounce(),
        }));

        info!(
            table = %table,
            key = %key,
            subscription = %id,
            channel = %channel_name,
            "Realtime subscription opened"
        );

        Ok(TableSubscription {
            id,
            table,
            key,
            events,
            invalidator: self.clone(),
            channel: Some(channel),
            task: Some(task),
            shutdown: Some(shutdown),
            shared,
            status,
        })
    }
}

/// State shared between a handle and its task
struct Shared {
    /// Cleared on teardown. Held while an invalidation runs.
    active: Mutex<bool>,
    invalidations: AtomicU64,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            active: Mutex::new(true),
            invalidations: AtomicU64::new(0),
        }
    }
}

/// Live subscription of one consumer to one table
///
/// Dropping the handle tears the subscription down; `unsubscribe` does the
/// same explicitly.
pub struct TableSubscription {
    id: Ulid,
    table: TableName,
    key: QueryKey,
    events: EventFilter,
    invalidator: Invalidator,
    channel: Option<ChannelId>,
    task: Option<JoinHandle<()>>,
    shutdown: Option<oneshot::Sender<()>>,
    shared: Arc<Shared>,
    status: watch::Receiver<ChannelStatus>,
}

impl TableSubscription {
    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Latest channel status
    pub fn status(&self) -> ChannelStatus {
        self.status.borrow().clone()
    }

    /// Invalidations fired since the last (re)subscribe
    pub fn invalidations(&self) -> u64 {
        self.shared.invalidations.load(Ordering::Relaxed)
    }

    /// False once torn down or once the channel task has finished
    pub fn is_active(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Point the subscription at a new cache key.
    ///
    /// The current channel is torn down first, dropping any pending
    /// invalidation for the old key, then a new one is opened. On error the
    /// subscription stays torn down.
    pub async fn set_key(&mut self, key: QueryKey) -> Result<()> {
        if key == self.key {
            return Ok(());
        }

        debug!(table = %self.table, from = %self.key, to = %key, "Cache key changed, resubscribing");
        self.teardown();
        self.key = key.clone();

        let next = self.invalidator.open(self.table.clone(), key, self.events).await?;
        *self = next;
        Ok(())
    }

    /// Tear down: cancel pending work and release the channel
    pub fn unsubscribe(mut self) {
        if self.teardown() {
            info!(table = %self.table, key = %self.key, subscription = %self.id, "Realtime subscription closed");
        }
    }

    /// Idempotent. Returns true if there was anything to tear down.
    fn teardown(&mut self) -> bool {
        if self.task.take().is_none() {
            return false;
        }

        // Waits for an in-flight invalidation; blocks any later one
        *self.shared.active.lock() = false;
        if let Some(shutdown) = self.shutdown.take() {
            // Err means the task already finished
            let _ = shutdown.send(());
        }

        if let Some(channel) = self.channel.take() {
            self.invalidator.feed.unsubscribe(channel);
        }
        true
    }
}

impl Drop for TableSubscription {
    fn drop(&mut self) {
        if self.teardown() {
            debug!(table = %self.table, subscription = %self.id, "Realtime subscription dropped");
        }
    }
}

impl fmt::Debug for TableSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableSubscription")
            .field("id", &self.id)
            .field("table", &self.table)
            .field("key", &self.key)
            .field("events", &self.events)
            .field("status", &*self.status.borrow())
            .field("invalidations", &self.invalidations())
            .finish()
    }
}

struct ChannelTask {
    subscription: Ulid,
    table: TableName,
    key: QueryKey,
    messages: mpsc::UnboundedReceiver<FeedMessage>,
    shutdown: oneshot::Receiver<()>,
    cache: Arc<dyn CacheClient>,
    shared: Arc<Shared>,
    status: watch::Sender<ChannelStatus>,
    delay: Duration,
}

/// Channel loop. After a terminal status the loop stops listening but still
/// lets a pending invalidation fire before exiting.
async fn run_channel(task: ChannelTask) {
    let ChannelTask {
        subscription,
        table,
        key,
        mut messages,
        mut shutdown,
        cache,
        shared,
        status,
        delay,
    } = task;

    let mut debouncer = Debouncer::new(delay);
    let mut listening = true;

    loop {
        if !listening && !debouncer.is_pending() {
            break;
        }

        let due = debouncer.wait();

        tokio::select! {
            // Teardown first, then a change arriving on the deadline tick
            // resets the timer instead of racing it
            biased;

            _ = &mut shutdown => {
                let dropped = debouncer.cancel();
                debug!(table = %table, subscription = %subscription, dropped, "Teardown requested");
                break;
            }
            message = messages.recv(), if listening => match message {
                Some(FeedMessage::Change(event)) => {
                    let reset = debouncer.schedule(Instant::now());
                    debug!(
                        table = %table,
                        event = %event.event_type,
                        reset,
                        "Change received, invalidation scheduled"
                    );
                }
                Some(FeedMessage::Status(next)) => {
                    log_status(&table, subscription, &next);
                    listening = !next.is_terminal();
                    status.send_replace(next);
                }
                None => {
                    log_status(&table, subscription, &ChannelStatus::Closed);
                    listening = false;
                    status.send_replace(ChannelStatus::Closed);
                }
            },
            _ = due => {
                if debouncer.poll_due(Instant::now())
                    && !fire(&shared, cache.as_ref(), &table, &key, subscription)
                {
                    break;
                }
            }
        }
    }

    debug!(table = %table, subscription = %subscription, "Realtime channel task finished");
}

/// Run one invalidation unless the subscription was torn down
fn fire(
    shared: &Shared,
    cache: &dyn CacheClient,
    table: &TableName,
    key: &QueryKey,
    subscription: Ulid,
) -> bool {
    let active = shared.active.lock();
    if !*active {
        return false;
    }

    let staled = cache.invalidate(key);
    shared.invalidations.fetch_add(1, Ordering::Relaxed);
    info!(table = %table, key = %key, staled, subscription = %subscription, "Cache invalidated");
    true
}

fn log_status(table: &TableName, subscription: Ulid, status: &ChannelStatus) {
    match status {
        ChannelStatus::Joining => debug!(table = %table, subscription = %subscription, "Realtime channel joining"),
        ChannelStatus::Subscribed => {
            info!(table = %table, subscription = %subscription, "Realtime channel subscribed")
        }
        ChannelStatus::ChannelError(reason) => warn!(
            table = %table,
            subscription = %subscription,
            reason = %reason,
            "Realtime channel error, live updates stopped"
        ),
        ChannelStatus::TimedOut => warn!(
            table = %table,
            subscription = %subscription,
            "Realtime channel timed out, live updates stopped"
        ),
        ChannelStatus::Closed => info!(table = %table, subscription = %subscription, "Realtime channel closed"),
    }
}
