//! In-process change feed
//!
//! Delivers events published in the same process to every matching channel.
//! Used by the CLI (events read from a stream) and by tests, which can also
//! inject status transitions and subscribe failures.

use super::{ChangeFeed, ChannelId, ChannelStatus, ChannelTopic, FeedChannel, FeedMessage};
use crate::{Result, WatchError};
use async_trait::async_trait;
use dashmap::DashMap;
use franq_core::{ChangeEvent, TableName};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

struct Registered {
    topic: ChannelTopic,
    tx: mpsc::UnboundedSender<FeedMessage>,
}

#[derive(Default)]
pub struct LoopbackFeed {
    channels: DashMap<ChannelId, Registered>,
    next_id: AtomicU64,
    fail_next: Mutex<Option<String>>,
}

impl LoopbackFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every live channel whose topic matches.
    /// Returns the number of channels reached.
    pub fn publish(&self, event: &ChangeEvent) -> usize {
        self.deliver(
            |topic| topic.matches(event),
            || FeedMessage::Change(event.clone()),
        )
    }

    /// Push a status to every channel on `table`. Terminal statuses also
    /// release the channels, as a real transport would.
    pub fn emit_status(&self, table: &TableName, status: ChannelStatus) -> usize {
        let terminal = status.is_terminal();
        let reached = self.deliver(
            |topic| &topic.table == table,
            || FeedMessage::Status(status.clone()),
        );

        if terminal {
            self.channels.retain(|_, reg| &reg.topic.table != table);
        }
        reached
    }

    /// Make the next `subscribe` call fail with `reason`
    pub fn fail_next_subscribe(&self, reason: impl Into<String>) {
        *self.fail_next.lock() = Some(reason.into());
    }

    /// Live channels on `table`
    pub fn subscriber_count(&self, table: &TableName) -> usize {
        self.channels
            .iter()
            .filter(|entry| &entry.value().topic.table == table && !entry.value().tx.is_closed())
            .count()
    }

    /// Live channels on all tables
    pub fn channel_count(&self) -> usize {
        self.channels.iter().filter(|entry| !entry.value().tx.is_closed()).count()
    }

    fn deliver<P, M>(&self, wanted: P, message: M) -> usize
    where
        P: Fn(&ChannelTopic) -> bool,
        M: Fn() -> FeedMessage,
    {
        let mut reached = 0;
        let mut dead = Vec::new();

        for entry in self.channels.iter() {
            if !wanted(&entry.value().topic) {
                continue;
            }
            match entry.value().tx.send(message()) {
                Ok(()) => reached += 1,
                Err(_) => dead.push(*entry.key()),
            }
        }

        // Receivers dropped without unsubscribing
        for id in dead {
            self.channels.remove(&id);
        }
        reached
    }
}

#[async_trait]
impl ChangeFeed for LoopbackFeed {
    async fn subscribe(&self, topic: ChannelTopic) -> Result<FeedChannel> {
        let failure = self.fail_next.lock().take();
        if let Some(reason) = failure {
            return Err(WatchError::Subscribe { table: topic.table, reason });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, messages) = mpsc::unbounded_channel();

        // Acknowledge immediately; there is no remote side to wait for
        let _ = tx.send(FeedMessage::Status(ChannelStatus::Subscribed));

        tracing::trace!(channel = %topic.channel_name(), id, "Loopback channel opened");
        self.channels.insert(id, Registered { topic: topic.clone(), tx });

        Ok(FeedChannel { id, topic, messages })
    }

    fn unsubscribe(&self, id: ChannelId) {
        if self.channels.remove(&id).is_some() {
            tracing::trace!(id, "Loopback channel released");
        }
    }
}
