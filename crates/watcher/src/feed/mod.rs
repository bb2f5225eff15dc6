//! Change feed transport
//!
//! A change feed pushes row-level events for one table at a time over a
//! named channel. Reconnection is the transport's business; subscribers
//! only observe the status transitions.

pub mod loopback;

use crate::Result;
use async_trait::async_trait;
use franq_core::event::DEFAULT_SCHEMA;
use franq_core::{ChangeEvent, EventFilter, TableName};
use std::fmt;
use tokio::sync::mpsc;

/// Transport-assigned channel handle
pub type ChannelId = u64;

/// What a channel listens to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelTopic {
    pub schema: String,
    pub table: TableName,
    pub events: EventFilter,
}

impl ChannelTopic {
    pub fn new(table: TableName) -> Self {
        Self {
            schema: DEFAULT_SCHEMA.to_string(),
            table,
            events: EventFilter::ALL,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn with_events(mut self, events: EventFilter) -> Self {
        self.events = events;
        self
    }

    /// Channel name as announced to the backend
    pub fn channel_name(&self) -> String {
        format!("realtime:{}:{}", self.schema, self.table)
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        event.table == self.table && event.schema == self.schema && self.events.matches(event.event_type)
    }
}

/// Lifecycle of a channel as reported by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Requested, not yet acknowledged
    Joining,
    Subscribed,
    ChannelError(String),
    TimedOut,
    Closed,
}

impl ChannelStatus {
    /// Terminal statuses end the subscription instance; nothing is retried
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChannelStatus::ChannelError(_) | ChannelStatus::TimedOut | ChannelStatus::Closed
        )
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelStatus::Joining => f.write_str("JOINING"),
            ChannelStatus::Subscribed => f.write_str("SUBSCRIBED"),
            ChannelStatus::ChannelError(reason) => write!(f, "CHANNEL_ERROR ({})", reason),
            ChannelStatus::TimedOut => f.write_str("TIMED_OUT"),
            ChannelStatus::Closed => f.write_str("CLOSED"),
        }
    }
}

/// Item delivered on a channel
#[derive(Debug, Clone)]
pub enum FeedMessage {
    Change(ChangeEvent),
    Status(ChannelStatus),
}

/// An open channel. Dropping `messages` abandons it; call
/// `ChangeFeed::unsubscribe` to release it on the transport side.
#[derive(Debug)]
pub struct FeedChannel {
    pub id: ChannelId,
    pub topic: ChannelTopic,
    pub messages: mpsc::UnboundedReceiver<FeedMessage>,
}

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open a channel for `topic`
    async fn subscribe(&self, topic: ChannelTopic) -> Result<FeedChannel>;

    /// Release a channel. Unknown ids are ignored.
    fn unsubscribe(&self, id: ChannelId);
}
