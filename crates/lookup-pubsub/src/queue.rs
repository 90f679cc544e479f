//! Broker-facing capability traits
//!
//! `QueueManager` is the server-side surface: obtain/create queues for a
//! query filter and push notifications into them. `Broker` adds the
//! subscriber-side primitives. Backends are selected at startup; the broker
//! wire protocol itself is outside this crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use lookup_api::{Query, Record};
use lookup_common::error::LookupError;

/// Manages the pub-sub queues for the lookup service.
#[async_trait]
pub trait QueueManager: Send + Sync {
    /// Queues assigned to `query`, creating one if none exists.
    ///
    /// Fails with a query error on a malformed filter, or a queue error on
    /// broker failure.
    async fn get_queues(&self, query: &Query) -> Result<Vec<String>, LookupError>;

    /// Enqueue `record` for delivery to subscribers of `queue_id`.
    ///
    /// Does not retry internally; retry policy belongs to the caller.
    async fn push(&self, queue_id: &str, record: &Record) -> Result<(), LookupError>;
}

/// Subscriber-side broker primitives on top of queue management.
#[async_trait]
pub trait Broker: QueueManager {
    /// Open a subscription on a queue and start receiving its records.
    async fn subscribe(&self, queue_id: &str) -> Result<Subscription, LookupError>;

    /// Synchronous health probe; returns the queue's creation time.
    async fn heartbeat(&self, queue_id: &str) -> Result<DateTime<Utc>, LookupError>;

    /// Close one subscription. The queue itself survives.
    async fn unsubscribe(&self, queue_id: &str, subscription_id: &str)
        -> Result<(), LookupError>;
}

/// A live subscription handle: records arrive in the queue's FIFO order.
pub struct Subscription {
    id: String,
    queue_id: String,
    receiver: mpsc::Receiver<Record>,
}

impl Subscription {
    pub(crate) fn new(id: String, queue_id: String, receiver: mpsc::Receiver<Record>) -> Self {
        Subscription {
            id,
            queue_id,
            receiver,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn queue_id(&self) -> &str {
        &self.queue_id
    }

    /// Next record, or `None` once the broker has dropped this subscription.
    pub async fn recv(&mut self) -> Option<Record> {
        self.receiver.recv().await
    }
}
