//! In-process broker
//!
//! Queues are created lazily, keyed by the canonical form of their query
//! filter, and fan out to subscribers over per-subscription channels, which
//! preserves per-queue FIFO ordering. Records pushed before the first
//! subscriber attaches are held back and flushed to it.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use lookup_api::{Query, Record};
use lookup_common::error::LookupError;

use crate::queue::{Broker, QueueManager, Subscription};

const CHANNEL_CAPACITY: usize = 1_024;

struct QueueEntry {
    query: Query,
    created_at: DateTime<Utc>,
    backlog: VecDeque<Record>,
    subscribers: Vec<(String, mpsc::Sender<Record>)>,
}

/// Broker variant backed by process-local channels.
#[derive(Default)]
pub struct MemoryBroker {
    queues: DashMap<String, QueueEntry>,
    // canonical query form -> queue id
    by_filter: DashMap<String, String>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        MemoryBroker::default()
    }

    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// The filter a queue was created for.
    pub fn queue_filter(&self, queue_id: &str) -> Option<Query> {
        self.queues.get(queue_id).map(|entry| entry.query.clone())
    }

    fn fingerprint(query: &Query) -> Result<String, LookupError> {
        serde_json::to_string(&query.to_wire_map())
            .map_err(|e| LookupError::Query(format!("cannot canonicalize query: {}", e)))
    }
}

#[async_trait]
impl QueueManager for MemoryBroker {
    async fn get_queues(&self, query: &Query) -> Result<Vec<String>, LookupError> {
        let filter = Self::fingerprint(query)?;
        // the entry lock makes lookup-or-create atomic: two concurrent
        // callers with the same filter always resolve to one queue
        let id = match self.by_filter.entry(filter) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(slot) => {
                let id = Uuid::new_v4().to_string();
                self.queues.insert(
                    id.clone(),
                    QueueEntry {
                        query: query.clone(),
                        created_at: Utc::now(),
                        backlog: VecDeque::new(),
                        subscribers: Vec::new(),
                    },
                );
                slot.insert(id.clone());
                debug!(queue_id = %id, "created queue");
                id
            }
        };
        Ok(vec![id])
    }

    async fn push(&self, queue_id: &str, record: &Record) -> Result<(), LookupError> {
        // snapshot senders so no map guard is held across an await
        let senders: Vec<(String, mpsc::Sender<Record>)> = {
            let mut entry = self
                .queues
                .get_mut(queue_id)
                .ok_or_else(|| LookupError::Queue(format!("no such queue: {}", queue_id)))?;
            if entry.subscribers.is_empty() {
                entry.backlog.push_back(record.clone());
                return Ok(());
            }
            entry.subscribers.clone()
        };

        let mut closed = Vec::new();
        for (subscription_id, sender) in senders {
            if sender.send(record.clone()).await.is_err() {
                closed.push(subscription_id);
            }
        }
        if !closed.is_empty() {
            if let Some(mut entry) = self.queues.get_mut(queue_id) {
                entry.subscribers.retain(|(id, _)| !closed.contains(id));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn subscribe(&self, queue_id: &str) -> Result<Subscription, LookupError> {
        let mut entry = self
            .queues
            .get_mut(queue_id)
            .ok_or_else(|| LookupError::Queue(format!("no such queue: {}", queue_id)))?;

        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let subscription_id = Uuid::new_v4().to_string();

        // hand any held-back records to the new subscriber, in order
        while let Some(record) = entry.backlog.pop_front() {
            if let Err(e) = sender.try_send(record) {
                warn!(queue_id, "dropping backlog record: {}", e);
                break;
            }
        }
        entry
            .subscribers
            .push((subscription_id.clone(), sender));

        debug!(queue_id, subscription_id = %subscription_id, "subscription opened");
        Ok(Subscription::new(
            subscription_id,
            queue_id.to_string(),
            receiver,
        ))
    }

    async fn heartbeat(&self, queue_id: &str) -> Result<DateTime<Utc>, LookupError> {
        self.queues
            .get(queue_id)
            .map(|entry| entry.created_at)
            .ok_or_else(|| LookupError::Queue(format!("no such queue: {}", queue_id)))
    }

    async fn unsubscribe(
        &self,
        queue_id: &str,
        subscription_id: &str,
    ) -> Result<(), LookupError> {
        let mut entry = self
            .queues
            .get_mut(queue_id)
            .ok_or_else(|| LookupError::Queue(format!("no such queue: {}", queue_id)))?;
        entry.subscribers.retain(|(id, _)| id != subscription_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookup_api::RecordState;

    fn record(uri: &str) -> Record {
        let mut record = Record::new("service");
        record.set_uri(uri);
        record.set_state(RecordState::Register);
        record
    }

    #[tokio::test]
    async fn test_get_queues_creates_lazily_and_reuses() {
        let broker = MemoryBroker::new();
        let mut query = Query::new();
        query.add("type", "service");

        let first = broker.get_queues(&query).await.unwrap();
        let second = broker.get_queues(&query).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(broker.queue_count(), 1);
        assert_eq!(broker.queue_filter(&first[0]).unwrap(), query);

        let other = broker.get_queues(&Query::new()).await.unwrap();
        assert_ne!(first, other);
        assert_eq!(broker.queue_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_get_queues_share_one_queue() {
        use std::sync::Arc;

        let broker = Arc::new(MemoryBroker::new());
        let mut query = Query::new();
        query.add("type", "service");

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let broker = broker.clone();
            let query = query.clone();
            tasks.push(tokio::spawn(async move {
                broker.get_queues(&query).await.unwrap().remove(0)
            }));
        }

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap());
        }
        assert!(ids.iter().all(|id| id == &ids[0]));
        assert_eq!(broker.queue_count(), 1);
    }

    #[tokio::test]
    async fn test_push_to_unknown_queue_is_queue_error() {
        let broker = MemoryBroker::new();
        let err = broker.push("nope", &record("a")).await.unwrap_err();
        assert!(matches!(err, LookupError::Queue(_)));
    }

    #[tokio::test]
    async fn test_fifo_delivery() {
        let broker = MemoryBroker::new();
        let ids = broker.get_queues(&Query::new()).await.unwrap();
        let mut subscription = broker.subscribe(&ids[0]).await.unwrap();

        for uri in ["a", "b", "c"] {
            broker.push(&ids[0], &record(uri)).await.unwrap();
        }
        for uri in ["a", "b", "c"] {
            assert_eq!(subscription.recv().await.unwrap().uri(), Some(uri));
        }
    }

    #[tokio::test]
    async fn test_backlog_flushed_to_first_subscriber() {
        let broker = MemoryBroker::new();
        let ids = broker.get_queues(&Query::new()).await.unwrap();

        broker.push(&ids[0], &record("early")).await.unwrap();
        let mut subscription = broker.subscribe(&ids[0]).await.unwrap();
        assert_eq!(subscription.recv().await.unwrap().uri(), Some("early"));
    }

    #[tokio::test]
    async fn test_heartbeat_reports_creation_time() {
        let broker = MemoryBroker::new();
        let before = Utc::now();
        let ids = broker.get_queues(&Query::new()).await.unwrap();
        let created = broker.heartbeat(&ids[0]).await.unwrap();
        assert!(created >= before);
        assert!(created <= Utc::now());

        assert!(broker.heartbeat("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let broker = MemoryBroker::new();
        let ids = broker.get_queues(&Query::new()).await.unwrap();
        let mut subscription = broker.subscribe(&ids[0]).await.unwrap();

        broker
            .unsubscribe(&ids[0], subscription.id())
            .await
            .unwrap();
        broker.push(&ids[0], &record("late")).await.unwrap();
        assert!(subscription.recv().await.is_none());
    }
}
