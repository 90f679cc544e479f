//! Subscriber and heartbeat protocol
//!
//! A subscriber binds one upstream source and one query filter to one broker
//! queue. Lifecycle: `Created -> Subscribing -> Active -> Stopped`. Listeners
//! may be attached or detached at any point, whether or not the subscription
//! is live; an active subscriber delivers pushed records to every listener in
//! arrival order and answers heartbeat probes without changing state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use lookup_api::{Query, Record};
use lookup_common::error::LookupError;

use crate::queue::Broker;

/// Receives records delivered on a subscription.
#[async_trait::async_trait]
pub trait SubscriberListener: Send + Sync {
    async fn on_record(&self, record: Record);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriberState {
    Created,
    Subscribing,
    Active,
    /// Terminal.
    Stopped,
}

/// One live subscription to a remote node's queue for a given query.
pub struct Subscriber {
    host: String,
    port: u16,
    query: Query,
    broker: Arc<dyn Broker>,
    state: Mutex<SubscriberState>,
    queue_id: Mutex<Option<String>>,
    subscription_id: Mutex<Option<String>>,
    listeners: Arc<RwLock<Vec<Arc<dyn SubscriberListener>>>>,
    delivery_task: Mutex<Option<JoinHandle<()>>>,
}

impl Subscriber {
    pub fn new(host: &str, port: u16, query: Query, broker: Arc<dyn Broker>) -> Self {
        Subscriber {
            host: host.to_string(),
            port,
            query,
            broker,
            state: Mutex::new(SubscriberState::Created),
            queue_id: Mutex::new(None),
            subscription_id: Mutex::new(None),
            listeners: Arc::new(RwLock::new(Vec::new())),
            delivery_task: Mutex::new(None),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn state(&self) -> SubscriberState {
        *self.state.lock()
    }

    /// Attach a listener. Works in any state, so a listener can be in place
    /// before the subscription goes live.
    pub fn add_listener(&self, listener: Arc<dyn SubscriberListener>) {
        self.listeners.write().push(listener);
    }

    /// Detach a previously attached listener.
    pub fn remove_listener(&self, listener: &Arc<dyn SubscriberListener>) {
        self.listeners
            .write()
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Open the broker subscription and start the delivery loop.
    ///
    /// A queue or query failure leaves the subscriber in `Created` so the
    /// caller may retry.
    pub async fn start_subscription(&self) -> Result<(), LookupError> {
        {
            let mut state = self.state.lock();
            match *state {
                SubscriberState::Created => *state = SubscriberState::Subscribing,
                other => {
                    return Err(LookupError::Queue(format!(
                        "cannot start subscription from state {:?}",
                        other
                    )));
                }
            }
        }

        let result = async {
            let queues = self.broker.get_queues(&self.query).await?;
            let queue_id = queues.into_iter().next().ok_or_else(|| {
                LookupError::Queue("broker returned no queue for query".to_string())
            })?;
            let subscription = self.broker.subscribe(&queue_id).await?;
            Ok::<_, LookupError>((queue_id, subscription))
        }
        .await;

        let (queue_id, mut subscription) = match result {
            Ok(pair) => pair,
            Err(e) => {
                *self.state.lock() = SubscriberState::Created;
                return Err(e);
            }
        };

        *self.queue_id.lock() = Some(queue_id.clone());
        *self.subscription_id.lock() = Some(subscription.id().to_string());

        let listeners = self.listeners.clone();
        let host = self.host.clone();
        let port = self.port;
        let task = tokio::spawn(async move {
            while let Some(record) = subscription.recv().await {
                // snapshot so the lock is not held across listener awaits
                let targets: Vec<Arc<dyn SubscriberListener>> =
                    listeners.read().iter().cloned().collect();
                for listener in targets {
                    listener.on_record(record.clone()).await;
                }
            }
            debug!(host = %host, port, "subscription channel closed");
        });
        *self.delivery_task.lock() = Some(task);
        *self.state.lock() = SubscriberState::Active;

        info!(
            host = %self.host,
            port = self.port,
            queue_id = %queue_id,
            "subscription started"
        );
        Ok(())
    }

    /// Unsubscribe from the broker and end the delivery loop. In-flight
    /// deliveries finish on their own task; nothing blocks on them.
    pub async fn stop_subscription(&self) -> Result<(), LookupError> {
        {
            let mut state = self.state.lock();
            if *state == SubscriberState::Stopped {
                return Ok(());
            }
            *state = SubscriberState::Stopped;
        }

        let queue_id = self.queue_id.lock().clone();
        let subscription_id = self.subscription_id.lock().clone();
        let result = match (queue_id, subscription_id) {
            (Some(queue_id), Some(subscription_id)) => self
                .broker
                .unsubscribe(&queue_id, &subscription_id)
                .await
                .map_err(|e| {
                    error!(
                        host = %self.host,
                        port = self.port,
                        "unsubscribe failed: {}",
                        e
                    );
                    e
                }),
            // never went live; nothing to release
            _ => Ok(()),
        };

        if let Some(task) = self.delivery_task.lock().take() {
            // the closed channel ends the loop; abort covers a loop stuck
            // mid-delivery so stop never waits indefinitely
            task.abort();
        }
        result
    }

    /// Probe the broker; returns the queue's creation time.
    pub async fn heartbeat(&self) -> Result<DateTime<Utc>, LookupError> {
        let queue_id = self
            .queue_id
            .lock()
            .clone()
            .ok_or_else(|| LookupError::Queue("subscriber has no queue yet".to_string()))?;
        self.broker.heartbeat(&queue_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBroker;
    use crate::queue::QueueManager;
    use lookup_api::RecordState;
    use parking_lot::Mutex as PlMutex;

    struct Recording {
        uris: PlMutex<Vec<String>>,
    }

    impl Recording {
        fn new() -> Arc<Self> {
            Arc::new(Recording {
                uris: PlMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl SubscriberListener for Recording {
        async fn on_record(&self, record: Record) {
            self.uris
                .lock()
                .push(record.uri().unwrap_or_default().to_string());
        }
    }

    fn record(uri: &str) -> Record {
        let mut record = Record::new("service");
        record.set_uri(uri);
        record.set_state(RecordState::Register);
        record
    }

    async fn queue_for(broker: &MemoryBroker, query: &Query) -> String {
        broker.get_queues(query).await.unwrap().remove(0)
    }

    #[tokio::test]
    async fn test_lifecycle_states() {
        let broker = Arc::new(MemoryBroker::new());
        let subscriber = Subscriber::new("ls.example.net", 8090, Query::new(), broker.clone());
        assert_eq!(subscriber.state(), SubscriberState::Created);

        subscriber.start_subscription().await.unwrap();
        assert_eq!(subscriber.state(), SubscriberState::Active);

        // double start is rejected without changing state
        assert!(subscriber.start_subscription().await.is_err());
        assert_eq!(subscriber.state(), SubscriberState::Active);

        subscriber.stop_subscription().await.unwrap();
        assert_eq!(subscriber.state(), SubscriberState::Stopped);

        // terminal: cannot restart a stopped subscriber
        assert!(subscriber.start_subscription().await.is_err());
    }

    #[tokio::test]
    async fn test_delivers_to_listener_attached_before_start() {
        let broker = Arc::new(MemoryBroker::new());
        let subscriber = Subscriber::new("ls.example.net", 8090, Query::new(), broker.clone());
        let listener = Recording::new();
        subscriber.add_listener(listener.clone());

        subscriber.start_subscription().await.unwrap();
        let queue_id = queue_for(&broker, &Query::new()).await;
        broker.push(&queue_id, &record("a")).await.unwrap();
        broker.push(&queue_id, &record("b")).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(*listener.uris.lock(), vec!["a", "b"]);

        subscriber.stop_subscription().await.unwrap();
    }

    #[tokio::test]
    async fn test_removed_listener_gets_nothing_more() {
        let broker = Arc::new(MemoryBroker::new());
        let subscriber = Subscriber::new("ls.example.net", 8090, Query::new(), broker.clone());
        let listener = Recording::new();
        let as_dyn: Arc<dyn SubscriberListener> = listener.clone();
        subscriber.add_listener(as_dyn.clone());
        subscriber.start_subscription().await.unwrap();

        let queue_id = queue_for(&broker, &Query::new()).await;
        broker.push(&queue_id, &record("a")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        subscriber.remove_listener(&as_dyn);
        broker.push(&queue_id, &record("b")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(*listener.uris.lock(), vec!["a"]);
        subscriber.stop_subscription().await.unwrap();
    }

    #[tokio::test]
    async fn test_heartbeat_returns_queue_creation_time() {
        let broker = Arc::new(MemoryBroker::new());
        let subscriber = Subscriber::new("ls.example.net", 8090, Query::new(), broker.clone());

        // before start there is no queue to probe
        assert!(subscriber.heartbeat().await.is_err());

        let before = Utc::now();
        subscriber.start_subscription().await.unwrap();
        let created = subscriber.heartbeat().await.unwrap();
        assert!(created >= before && created <= Utc::now());

        subscriber.stop_subscription().await.unwrap();
    }
}
