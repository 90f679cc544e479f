//! Cache: a named group of subscribers with a shared restart policy
//!
//! The cache owns its `ReplicationService` and rebuilds it wholesale on
//! restart: existing subscriber connections are torn down, a new service is
//! constructed from the same sources, and the restart timestamp is bumped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{error, info};

use lookup_common::error::LookupError;

use crate::config::CacheConfig;
use crate::queue::Broker;
use crate::replication::{ReplicationService, Source};
use crate::store::Store;
use crate::subscriber::Subscriber;

pub struct Cache {
    name: String,
    sources: Vec<Source>,
    store: Arc<dyn Store>,
    broker: Arc<dyn Broker>,
    service: RwLock<Option<Arc<ReplicationService>>>,
    last_restarted: Mutex<DateTime<Utc>>,
}

impl Cache {
    pub fn new(
        name: &str,
        sources: Vec<Source>,
        store: Arc<dyn Store>,
        broker: Arc<dyn Broker>,
    ) -> Self {
        Cache {
            name: name.to_string(),
            sources,
            store,
            broker,
            service: RwLock::new(None),
            last_restarted: Mutex::new(Utc::now()),
        }
    }

    /// Build from configuration. A malformed access point on any source is
    /// fatal; the cache cannot be partially built.
    pub fn from_config(
        config: &CacheConfig,
        store: Arc<dyn Store>,
        broker: Arc<dyn Broker>,
    ) -> Result<Self, LookupError> {
        let sources = config
            .sources
            .iter()
            .map(Source::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(&config.name, sources, store, broker))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Subscribers of the current service generation.
    pub fn subscribers(&self) -> Vec<Arc<Subscriber>> {
        self.service
            .read()
            .as_ref()
            .map(|service| service.subscribers())
            .unwrap_or_default()
    }

    pub fn last_restarted(&self) -> DateTime<Utc> {
        *self.last_restarted.lock()
    }

    /// Build and start the replication service. Idempotent: an already
    /// running cache is left alone. The slot is claimed before the first
    /// await, so concurrent callers cannot build a second generation.
    pub async fn start(&self) {
        let service = {
            let mut slot = self.service.write();
            if slot.is_some() {
                return;
            }
            let service = Arc::new(ReplicationService::new(
                &self.name,
                self.sources.clone(),
                self.store.clone(),
                self.broker.clone(),
            ));
            *slot = Some(service.clone());
            service
        };
        service.start().await;
        *self.last_restarted.lock() = Utc::now();
        info!(cache = %self.name, "cache started");
    }

    pub async fn stop(&self) {
        let service = self.service.write().take();
        if let Some(service) = service {
            service.stop().await;
            info!(cache = %self.name, "cache stopped");
        }
    }

    /// Tear down every subscriber and rebuild the whole set. Teardown
    /// failures are logged; the rebuild proceeds regardless so a wedged
    /// broker connection cannot pin the cache in a stale state.
    pub async fn restart(&self) {
        info!(cache = %self.name, "restarting cache");
        let (old, service) = {
            let mut slot = self.service.write();
            let old = slot.take();
            let service = Arc::new(ReplicationService::new(
                &self.name,
                self.sources.clone(),
                self.store.clone(),
                self.broker.clone(),
            ));
            *slot = Some(service.clone());
            (old, service)
        };
        if let Some(old) = old {
            old.stop().await;
        } else {
            error!(cache = %self.name, "restart requested but cache was not running");
        }

        service.start().await;
        *self.last_restarted.lock() = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBroker;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use lookup_api::{Query, Record};
    use lookup_client::RecordSource;

    struct EmptySource;

    #[async_trait]
    impl RecordSource for EmptySource {
        async fn query(&self, _query: &Query) -> Result<Vec<Record>, LookupError> {
            Ok(vec![])
        }
    }

    fn cache_with_one_source() -> Cache {
        let source = Source::new("a.example.net", 8090, vec![], Arc::new(EmptySource));
        Cache::new(
            "cache-a",
            vec![source],
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryBroker::new()),
        )
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let cache = cache_with_one_source();
        assert!(cache.subscribers().is_empty());

        cache.start().await;
        assert_eq!(cache.subscribers().len(), 1);
        let first = cache.last_restarted();

        cache.start().await;
        assert_eq!(cache.subscribers().len(), 1);
        assert_eq!(cache.last_restarted(), first);

        cache.stop().await;
        assert!(cache.subscribers().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_starts_build_one_generation() {
        use crate::queue::{QueueManager, Subscription};
        use chrono::{DateTime, Utc};
        use parking_lot::Mutex as PlMutex;

        /// Counts subscriptions opened through it; everything delegates.
        struct CountingBroker {
            inner: MemoryBroker,
            subscribes: PlMutex<u32>,
        }

        #[async_trait]
        impl QueueManager for CountingBroker {
            async fn get_queues(&self, query: &Query) -> Result<Vec<String>, LookupError> {
                self.inner.get_queues(query).await
            }

            async fn push(&self, queue_id: &str, record: &Record) -> Result<(), LookupError> {
                self.inner.push(queue_id, record).await
            }
        }

        #[async_trait]
        impl Broker for CountingBroker {
            async fn subscribe(&self, queue_id: &str) -> Result<Subscription, LookupError> {
                *self.subscribes.lock() += 1;
                self.inner.subscribe(queue_id).await
            }

            async fn heartbeat(&self, queue_id: &str) -> Result<DateTime<Utc>, LookupError> {
                self.inner.heartbeat(queue_id).await
            }

            async fn unsubscribe(
                &self,
                queue_id: &str,
                subscription_id: &str,
            ) -> Result<(), LookupError> {
                self.inner.unsubscribe(queue_id, subscription_id).await
            }
        }

        let broker = Arc::new(CountingBroker {
            inner: MemoryBroker::new(),
            subscribes: PlMutex::new(0),
        });
        let source = Source::new("a.example.net", 8090, vec![], Arc::new(EmptySource));
        let cache = Cache::new(
            "cache-a",
            vec![source],
            Arc::new(MemoryStore::new()),
            broker.clone(),
        );

        tokio::join!(cache.start(), cache.start());
        assert_eq!(cache.subscribers().len(), 1);
        assert_eq!(*broker.subscribes.lock(), 1);
        cache.stop().await;
    }

    #[tokio::test]
    async fn test_restart_rebuilds_subscribers_and_bumps_timestamp() {
        let cache = cache_with_one_source();
        cache.start().await;
        let old_subscribers = cache.subscribers();
        let before = cache.last_restarted();

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        cache.restart().await;

        let new_subscribers = cache.subscribers();
        assert_eq!(new_subscribers.len(), 1);
        assert!(!Arc::ptr_eq(&old_subscribers[0], &new_subscribers[0]));
        assert!(cache.last_restarted() > before);

        cache.stop().await;
    }
}
