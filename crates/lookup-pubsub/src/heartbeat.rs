//! Cache heartbeat poller
//!
//! Runs on a fixed interval. Each cycle probes every subscriber of every
//! managed cache; a heartbeat failure is logged and the scan moves on. The
//! first subscriber found stale restarts its whole cache and ends that
//! cache's scan for the cycle: the restart rebuilds every subscriber of the
//! cache, so re-checking the remainder would only observe queues about to be
//! torn down.
//!
//! Staleness rule: the cache is stale when its last restart predates the
//! queue's creation time plus a 120-second grace window.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tracing::{debug, error, info};

use lookup_common::HEARTBEAT_GRACE_MS;

use crate::cache::Cache;

pub struct CacheHeartBeat {
    caches: Vec<Arc<Cache>>,
    interval: Duration,
    running: Arc<AtomicBool>,
}

impl CacheHeartBeat {
    pub fn new(caches: Vec<Arc<Cache>>, interval: Duration) -> Self {
        CacheHeartBeat {
            caches,
            interval,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the background poll loop.
    pub fn start(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        info!(caches = self.caches.len(), "starting cache heartbeat");
        let running = self.running.clone();
        let caches = self.caches.clone();
        let interval = self.interval;

        tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                Self::poll(&caches).await;
                tokio::time::sleep(interval).await;
            }
        });
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        info!("stopped cache heartbeat");
    }

    /// One poll cycle over every managed cache.
    pub async fn poll(caches: &[Arc<Cache>]) {
        for cache in caches {
            debug!(cache = cache.name(), "cache heartbeat");
            for subscriber in cache.subscribers() {
                match subscriber.heartbeat().await {
                    Ok(queue_created) => {
                        let stale_before =
                            queue_created + ChronoDuration::milliseconds(HEARTBEAT_GRACE_MS);
                        if cache.last_restarted() < stale_before {
                            info!(cache = cache.name(), "stale subscriber, restarting cache");
                            cache.restart().await;
                            break;
                        }
                    }
                    Err(e) => {
                        error!(cache = cache.name(), "heartbeat message failed: {}", e);
                    }
                }
            }
        }
    }
}
