//! Lookup PubSub - replication engine
//!
//! Keeps multiple lookup nodes consistent without a shared database: each
//! node subscribes to its upstream sources' notification queues and applies
//! inbound record state changes to its local store, after an initial
//! one-shot reconciliation pull per source.
//!
//! - [`queue`] defines the broker-facing capability traits
//! - [`memory`] is the in-process broker variant
//! - [`subscriber`] owns one live subscription and its listeners
//! - [`replication`] orchestrates reconciliation, subscription, and routing
//! - [`cache`] groups a source set's subscribers under one restart policy
//! - [`heartbeat`] polls subscribers and restarts stale caches
//! - [`store`] is the local persistence seam
//! - [`config`] holds the YAML-loadable configuration types

pub mod cache;
pub mod config;
pub mod heartbeat;
pub mod memory;
pub mod queue;
pub mod replication;
pub mod store;
pub mod subscriber;

pub use cache::Cache;
pub use config::{CacheConfig, QueueServiceConfig, ReplicationConfig, SourceConfig};
pub use heartbeat::CacheHeartBeat;
pub use memory::MemoryBroker;
pub use queue::{Broker, QueueManager, Subscription};
pub use replication::{ReplicationService, Source};
pub use store::{MemoryStore, Store};
pub use subscriber::{Subscriber, SubscriberListener, SubscriberState};
