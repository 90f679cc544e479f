//! Replication orchestration
//!
//! A `ReplicationService` is built from a cache descriptor: one `Source` per
//! upstream node, each carrying its configured queries (or the single
//! match-everything query when none are configured). `start` performs an
//! initial one-shot reconciliation pull per (source, query) pair, then opens
//! a persistent subscriber for the pair with this service as its listener.
//! Inbound records are routed to the local store by their lifecycle state.

use std::sync::Arc;

use tracing::{error, info, warn};
use url::Url;

use lookup_api::{Query, Record, RecordState};
use lookup_client::{QueryClient, RecordSource, SimpleLS};
use lookup_common::error::LookupError;

use crate::config::{CacheConfig, SourceConfig};
use crate::queue::Broker;
use crate::store::Store;
use crate::subscriber::{Subscriber, SubscriberListener};

/// One upstream node plus the queries replicated from it.
#[derive(Clone)]
pub struct Source {
    host: String,
    port: u16,
    queries: Vec<Query>,
    client: Arc<dyn RecordSource>,
    server: Option<SimpleLS>,
}

impl Source {
    /// `queries` may be empty, which means replicate everything.
    pub fn new(
        host: &str,
        port: u16,
        queries: Vec<Query>,
        client: Arc<dyn RecordSource>,
    ) -> Self {
        let queries = if queries.is_empty() {
            vec![Query::new()]
        } else {
            queries
        };
        Source {
            host: host.to_string(),
            port,
            queries,
            client,
            server: None,
        }
    }

    /// Attach the node handle probed before this source's pairs are opened.
    pub fn with_server(mut self, server: SimpleLS) -> Self {
        self.server = Some(server);
        self
    }

    /// Probe the source's node. Sources built without a node handle (custom
    /// record sources) are treated as reachable.
    pub async fn connect(&self) -> Result<(), LookupError> {
        match &self.server {
            Some(server) => server.connect().await,
            None => Ok(()),
        }
    }

    /// Parse a configured source. A malformed access point is fatal to the
    /// whole cache.
    pub fn from_config(config: &SourceConfig) -> Result<Self, LookupError> {
        let url = Url::parse(&config.access_point).map_err(|e| {
            LookupError::Client(format!(
                "invalid access point '{}': {}",
                config.access_point, e
            ))
        })?;
        let host = url.host_str().ok_or_else(|| {
            LookupError::Client(format!(
                "access point '{}' has no host",
                config.access_point
            ))
        })?;
        let port = url.port_or_known_default().ok_or_else(|| {
            LookupError::Client(format!(
                "access point '{}' has no port",
                config.access_point
            ))
        })?;

        let server = SimpleLS::new(host, port)?;
        Ok(Source::new(
            host,
            port,
            config.queries.clone(),
            Arc::new(QueryClient::new(server.clone())),
        )
        .with_server(server))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn queries(&self) -> &[Query] {
        &self.queries
    }
}

/// Initial reconciliation plus subscription-driven synchronization for one
/// cache's sources.
pub struct ReplicationService {
    name: String,
    sources: Vec<Source>,
    store: Arc<dyn Store>,
    broker: Arc<dyn Broker>,
    subscribers: parking_lot::RwLock<Vec<Arc<Subscriber>>>,
}

impl ReplicationService {
    pub fn new(
        name: &str,
        sources: Vec<Source>,
        store: Arc<dyn Store>,
        broker: Arc<dyn Broker>,
    ) -> Self {
        ReplicationService {
            name: name.to_string(),
            sources,
            store,
            broker,
            subscribers: parking_lot::RwLock::new(Vec::new()),
        }
    }

    /// Build from a cache descriptor. Any unparseable access point aborts
    /// the whole construction; a cache cannot be partially built.
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

    pub fn subscribers(&self) -> Vec<Arc<Subscriber>> {
        self.subscribers.read().clone()
    }

    /// Probe each source, then reconcile and subscribe every (source, query)
    /// pair. An unreachable source is logged and its pairs are skipped; a
    /// failure in one pair is logged and does not affect the others; a
    /// reconciliation failure still lets the pair's subscription open.
    pub async fn start(self: Arc<Self>) {
        info!(cache = %self.name, sources = self.sources.len(), "starting subscriber connections");

        for source in &self.sources {
            if let Err(e) = source.connect().await {
                error!(
                    cache = %self.name,
                    host = source.host(),
                    port = source.port(),
                    "source unreachable, skipping its subscriptions: {}",
                    e
                );
                continue;
            }

            for query in source.queries() {
                if let Err(e) = self.pull_records(source, query).await {
                    error!(
                        cache = %self.name,
                        host = source.host(),
                        "initial reconciliation failed: {}",
                        e
                    );
                }

                let subscriber = Arc::new(Subscriber::new(
                    source.host(),
                    source.port(),
                    query.clone(),
                    self.broker.clone(),
                ));
                let listener: Arc<dyn SubscriberListener> = self.clone();
                subscriber.add_listener(listener);
                match subscriber.start_subscription().await {
                    Ok(()) => self.subscribers.write().push(subscriber),
                    Err(e) => {
                        // this pairing aborts; the rest proceed
                        error!(
                            cache = %self.name,
                            host = source.host(),
                            port = source.port(),
                            "failed to open subscription: {}",
                            e
                        );
                    }
                }
            }
        }

        info!(
            cache = %self.name,
            subscribers = self.subscribers.read().len(),
            "created and initialized subscriber connections"
        );
    }

    /// Unsubscribe and detach every retained subscriber, best effort: a
    /// failure on one does not prevent attempting the rest.
    pub async fn stop(self: Arc<Self>) {
        let subscribers: Vec<Arc<Subscriber>> = self.subscribers.write().drain(..).collect();
        info!(cache = %self.name, count = subscribers.len(), "stopping subscriber connections");

        let listener: Arc<dyn SubscriberListener> = self.clone();
        for subscriber in subscribers {
            subscriber.remove_listener(&listener);
            if let Err(e) = subscriber.stop_subscription().await {
                error!(cache = %self.name, "failed to stop subscription: {}", e);
            }
        }
    }

    /// One-shot pull of a query's current matches, force-saving each.
    /// Per-record failures are logged and the loop continues.
    async fn pull_records(&self, source: &Source, query: &Query) -> Result<(), LookupError> {
        let records = source.client.query(query).await?;
        info!(
            cache = %self.name,
            host = source.host(),
            records = records.len(),
            "initial reconciliation pull"
        );
        for record in records {
            if let Err(e) = self.force_save(&record).await {
                error!(cache = %self.name, "error inserting record: {}", e);
            }
        }
        Ok(())
    }

    /// Route an inbound record by its lifecycle state. All store failures on
    /// this path are logged and swallowed: one bad record must not halt
    /// delivery of the ones behind it.
    async fn save(&self, record: &Record) {
        let state = match record.state() {
            Ok(Some(state)) => state,
            Ok(None) => {
                warn!(cache = %self.name, "dropping record without state");
                return;
            }
            Err(e) => {
                warn!(cache = %self.name, "dropping record with bad state: {}", e);
                return;
            }
        };

        match state {
            RecordState::Register => {
                let query = Query::matching_record(record);
                match self.store.query_and_publish(record, &query).await {
                    Ok(()) => {}
                    Err(e) if e.is_duplicate() => {
                        info!(cache = %self.name, "record already present: {}", e);
                    }
                    Err(e) => {
                        error!(cache = %self.name, "error inserting record: {}", e);
                    }
                }
            }
            RecordState::Renew | RecordState::Expire => match record.uri() {
                Some(uri) => {
                    if let Err(e) = self.store.update(uri, record).await {
                        error!(cache = %self.name, uri, "error updating record: {}", e);
                    }
                }
                None => warn!(cache = %self.name, "dropping {} record without uri", state),
            },
            RecordState::Delete => match record.uri() {
                Some(uri) => {
                    if let Err(e) = self.store.delete(uri).await {
                        error!(cache = %self.name, uri, "error deleting record: {}", e);
                    }
                }
                None => warn!(cache = %self.name, "dropping delete record without uri"),
            },
        }
    }

    /// Unconditional insert used only during initial reconciliation. Unlike
    /// [`save`](Self::save), duplicate and database errors surface to the
    /// caller, which logs them per record without aborting the loop.
    async fn force_save(&self, record: &Record) -> Result<(), LookupError> {
        let query = Query::matching_record(record);
        self.store.query_and_publish(record, &query).await
    }
}

#[async_trait::async_trait]
impl SubscriberListener for ReplicationService {
    async fn on_record(&self, record: Record) {
        self.save(&record).await;
    }
}
