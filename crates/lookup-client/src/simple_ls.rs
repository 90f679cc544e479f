//! Connection handle for one remote lookup node

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::Client;
use url::Url;

use lookup_common::error::LookupError;

const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_READ_TIMEOUT_MS: u64 = 30_000;

/// Path serving record queries on a lookup node.
pub const RECORDS_PATH: &str = "lookup/records";

/// A handle to one remote lookup node (host and port), carrying the
/// configured HTTP client. Cloning is cheap; the underlying connection pool
/// is shared.
#[derive(Clone, Debug)]
pub struct SimpleLS {
    host: String,
    port: u16,
    base: Url,
    client: Client,
    connected: std::sync::Arc<AtomicBool>,
}

impl SimpleLS {
    /// Create a handle with default timeouts. Fails if the host does not
    /// form a valid URL.
    pub fn new(host: &str, port: u16) -> Result<Self, LookupError> {
        Self::with_timeouts(
            host,
            port,
            Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
        )
    }

    pub fn with_timeouts(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, LookupError> {
        let base = Url::parse(&format!("http://{}:{}/", host, port))
            .map_err(|e| LookupError::Client(format!("invalid host '{}': {}", host, e)))?;
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()
            .map_err(|e| LookupError::Client(format!("failed to build http client: {}", e)))?;
        Ok(SimpleLS {
            host: host.to_string(),
            port,
            base,
            client,
            connected: std::sync::Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// URL of the record query endpoint.
    pub fn records_url(&self) -> Url {
        // base always ends in '/', join cannot fail for a constant path
        self.base.join(RECORDS_PATH).unwrap_or_else(|_| self.base.clone())
    }

    /// Probe the node. Any HTTP response counts as reachable; only transport
    /// failures are errors.
    pub async fn connect(&self) -> Result<(), LookupError> {
        self.client
            .get(self.records_url())
            .send()
            .await
            .map_err(|e| {
                LookupError::Client(format!(
                    "cannot reach {}:{}: {}",
                    self.host, self.port, e
                ))
            })?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
