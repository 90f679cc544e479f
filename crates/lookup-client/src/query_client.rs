//! Record queries against a remote lookup node
//!
//! Used by the replication engine for its initial reconciliation pull: the
//! query's wire map becomes URL parameters, the response is a JSON array of
//! record field maps.

use async_trait::async_trait;
use tracing::debug;

use lookup_api::{Query, Record};
use lookup_common::error::LookupError;

use crate::simple_ls::SimpleLS;

/// Anything records can be pulled from with a query.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn query(&self, query: &Query) -> Result<Vec<Record>, LookupError>;
}

/// HTTP-backed record source for one remote node.
pub struct QueryClient {
    server: SimpleLS,
}

impl QueryClient {
    pub fn new(server: SimpleLS) -> Self {
        QueryClient { server }
    }

    pub fn server(&self) -> &SimpleLS {
        &self.server
    }
}

#[async_trait]
impl RecordSource for QueryClient {
    async fn query(&self, query: &Query) -> Result<Vec<Record>, LookupError> {
        // multi-valued fields travel comma-joined, matching the server's
        // query-string convention
        let params: Vec<(String, String)> = query
            .to_wire_map()
            .into_iter()
            .map(|(key, value)| (key, value.values().join(",")))
            .collect();

        debug!(
            host = self.server.host(),
            port = self.server.port(),
            params = params.len(),
            "executing remote record query"
        );

        let response = self
            .server
            .client()
            .get(self.server.records_url())
            .query(&params)
            .send()
            .await
            .map_err(|e| {
                LookupError::Client(format!(
                    "query to {}:{} failed: {}",
                    self.server.host(),
                    self.server.port(),
                    e
                ))
            })?;

        if !response.status().is_success() {
            return Err(LookupError::Query(format!(
                "query to {}:{} returned {}",
                self.server.host(),
                self.server.port(),
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| LookupError::Client(format!("failed reading query response: {}", e)))?;
        let records: Vec<Record> = serde_json::from_str(&body)
            .map_err(|e| LookupError::Parser(format!("malformed query response: {}", e)))?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_shape_decodes() {
        let body = r#"[
            {"type": ["service"], "record-uri": "a", "record-state": "register"},
            {"type": ["service"], "record-uri": "b", "record-state": "renew"}
        ]"#;
        let records: Vec<Record> = serde_json::from_str(body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].uri(), Some("b"));
    }

    #[test]
    fn test_invalid_record_in_response_fails_whole_parse() {
        // second element is missing the mandatory type key
        let body = r#"[{"type": "service"}, {"record-uri": "b"}]"#;
        assert!(serde_json::from_str::<Vec<Record>>(body).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_source_is_client_error() {
        let server = SimpleLS::with_timeouts(
            "127.0.0.1",
            59997,
            std::time::Duration::from_millis(300),
            std::time::Duration::from_millis(300),
        )
        .unwrap();
        let client = QueryClient::new(server);
        let err = client.query(&Query::new()).await.unwrap_err();
        assert!(matches!(err, LookupError::Client(_)));
    }
}
