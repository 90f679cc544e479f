//! Local persistence seam
//!
//! The replication engine only needs three operations from its store:
//! insert-if-no-match, update-by-uri, delete-by-uri. `MemoryStore` is the
//! in-process implementation used by tests and embedded deployments; a
//! document database backend implements the same trait.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use lookup_api::{Query, Record};
use lookup_common::error::LookupError;

/// Store collaborator contract.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert `record` if no stored entry matches `query`; a match raises a
    /// duplicate-entry error and stores nothing.
    async fn query_and_publish(&self, record: &Record, query: &Query)
        -> Result<(), LookupError>;

    /// Replace the full field set of the entry identified by `uri`.
    async fn update(&self, uri: &str, record: &Record) -> Result<(), LookupError>;

    /// Remove the entry identified by `uri`.
    async fn delete(&self, uri: &str) -> Result<(), LookupError>;
}

/// In-process store keyed by record uri. The lock serializes writes, which
/// also gives the same-uri write ordering the replication engine requires.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn get(&self, uri: &str) -> Option<Record> {
        self.entries.read().get(uri).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Entries matching a query, for inspection.
    pub fn find(&self, query: &Query) -> Vec<Record> {
        self.entries
            .read()
            .values()
            .filter(|record| query.matches(record.fields()))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn query_and_publish(
        &self,
        record: &Record,
        query: &Query,
    ) -> Result<(), LookupError> {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.values().find(|r| query.matches(r.fields())) {
            return Err(LookupError::DuplicateEntry(
                existing.uri().unwrap_or("<no uri>").to_string(),
            ));
        }

        let mut record = record.clone();
        let uri = match record.uri() {
            Some(uri) => uri.to_string(),
            None => {
                let uri = Uuid::new_v4().to_string();
                record.set_uri(&uri);
                uri
            }
        };
        entries.insert(uri, record);
        Ok(())
    }

    async fn update(&self, uri: &str, record: &Record) -> Result<(), LookupError> {
        let mut entries = self.entries.write();
        match entries.get_mut(uri) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(LookupError::Database(format!("no entry for uri: {}", uri))),
        }
    }

    async fn delete(&self, uri: &str) -> Result<(), LookupError> {
        let mut entries = self.entries.write();
        match entries.remove(uri) {
            Some(_) => Ok(()),
            None => Err(LookupError::Database(format!("no entry for uri: {}", uri))),
        }
    }
}
