//! Lookup Client - HTTP access to remote lookup nodes
//!
//! `SimpleLS` is a connection handle to one remote node; `QueryClient`
//! executes record queries against it. `RecordSource` is the seam the
//! replication engine depends on, so tests can substitute a stub source.

pub mod query_client;
pub mod simple_ls;

pub use query_client::{QueryClient, RecordSource};
pub use simple_ls::SimpleLS;
