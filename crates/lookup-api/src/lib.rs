//! Lookup API - wire and data model
//!
//! Defines the `Record` entity that clients register and nodes replicate,
//! and the `Query` filter used both for subscriptions and store lookups.
//! Validation happens once at the boundary (construction/deserialization);
//! a `Record` in hand is always well formed.

pub mod model;
pub mod query;

pub use model::{FieldValue, Record, RecordState};
pub use query::{Operator, Query};
