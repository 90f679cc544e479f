//! Query model
//!
//! A query has the same shape as a record's field map, plus an optional
//! per-field operator choosing ANY-match or ALL-match semantics for
//! multi-valued fields. On the wire the operator rides in a companion key:
//! `record-service-type=ping&record-service-type-operator=any`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use lookup_common::{error::LookupError, OPERATOR_ALL, OPERATOR_ANY, OPERATOR_SUFFIX};

use crate::model::{FieldValue, Record};

/// Match semantics for a multi-valued query field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Operator {
    /// At least one query value must be present on the record field.
    Any,
    /// Every query value must be present on the record field.
    #[default]
    All,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Any => OPERATOR_ANY,
            Operator::All => OPERATOR_ALL,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Operator {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            OPERATOR_ANY => Ok(Operator::Any),
            OPERATOR_ALL => Ok(Operator::All),
            other => Err(LookupError::Query(format!("unknown operator: {}", other))),
        }
    }
}

/// A filter over records. An empty query matches everything.
///
/// Serializes as its wire map, so a query can be written straight into YAML
/// configuration or URL parameters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, FieldValue>", into = "BTreeMap<String, FieldValue>")]
pub struct Query {
    fields: BTreeMap<String, FieldValue>,
    operators: BTreeMap<String, Operator>,
}

impl Query {
    /// The unfiltered "match everything" query.
    pub fn new() -> Self {
        Query::default()
    }

    /// Build the field-for-field ALL-match query for a record, as used by
    /// the register path before insert.
    pub fn matching_record(record: &Record) -> Self {
        let mut query = Query::new();
        for (key, value) in record.fields() {
            query.fields.insert(key.clone(), value.clone());
            query.operators.insert(key.clone(), Operator::All);
        }
        query
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Add a filter field, overwriting any existing value.
    pub fn add(&mut self, key: &str, value: impl Into<FieldValue>) {
        self.fields.insert(key.to_string(), value.into());
    }

    /// Set the match operator for a field.
    pub fn set_operator(&mut self, key: &str, operator: Operator) {
        self.operators.insert(key.to_string(), operator);
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Operator for a field; unannotated fields use ALL-match.
    pub fn operator(&self, key: &str) -> Operator {
        self.operators.get(key).copied().unwrap_or_default()
    }

    /// Whether a field map satisfies this filter. Every query field must be
    /// present on the target; per-field operators decide how multi-valued
    /// fields compare.
    pub fn matches(&self, target: &BTreeMap<String, FieldValue>) -> bool {
        self.fields.iter().all(|(key, wanted)| {
            let Some(present) = target.get(key) else {
                return false;
            };
            let wanted = wanted.values();
            match self.operator(key) {
                Operator::Any => wanted.iter().any(|&v| present.contains(v)),
                Operator::All => wanted.iter().all(|&v| present.contains(v)),
            }
        })
    }

    /// Encode into the flat wire map, operators carried under
    /// `<field>-operator` keys.
    pub fn to_wire_map(&self) -> BTreeMap<String, FieldValue> {
        let mut map = BTreeMap::new();
        for (key, value) in &self.fields {
            map.insert(key.clone(), value.clone());
        }
        for (key, operator) in &self.operators {
            map.insert(
                format!("{}{}", key, OPERATOR_SUFFIX),
                FieldValue::from(operator.as_str()),
            );
        }
        map
    }

    /// Decode from a flat wire map, splitting out `<field>-operator` keys.
    /// A malformed operator value is a query error.
    pub fn from_wire_map(map: BTreeMap<String, FieldValue>) -> Result<Self, LookupError> {
        let mut query = Query::new();
        for (key, value) in map {
            match key.strip_suffix(OPERATOR_SUFFIX) {
                Some(field) if !field.is_empty() => {
                    let text = value.first().ok_or_else(|| {
                        LookupError::Query(format!("empty operator for field: {}", field))
                    })?;
                    query.operators.insert(field.to_string(), text.parse()?);
                }
                _ => {
                    query.fields.insert(key, value);
                }
            }
        }
        Ok(query)
    }
}

impl TryFrom<BTreeMap<String, FieldValue>> for Query {
    type Error = LookupError;

    fn try_from(map: BTreeMap<String, FieldValue>) -> Result<Self, Self::Error> {
        Query::from_wire_map(map)
    }
}

impl From<Query> for BTreeMap<String, FieldValue> {
    fn from(query: Query) -> Self {
        query.to_wire_map()
    }
}
