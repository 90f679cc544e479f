//! Record model
//!
//! A record is a mapping from field names to values where every value is
//! either a string or an ordered list of strings. Reserved fields carry
//! type, uri, TTL, expiry, and lifecycle state. The map is never empty and
//! always contains `type`; anything else fails construction.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lookup_common::{
    error::LookupError,
    time::{format_iso_datetime, format_iso_period, parse_iso_datetime, parse_iso_period},
    RECORD_EXPIRES, RECORD_STATE, RECORD_TTL, RECORD_TYPE, RECORD_URI, STATE_DELETE, STATE_EXPIRE,
    STATE_REGISTER, STATE_RENEW,
};

/// A record field value: a single string or an ordered list of strings.
/// No other shape is permitted on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    One(String),
    Many(Vec<String>),
}

impl FieldValue {
    /// First (or only) string value, if any.
    pub fn first(&self) -> Option<&str> {
        match self {
            FieldValue::One(s) => Some(s.as_str()),
            FieldValue::Many(v) => v.first().map(String::as_str),
        }
    }

    /// All values in order.
    pub fn values(&self) -> Vec<&str> {
        match self {
            FieldValue::One(s) => vec![s.as_str()],
            FieldValue::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }

    /// Whether `value` is among this field's values.
    pub fn contains(&self, value: &str) -> bool {
        match self {
            FieldValue::One(s) => s == value,
            FieldValue::Many(v) => v.iter().any(|s| s == value),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::One(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::One(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        FieldValue::Many(value)
    }
}

impl From<Vec<&str>> for FieldValue {
    fn from(value: Vec<&str>) -> Self {
        FieldValue::Many(value.into_iter().map(str::to_string).collect())
    }
}

/// Record lifecycle state carried in the `record-state` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordState {
    Register,
    Renew,
    Expire,
    Delete,
}

impl RecordState {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordState::Register => STATE_REGISTER,
            RecordState::Renew => STATE_RENEW,
            RecordState::Expire => STATE_EXPIRE,
            RecordState::Delete => STATE_DELETE,
        }
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RecordState {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            STATE_REGISTER => Ok(RecordState::Register),
            STATE_RENEW => Ok(RecordState::Renew),
            STATE_EXPIRE => Ok(RecordState::Expire),
            STATE_DELETE => Ok(RecordState::Delete),
            other => Err(LookupError::Parser(format!(
                "unknown record state: {}",
                other
            ))),
        }
    }
}

/// A validated, versionable key/value entity representing one registered
/// resource.
///
/// Serializes as a flat JSON object of its fields. Deserialization runs the
/// same validation as construction, so a decoded `Record` is always valid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, FieldValue>", into = "BTreeMap<String, FieldValue>")]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    /// Create a record of the given type with no other fields.
    pub fn new(record_type: &str) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(RECORD_TYPE.to_string(), FieldValue::from(record_type));
        Record { fields }
    }

    /// Build a record from a field map, validating it.
    pub fn from_map(fields: BTreeMap<String, FieldValue>) -> Result<Self, LookupError> {
        validate(&fields)?;
        Ok(Record { fields })
    }

    /// Read-only view of the field map.
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Consume the record, yielding its field map.
    pub fn into_fields(self) -> BTreeMap<String, FieldValue> {
        self.fields
    }

    /// Merge `incoming` into this record, overwriting on key collision, and
    /// re-validate. On validation failure the record is left untouched.
    pub fn set_map(
        &mut self,
        incoming: BTreeMap<String, FieldValue>,
    ) -> Result<(), LookupError> {
        let mut merged = self.fields.clone();
        merged.extend(incoming);
        validate(&merged)?;
        self.fields = merged;
        Ok(())
    }

    /// Set a single field, overwriting any existing value.
    pub fn add(&mut self, key: &str, value: impl Into<FieldValue>) {
        self.fields.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Record type (the mandatory `type` field).
    pub fn record_type(&self) -> &str {
        // Guaranteed by validation.
        self.fields
            .get(RECORD_TYPE)
            .and_then(FieldValue::first)
            .unwrap_or_default()
    }

    /// Record identity for store purposes.
    pub fn uri(&self) -> Option<&str> {
        self.fields.get(RECORD_URI).and_then(FieldValue::first)
    }

    pub fn set_uri(&mut self, uri: &str) {
        self.add(RECORD_URI, uri);
    }

    /// TTL in whole seconds, decoded from the ISO-8601 period field.
    /// `None` when the field is absent.
    pub fn ttl(&self) -> Result<Option<u64>, LookupError> {
        match self.fields.get(RECORD_TTL).and_then(FieldValue::first) {
            Some(text) => parse_iso_period(text).map(Some),
            None => Ok(None),
        }
    }

    /// Store a TTL, encoded as an ISO-8601 period string.
    pub fn set_ttl(&mut self, seconds: u64) {
        self.add(RECORD_TTL, format_iso_period(seconds));
    }

    /// Expiry instant, decoded from the ISO-8601 date-time field.
    /// `None` when the field is absent.
    pub fn expires(&self) -> Result<Option<DateTime<Utc>>, LookupError> {
        match self.fields.get(RECORD_EXPIRES).and_then(FieldValue::first) {
            Some(text) => parse_iso_datetime(text).map(Some),
            None => Ok(None),
        }
    }

    /// Store an expiry instant, encoded as an ISO-8601 date-time string.
    pub fn set_expires(&mut self, instant: DateTime<Utc>) {
        self.add(RECORD_EXPIRES, format_iso_datetime(instant));
    }

    /// Lifecycle state, if set.
    pub fn state(&self) -> Result<Option<RecordState>, LookupError> {
        match self.fields.get(RECORD_STATE).and_then(FieldValue::first) {
            Some(text) => text.parse().map(Some),
            None => Ok(None),
        }
    }

    pub fn set_state(&mut self, state: RecordState) {
        self.add(RECORD_STATE, state.as_str());
    }

    /// Independent deep copy. The copy shares no storage with the original,
    /// so later mutation of either side cannot alias into the other.
    pub fn duplicate(&self) -> Record {
        self.clone()
    }
}

impl TryFrom<BTreeMap<String, FieldValue>> for Record {
    type Error = LookupError;

    fn try_from(fields: BTreeMap<String, FieldValue>) -> Result<Self, Self::Error> {
        Record::from_map(fields)
    }
}

impl From<Record> for BTreeMap<String, FieldValue> {
    fn from(record: Record) -> Self {
        record.fields
    }
}

/// The field map is never empty and always contains `type`. Value shapes are
/// enforced by `FieldValue` itself.
fn validate(fields: &BTreeMap<String, FieldValue>) -> Result<(), LookupError> {
    if fields.is_empty() {
        return Err(LookupError::RecordValidation("empty field map".to_string()));
    }
    match fields.get(RECORD_TYPE) {
        None => Err(LookupError::MissingMandatoryKey(RECORD_TYPE.to_string())),
        Some(value) if value.first().is_none() => Err(LookupError::RecordValidation(
            "mandatory key `type` has no value".to_string(),
        )),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn service_record() -> Record {
        let mut record = Record::new("service");
        record.add("record-service-type", vec!["ping"]);
        record.add("record-service-domain", vec!["example.net"]);
        record
    }

    #[test]
    fn test_construction_requires_type() {
        let map: BTreeMap<String, FieldValue> = BTreeMap::new();
        assert!(Record::from_map(map).is_err());

        let mut map = BTreeMap::new();
        map.insert("record-uri".to_string(), FieldValue::from("abc"));
        let err = Record::from_map(map).unwrap_err();
        assert!(matches!(err, LookupError::MissingMandatoryKey(ref k) if k == "type"));

        let mut map = BTreeMap::new();
        map.insert("type".to_string(), FieldValue::from("service"));
        assert!(Record::from_map(map).is_ok());
    }

    #[test]
    fn test_set_map_merges_and_overwrites() {
        let mut record = service_record();
        let mut incoming = BTreeMap::new();
        incoming.insert(
            "record-service-type".to_string(),
            FieldValue::from(vec!["owamp"]),
        );
        incoming.insert("client-uuid".to_string(), FieldValue::from("myuuid"));
        record.set_map(incoming).unwrap();

        assert_eq!(
            record.get("record-service-type").unwrap().first(),
            Some("owamp")
        );
        assert_eq!(record.get("client-uuid").unwrap().first(), Some("myuuid"));
        // untouched fields survive the merge
        assert_eq!(record.record_type(), "service");
    }

    #[test]
    fn test_set_map_rolls_back_on_failure() {
        let mut record = service_record();
        // overwriting `type` with a valueless list fails validation and the
        // whole merge is discarded, including the unrelated field
        let mut incoming = BTreeMap::new();
        incoming.insert("type".to_string(), FieldValue::Many(vec![]));
        incoming.insert("client-uuid".to_string(), FieldValue::from("myuuid"));
        assert!(record.set_map(incoming).is_err());

        assert_eq!(record.record_type(), "service");
        assert!(record.get("client-uuid").is_none());
    }

    #[test]
    fn test_ttl_round_trip() {
        for seconds in [0u64, 65, 3_600, 7_325] {
            let mut record = Record::new("service");
            record.set_ttl(seconds);
            assert_eq!(record.ttl().unwrap(), Some(seconds));
        }
    }

    #[test]
    fn test_ttl_parses_wire_form() {
        let mut record = Record::new("service");
        record.add("record-ttl", "PT2H5M");
        assert_eq!(record.ttl().unwrap(), Some(7_500));
    }

    #[test]
    fn test_ttl_absent_and_invalid() {
        let record = Record::new("service");
        assert_eq!(record.ttl().unwrap(), None);

        let mut record = Record::new("service");
        record.add("record-ttl", "2 hours");
        assert!(record.ttl().is_err());
    }

    #[test]
    fn test_expires_round_trip() {
        let instant = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let mut record = Record::new("service");
        record.set_expires(instant);
        assert_eq!(record.expires().unwrap(), Some(instant));
    }

    #[test]
    fn test_state_accessors() {
        let mut record = Record::new("service");
        assert_eq!(record.state().unwrap(), None);
        record.set_state(RecordState::Renew);
        assert_eq!(record.state().unwrap(), Some(RecordState::Renew));
        record.add("record-state", "zombie");
        assert!(record.state().is_err());
    }

    #[test]
    fn test_duplicate_is_independent() {
        let original = service_record();
        let mut copy = original.duplicate();
        copy.add("record-service-domain", vec!["other.org"]);
        assert_eq!(
            original.get("record-service-domain").unwrap().first(),
            Some("example.net")
        );
        assert_eq!(
            copy.get("record-service-domain").unwrap().first(),
            Some("other.org")
        );
    }

    #[test]
    fn test_wire_shape_round_trip() {
        let json = r#"{
            "type": ["service"],
            "record-uri": "c1fca1cb-6fb7-4bfb-91e0-cad36f52a3bd",
            "record-ttl": "PT2H5M2S",
            "record-state": "register",
            "record-service-locator": ["tcp://host.example.net:4823"]
        }"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert_eq!(record.record_type(), "service");
        assert_eq!(record.uri(), Some("c1fca1cb-6fb7-4bfb-91e0-cad36f52a3bd"));
        assert_eq!(record.state().unwrap(), Some(RecordState::Register));

        let encoded = serde_json::to_string(&record).unwrap();
        let decoded: Record = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_wire_shape_rejects_nested_values() {
        // numbers and nested objects are not legal field values
        let json = r#"{"type": "service", "ttl": 7500}"#;
        assert!(serde_json::from_str::<Record>(json).is_err());

        let json = r#"{"type": "service", "meta": {"a": "b"}}"#;
        assert!(serde_json::from_str::<Record>(json).is_err());

        let json = r#"{"type": "service", "list": ["ok", 5]}"#;
        assert!(serde_json::from_str::<Record>(json).is_err());
    }

    #[test]
    fn test_wire_shape_rejects_missing_type() {
        let json = r#"{"record-uri": "abc"}"#;
        assert!(serde_json::from_str::<Record>(json).is_err());
    }
}
