//! Error types for the lookup service
//!
//! `LookupError` is the domain error enum shared by every crate in the
//! workspace. Construction, parsing, and broker failures all surface as one
//! of its variants.

/// Application-specific error types
#[derive(thiserror::Error, Debug)]
pub enum LookupError {
    #[error("record validation failed: missing mandatory key: {0}")]
    MissingMandatoryKey(String),

    #[error("record validation failed: {0}")]
    RecordValidation(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("parse error: {0}")]
    Parser(String),

    #[error("client error: {0}")]
    Client(String),

    #[error("duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl LookupError {
    /// True for the benign already-present condition raised by the store's
    /// query-and-publish path.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, LookupError::DuplicateEntry(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LookupError::MissingMandatoryKey("type".to_string());
        assert_eq!(
            format!("{}", err),
            "record validation failed: missing mandatory key: type"
        );

        let err = LookupError::Queue("broker unreachable".to_string());
        assert_eq!(format!("{}", err), "queue error: broker unreachable");
    }

    #[test]
    fn test_is_duplicate() {
        assert!(LookupError::DuplicateEntry("uri".into()).is_duplicate());
        assert!(!LookupError::Database("down".into()).is_duplicate());
    }
}
