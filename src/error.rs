use serde::Serialize;
use thiserror::Error;

/// A single contract violation found while admitting a document.
///
/// Violations are data, not just messages: the validator and the integrity
/// engine collect them, callers match on them, and tests assert exact
/// variants. Offending values are rendered to strings so a violation can be
/// serialized and compared without dragging document values along.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    #[error("required field '{field}' is missing")]
    MissingField { field: String },

    #[error("field '{field}' expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("field '{field}' value '{value}' is not one of {allowed:?}")]
    InvalidEnumValue {
        field: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("field '{field}' does not match the required pattern")]
    PatternMismatch { field: String },

    #[error("duplicate key {fields:?} = {values:?}")]
    DuplicateKey {
        fields: Vec<String>,
        values: Vec<String>,
    },

    #[error("field '{field}' references missing '{value}'")]
    DanglingReference { field: String, value: String },

    #[error("rule '{rule}' violated by value {value}")]
    BusinessRule { rule: String, value: String },
}

/// Faults raised by a document store adapter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("unique index violation on {fields:?} = {values:?}")]
    DuplicateKey {
        fields: Vec<String>,
        values: Vec<String>,
    },

    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    #[error("collection already exists: {0}")]
    CollectionExists(String),

    #[error("index '{name}' on '{collection}' conflicts with an existing index")]
    IndexConflict { collection: String, name: String },

    #[error("document rejected by collection schema: {}", describe(.0))]
    DocumentRejected(Vec<Violation>),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum EduHubError {
    #[error("document rejected: {}", describe(.0))]
    Rejected(Vec<Violation>),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("malformed document in '{collection}': {source}")]
    Malformed {
        collection: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, EduHubError>;

fn describe(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
