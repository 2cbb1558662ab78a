//! Error types for shared Bloom filters
//!
//! Every public operation fails with a [`FilterError`], which carries the
//! filter name and the operation that failed alongside the underlying
//! [`FilterErrorKind`].

use std::fmt;

use thiserror::Error;

/// Invalid construction parameters or an unusable store
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Expected item count must be greater than zero")]
    InvalidExpectedItems,

    #[error("Invalid false positive rate: {fpr} (must be strictly between 0 and 1)")]
    InvalidFalsePositiveRate { fpr: f64 },

    #[error("Filter size exceeds maximum: {bits} bits > {max} bits")]
    FilterTooLarge { bits: u64, max: u64 },

    #[error("Invalid filter name: {0}")]
    InvalidName(String),

    #[error("Store is missing required capability: {0}")]
    MissingCapability(&'static str),

    #[error("Invalid option: {0}")]
    InvalidOption(String),
}

/// Element could not be turned into hashable bytes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("Element is empty")]
    EmptyElement,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failures reported by the backing store, passed through untouched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timeout")]
    Timeout,

    #[error("Cancelled")]
    Cancelled,

    #[error("Batch aborted: {0}")]
    Aborted(String),

    #[error("Key {key} holds a value of the wrong type")]
    WrongType { key: String },

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// What went wrong, independent of which filter it happened to
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterErrorKind {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Counter {field} is already at zero")]
    Underflow { field: String },

    #[error("Persisted {field} is {stored}, expected {expected}")]
    Consistency {
        field: &'static str,
        stored: i64,
        expected: i64,
    },
}

/// Filter operation names attached to errors and log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Open,
    Add,
    Exists,
    Remove,
    Count,
    Estimate,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Open => "open",
            Operation::Add => "add",
            Operation::Exists => "exists",
            Operation::Remove => "remove",
            Operation::Count => "count",
            Operation::Estimate => "estimate",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by every public filter operation
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{operation} on filter '{filter}' failed: {kind}")]
pub struct FilterError {
    filter: String,
    operation: Operation,
    #[source]
    kind: FilterErrorKind,
}

impl FilterError {
    pub fn new(filter: impl Into<String>, operation: Operation, kind: impl Into<FilterErrorKind>) -> Self {
        Self {
            filter: filter.into(),
            operation,
            kind: kind.into(),
        }
    }

    /// Name of the filter the operation targeted
    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn kind(&self) -> &FilterErrorKind {
        &self.kind
    }

    pub fn into_kind(self) -> FilterErrorKind {
        self.kind
    }

    pub fn is_config(&self) -> bool {
        matches!(self.kind, FilterErrorKind::Config(_))
    }

    pub fn is_encoding(&self) -> bool {
        matches!(self.kind, FilterErrorKind::Encoding(_))
    }

    pub fn is_store(&self) -> bool {
        matches!(self.kind, FilterErrorKind::Store(_))
    }

    pub fn is_underflow(&self) -> bool {
        matches!(self.kind, FilterErrorKind::Underflow { .. })
    }

    pub fn is_consistency(&self) -> bool {
        matches!(self.kind, FilterErrorKind::Consistency { .. })
    }
}
