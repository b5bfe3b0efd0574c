//! Error types for the execution core.

use thiserror::Error;

use crate::lang::{Constraint, Type, TypeName};
use crate::types::FlowId;

/// Result alias for flow operations.
pub type FlowResult<T> = std::result::Result<T, FlowError>;

/// Failure to extract one column from one raw record.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ColumnParseError {
    #[error("not enough fields: column {column} requested, record has {available}")]
    NotEnoughFields { column: usize, available: usize },

    #[error("column {column}: cannot parse {text:?} as {type_name}")]
    InvalidValue {
        column: usize,
        type_name: TypeName,
        text: String,
    },

    #[error("column {column}: cannot parse structured type {ty}")]
    UnsupportedType { column: usize, ty: Type },

    #[error("column {column}: event time is null or not integral")]
    MissingTimestamp { column: usize },

    #[error("record body is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

/// Static type-checking failure, raised while a plan is being built.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TypeError {
    #[error("type variable {alias} requires {constraint}, got {actual}")]
    ConstraintViolation {
        alias: String,
        constraint: Constraint,
        actual: Type,
    },

    #[error("expected {expected}, got {actual}")]
    Mismatch { expected: Type, actual: Type },

    #[error("{function} takes {expected} argument(s), got {actual}")]
    Arity {
        function: String,
        expected: usize,
        actual: usize,
    },

    #[error("unknown aggregate function: {0}")]
    UnknownFunction(String),

    #[error("unknown column: {0}")]
    UnknownColumn(String),
}

/// Failures surfaced by flow elements, contexts and their orchestration.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Attaching to or detaching from an external dependency failed.
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking lifecycle wait was interrupted.
    #[error("interrupted: {0}")]
    Interrupted(String),

    /// A raw record from `source` could not be converted into an event.
    #[error("bad record from {source_id}: {error}")]
    Record {
        source_id: String,
        #[source]
        error: ColumnParseError,
    },

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("element {0} is closed")]
    Closed(String),

    #[error("flow source {0} is already bound")]
    DuplicateSource(String),

    #[error("no flow source bound as {0}")]
    UnknownSource(String),

    #[error("no such flow: {0}")]
    UnknownFlow(FlowId),

    #[error("invalid flow graph: {0}")]
    Graph(String),

    #[error("channel disconnected")]
    Disconnected,

    #[error("lock poisoned: {0}")]
    Poisoned(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] bincode::Error),
}

impl FlowError {
    /// Build an [`FlowError::Io`] from a message.
    pub fn io(msg: impl Into<String>) -> Self {
        FlowError::Io(std::io::Error::other(msg.into()))
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, FlowError::Interrupted(_))
    }
}

impl<T> From<std::sync::PoisonError<T>> for FlowError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        FlowError::Poisoned(err.to_string())
    }
}
