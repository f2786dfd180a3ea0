//! Core error types.

use dcgen_proto::RecordId;
use thiserror::Error;

/// Errors raised by the relationship, sorting and paste engine.
///
/// Every variant aborts the operation in flight. Records saved before the
/// error stay saved; there is no rollback.
#[derive(Debug, Error)]
pub enum Error {
    /// A root or parent-child condition required by the current mode is missing,
    /// or the definition is otherwise inconsistent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No parent-child condition is declared for the requested pair of types.
    #[error("no relationship declared from '{parent}' to '{child}'")]
    RelationshipMissing {
        /// Parent record type.
        parent: String,
        /// Child record type.
        child: String,
    },

    /// Malformed id, record of the wrong type, or unknown data store.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A paste request could not resolve any of after/into/top.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// A record required by the operation does not exist.
    #[error("record not found: {0}")]
    RecordNotFound(RecordId),

    /// Deep copy descended further than the configured maximum.
    #[error("deep copy exceeded maximum depth of {depth}")]
    MaxDepthExceeded {
        /// Depth at which the copy was aborted.
        depth: usize,
    },

    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),
}

impl From<dcgen_proto::Error> for Error {
    fn from(err: dcgen_proto::Error) -> Self {
        match err {
            dcgen_proto::Error::InvalidId(raw) => {
                Error::InvalidArgument(format!("malformed record id '{}'", raw))
            }
            dcgen_proto::Error::Serialization(msg) => Error::Serialization(msg),
            dcgen_proto::Error::Deserialization(msg) => Error::Deserialization(msg),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Deserialization(err.to_string())
    }
}
