//! Protocol error types.

use thiserror::Error;

/// Errors raised while building or decoding protocol values.
#[derive(Debug, Error)]
pub enum Error {
    /// A serialized record id could not be parsed.
    #[error("invalid record id '{0}'")]
    InvalidId(String),

    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed.
    #[error("deserialization error: {0}")]
    Deserialization(String),
}
