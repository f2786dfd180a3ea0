//! CLI error type.

use thiserror::Error;

/// Errors surfaced by the `dcgen` binary.
#[derive(Debug, Error)]
pub enum CliError {
    /// Error from the engine.
    #[error(transparent)]
    Core(#[from] dcgen_core::Error),

    /// Malformed command-line input.
    #[error("{0}")]
    Usage(String),

    /// JSON output could not be produced.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<dcgen_proto::Error> for CliError {
    fn from(err: dcgen_proto::Error) -> Self {
        CliError::Core(err.into())
    }
}
