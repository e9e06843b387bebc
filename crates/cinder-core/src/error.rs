//! Error types for Cinder
//!
//! Every failure of the query front end is local to one call: the caller fixes
//! the input and submits it again.

use std::time::Duration;
use thiserror::Error;

/// The main error type for Cinder operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // ========== Parse Errors ==========
    #[error("Query parse error at position {position}: {message}")]
    QueryParse { position: usize, message: String },

    #[error("Given edge_type {edge_type} is not available. Use one of {allowed:?}")]
    InvalidEdgeType {
        edge_type: String,
        allowed: Vec<String>,
    },

    // ========== Rewrite Errors ==========
    #[error("Invalid merge path: {0}")]
    InvalidMergePath(String),

    #[error("Incompatible query: {0}")]
    IncompatibleQuery(String),

    // ========== Execution Errors ==========
    /// Raised by the execution engine, never by the query front end.
    #[error("Query took too long (timeout {timeout:?})")]
    QueryTookTooLong { timeout: Duration },

    // ========== Configuration Errors ==========
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

/// Result type alias for Cinder operations
pub type Result<T> = std::result::Result<T, Error>;

const TOOK_TOO_LONG_GUIDANCE: &str = "Query took too long.\n\
Try one of the following:\n\
- refine your query\n\
- add a limit to your query\n\
- define a longer timeout via env var query_timeout\n  \
e.g. $> query_timeout=60s query all\n";

impl Error {
    /// Create a parse error at the given byte offset
    pub fn parse<S: Into<String>>(position: usize, message: S) -> Self {
        Error::QueryParse {
            position,
            message: message.into(),
        }
    }

    /// Returns true if the query text could not be parsed
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Error::QueryParse { .. } | Error::InvalidEdgeType { .. })
    }

    /// Returns true if resubmitting with different settings may succeed.
    ///
    /// Errors of the query front end are caused by the input itself.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::QueryTookTooLong { .. })
    }

    /// Actionable advice for errors that renderers present to the user
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Error::QueryTookTooLong { .. } => Some(TOOK_TOO_LONG_GUIDANCE),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Deserialization(err.to_string())
    }
}
