//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout MINIQUERY.
//! Every error maps to a stable error code so hosts can decide whether to
//! continue the session or exit.
//!
//! # Error Categories
//! - `InconsistentQueryType`: two signals imply different query kinds
//! - `DriverError`: the database engine rejected or failed a statement
//! - `ConnectionFailed`: the database could not be opened
//! - `MissingTable`: a query needs a table name and none was supplied
//! - `InfeasibleQuery`: a token has no interpretation in the terse grammar
//! - `InvalidInput`: malformed command arguments
//! - `ConfigError`: settings file or session seeding errors
//! - `Io`: the output sink rejected a write
//!
//! An empty result set is not an error; see [`crate::session::Outcome`].

use thiserror::Error;

/// Main error type for MINIQUERY operations
#[derive(Error, Debug)]
pub enum MiniError {
    /// Command/flag indicator and operator indicator (or two operators) disagree
    #[error("Inconsistent query type: '{first}' conflicts with '{second}'")]
    InconsistentQueryType { first: String, second: String },

    /// Engine failure, native diagnostic text kept verbatim
    #[error("{0}")]
    DriverError(String),

    /// Database could not be opened
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query command without a table name
    #[error("First non-option argument must be a table name.")]
    MissingTable,

    /// No feasible interpretation for a token
    #[error("Illegal grammar / no feasible interpretation for \"{0}\".")]
    InfeasibleQuery(String),

    /// Invalid input or missing required parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error (file not found, invalid JSON, reseeding, etc.)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Output could not be written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MiniError {
    /// Convert error to a stable error code string
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InconsistentQueryType { .. } => "INCONSISTENT_QUERY_TYPE",
            Self::DriverError(_) => "DRIVER_ERROR",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::MissingTable => "MISSING_ARGUMENT",
            Self::InfeasibleQuery(_) => "INFEASIBLE_EXPR",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
        }
    }

    /// Get human-readable error message
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create an inconsistent query type error naming both indicators
    pub fn inconsistent_query_type(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self::InconsistentQueryType { first: first.into(), second: second.into() }
    }

    /// Create a driver error carrying the engine's text
    pub fn driver_error(message: impl Into<String>) -> Self {
        Self::DriverError(message.into())
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    /// Create an infeasible query error for the offending token
    pub fn infeasible(token: impl Into<String>) -> Self {
        Self::InfeasibleQuery(token.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }
}

/// Result type alias for MINIQUERY operations
pub type Result<T> = std::result::Result<T, MiniError>;
