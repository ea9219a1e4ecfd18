//! Error types for the data-access layer.
//!
//! All error variants are defined with `thiserror`. Errors propagate
//! synchronously to the immediate caller; nothing in this layer retries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbalError {
    /// Missing or invalid connection parameters. Fatal to `get_connection`.
    #[error("Invalid connection configuration: {message}")]
    Configuration { message: String },

    /// Connect failure or unsupported server version. Never retried here.
    #[error("Connection failed: {message}")]
    Connection { message: String },

    /// Any failure during prepare/bind/execute. The driver diagnostic is
    /// passed through verbatim.
    #[error("Query failed: {message}")]
    Query {
        message: String,
        /// e.g. "42S02" for an unknown table
        sql_state: Option<String>,
    },

    /// Caller handed a persistence helper something it cannot work with.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl DbalError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a query error without an SQLSTATE code.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql_state: None,
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// SQLSTATE code reported by the server, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Query { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }
}

/// Convert sqlx errors raised during statement execution.
///
/// Connect-time failures are wrapped explicitly by the registry; everything
/// the executor sees surfaces as a query error with the original message.
impl From<sqlx::Error> for DbalError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => DbalError::Query {
                message: db_err.message().to_string(),
                sql_state: db_err.code().map(|c| c.to_string()),
            },
            sqlx::Error::ColumnNotFound(col) => {
                DbalError::query(format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbalError::query(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbalError::query(format!("Decode error: {}", source)),
            other => DbalError::query(other.to_string()),
        }
    }
}

/// Result type alias for data-access operations.
pub type DbalResult<T> = Result<T, DbalError>;
