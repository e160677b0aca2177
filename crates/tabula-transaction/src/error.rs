//! Transaction errors.

use tabula_core::{ConfigError, SchemaError};
use tabula_sql::CompileError;
use thiserror::Error;

/// Errors raised by [`Transaction`](crate::Transaction) operations.
///
/// Nothing is retried internally. Callers decide whether to retry a
/// serialization failure, see [`is_serialization_failure`](Self::is_serialization_failure).
#[derive(Debug, Error)]
pub enum TransactionError {
    /// The request could not be turned into SQL.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Schema or connection configuration is unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A fetch or update matched no row.
    #[error("{schema} not found")]
    NotFound { schema: String },

    /// A resource passed to update carries no primary key value.
    #[error("{schema} resource has no '{key}' value")]
    MissingId { schema: String, key: String },

    /// The database rejected a statement or the connection failed.
    #[error("database error: {0}")]
    Backend(#[from] sqlx::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    /// The transaction was committed or closed.
    #[error("transaction is closed")]
    Closed,

    /// An earlier operation was abandoned mid-flight. Only `close` is allowed.
    #[error("transaction is poisoned by an abandoned operation")]
    Poisoned,

    /// A column could not be converted to the property's kind.
    #[error("failed to decode column '{column}': {message}")]
    Decode { column: String, message: String },
}

impl TransactionError {
    /// Whether the backend aborted the transaction because of a
    /// serialization conflict or deadlock. Such transactions may be retried
    /// from the start.
    pub fn is_serialization_failure(&self) -> bool {
        match self {
            Self::Backend(sqlx::Error::Database(db)) => {
                matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
            }
            _ => false,
        }
    }

    /// Whether the error was caused by cancellation or a deadline.
    pub fn is_abandoned(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

impl From<ConfigError> for TransactionError {
    fn from(e: ConfigError) -> Self {
        Self::Configuration(e.to_string())
    }
}

impl From<SchemaError> for TransactionError {
    fn from(e: SchemaError) -> Self {
        Self::Configuration(e.to_string())
    }
}
