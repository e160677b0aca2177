//! Error types for the SQL crate.

use tabula_core::PropertyKind;
use thiserror::Error;

/// Errors raised while compiling a filter, projection or sort into SQL.
///
/// These always indicate a malformed request and are never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// Filter references a property the schema does not define.
    #[error("unknown property '{property}' in schema '{schema}'")]
    UnknownProperty { schema: String, property: String },

    /// Operator cannot be applied to the shape of the value.
    #[error("operator '{op}' cannot be applied to a {shape} value of '{property}'")]
    IncompatibleOperator {
        property: String,
        op: String,
        shape: &'static str,
    },

    /// The `type` of an explicit filter leaf is not supported.
    #[error("unknown filter operator '{0}'")]
    UnknownOperator(String),

    /// Literal cannot be coerced to the property's kind.
    #[error("value {value} does not match type {kind:?} of property '{property}'")]
    TypeMismatch {
        property: String,
        kind: PropertyKind,
        value: String,
    },

    /// Filter structure is not a valid expression.
    #[error("malformed filter: {0}")]
    MalformedFilter(String),

    /// Projection names a field that is not part of the schema.
    #[error("unknown field '{0}'")]
    UnknownField(String),

    /// Detail expansion follows a relation to an unregistered schema.
    #[error("property '{property}' relates to unknown schema '{target}'")]
    UnknownRelation { property: String, target: String },

    /// Sort key is not a property of the schema.
    #[error("unknown sort key '{0}'")]
    UnknownSortKey(String),
}

/// Errors raised while generating DDL.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DdlError {
    /// Schema metadata cannot be turned into a table definition.
    #[error("invalid schema configuration: {0}")]
    Configuration(String),

    /// Previously generated DDL could not be read back.
    #[error("failed to parse DDL: {0}")]
    Parse(String),
}

/// Errors raised while building a paginator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PaginationError {
    #[error("limit must be non-negative, got {0}")]
    NegativeLimit(i64),

    #[error("offset must be non-negative, got {0}")]
    NegativeOffset(i64),

    #[error("invalid value '{value}' for '{param}'")]
    InvalidNumber { param: &'static str, value: String },

    #[error("invalid sort order '{0}' (expected 'asc' or 'desc')")]
    InvalidSortOrder(String),
}
