//! Typed bind parameters.
//!
//! Literals arrive as untyped JSON. Before binding they are coerced by the
//! kind of the property they are compared with or written to, so strictly
//! typed backends receive parameters of the column's type.

use serde_json::Value;
use tabula_core::{Property, PropertyKind};

use crate::error::CompileError;

/// A single positional parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// Typed NULL. The kind selects the bind type.
    Null(PropertyKind),
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SqlValue {
    /// Coerce `value` to the storage representation of `property`.
    ///
    /// Objects and arrays are stored as serialized JSON text. Strings are
    /// accepted for numeric and boolean kinds when they parse, since filters
    /// built from query strings only carry text.
    pub fn coerce(property: &Property, value: &Value) -> Result<Self, CompileError> {
        let mismatch = || CompileError::TypeMismatch {
            property: property.id.clone(),
            kind: property.kind,
            value: value.to_string(),
        };

        if value.is_null() {
            return Ok(Self::Null(property.kind));
        }

        match property.kind {
            PropertyKind::String => match value {
                Value::String(s) => Ok(Self::Text(s.clone())),
                Value::Number(n) => Ok(Self::Text(n.to_string())),
                Value::Bool(b) => Ok(Self::Text(b.to_string())),
                _ => Err(mismatch()),
            },
            PropertyKind::Integer => match value {
                Value::Number(n) => n.as_i64().map(Self::Int).ok_or_else(mismatch),
                Value::String(s) => s.trim().parse().map(Self::Int).map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            PropertyKind::Number => match value {
                Value::Number(n) => n.as_f64().map(Self::Float).ok_or_else(mismatch),
                Value::String(s) => s.trim().parse().map(Self::Float).map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            PropertyKind::Boolean => match value {
                Value::Bool(b) => Ok(Self::Bool(*b)),
                Value::String(s) if s == "true" => Ok(Self::Bool(true)),
                Value::String(s) if s == "false" => Ok(Self::Bool(false)),
                _ => Err(mismatch()),
            },
            PropertyKind::Object | PropertyKind::Array => Ok(Self::Text(value.to_string())),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(_))
    }
}

/// Literal form, for logs and diagnostics only. Never spliced into SQL.
impl std::fmt::Display for SqlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null(_) => f.write_str("NULL"),
            Self::Bool(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    /// `None` becomes an untyped (string) NULL.
    fn from(v: Option<T>) -> Self {
        v.map(Into::into)
            .unwrap_or(Self::Null(PropertyKind::String))
    }
}
