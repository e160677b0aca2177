//! Parameter binding and row decoding for the `Any` driver.

use serde_json::{Map, Number, Value};
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::{Any, Arguments, Column, Row};
use tabula_core::{PropertyKind, Resource, Schema};
use tabula_sql::{Projection, SqlValue, columns::ALIAS_SEPARATOR, ledger};

use crate::error::TransactionError;
use crate::types::ResourceState;

fn args_add<'q, T>(args: &mut AnyArguments<'q>, v: T) -> Result<(), TransactionError>
where
    T: 'q + sqlx::Encode<'q, Any> + sqlx::Type<Any>,
{
    args.add(v)
        .map_err(|e| TransactionError::Backend(sqlx::Error::Encode(e)))
}

/// Bind typed parameters in order.
pub(crate) fn bind<'q>(params: Vec<SqlValue>) -> Result<AnyArguments<'q>, TransactionError> {
    let mut args = AnyArguments::default();
    for param in params {
        match param {
            SqlValue::Null(PropertyKind::Integer) => args_add(&mut args, Option::<i64>::None)?,
            SqlValue::Null(PropertyKind::Number) => args_add(&mut args, Option::<f64>::None)?,
            SqlValue::Null(PropertyKind::Boolean) => args_add(&mut args, Option::<bool>::None)?,
            SqlValue::Null(_) => args_add(&mut args, Option::<String>::None)?,
            SqlValue::Bool(b) => args_add(&mut args, b)?,
            SqlValue::Int(i) => args_add(&mut args, i)?,
            SqlValue::Float(f) => args_add(&mut args, f)?,
            SqlValue::Text(s) => args_add(&mut args, s)?,
        }
    }
    Ok(args)
}

fn decode_error(column: &str, e: impl std::fmt::Display) -> TransactionError {
    TransactionError::Decode {
        column: column.to_string(),
        message: e.to_string(),
    }
}

/// Decode one column as a JSON value of `kind`.
///
/// Booleans and numbers fall back to integer decoding, since SQLite and MySQL
/// hand those back as integers.
pub(crate) fn decode_value(
    row: &AnyRow,
    column: &str,
    kind: PropertyKind,
) -> Result<Value, TransactionError> {
    let value = match kind {
        PropertyKind::String => row
            .try_get::<Option<String>, _>(column)
            .map_err(|e| decode_error(column, e))?
            .map(Value::String),
        PropertyKind::Integer => row
            .try_get::<Option<i64>, _>(column)
            .map_err(|e| decode_error(column, e))?
            .map(Value::from),
        PropertyKind::Number => row
            .try_get::<Option<f64>, _>(column)
            .or_else(|_| {
                row.try_get::<Option<i64>, _>(column)
                    .map(|v| v.map(|i| i as f64))
            })
            .map_err(|e| decode_error(column, e))?
            .map(|f| Number::from_f64(f).map_or(Value::Null, Value::Number)),
        PropertyKind::Boolean => row
            .try_get::<Option<bool>, _>(column)
            .or_else(|_| {
                row.try_get::<Option<i64>, _>(column)
                    .map(|v| v.map(|i| i != 0))
            })
            .map_err(|e| decode_error(column, e))?
            .map(Value::Bool),
        PropertyKind::Object | PropertyKind::Array => row
            .try_get::<Option<String>, _>(column)
            .map_err(|e| decode_error(column, e))?
            .map(|text| serde_json::from_str(&text))
            .transpose()
            .map_err(|e| decode_error(column, e))?,
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Decode a row produced by a projected SELECT.
///
/// Joined columns are nested under their relation property. A relation
/// whose columns are all NULL (no match for the LEFT JOIN) becomes `null`.
pub(crate) fn decode_projected(
    row: &AnyRow,
    schema: &Schema,
    projection: &Projection,
) -> Result<Resource, TransactionError> {
    let mut data = Map::new();
    let mut nested: Vec<(String, Map<String, Value>)> = Vec::new();

    for column in &projection.columns {
        let value = decode_value(row, &column.alias, column.kind)?;
        match &column.nested {
            None => {
                data.insert(column.property.clone(), value);
            }
            Some(key) => {
                let position = match nested.iter().position(|(k, _)| k == key) {
                    Some(position) => position,
                    None => {
                        nested.push((key.clone(), Map::new()));
                        nested.len() - 1
                    }
                };
                nested[position].1.insert(column.property.clone(), value);
            }
        }
    }

    for (key, related) in nested {
        let value = if related.values().all(Value::is_null) {
            Value::Null
        } else {
            Value::Object(related)
        };
        data.insert(key, value);
    }
    Ok(Resource::new(schema, data))
}

/// Decode a row of an arbitrary query by schema property names.
///
/// Each property is read from its `<table>__<id>` alias when present, else
/// from a bare `<id>` column. Properties without a column are skipped.
pub(crate) fn decode_by_names(row: &AnyRow, schema: &Schema) -> Result<Resource, TransactionError> {
    let names: Vec<&str> = row.columns().iter().map(|c| c.name()).collect();
    let table = schema.table_name();

    let mut data = Map::new();
    for property in &schema.properties {
        let alias = format!("{}{}{}", table, ALIAS_SEPARATOR, property.id);
        let column = if names.contains(&alias.as_str()) {
            alias.as_str()
        } else if names.contains(&property.id.as_str()) {
            property.id.as_str()
        } else {
            continue;
        };
        data.insert(property.id.clone(), decode_value(row, column, property.kind)?);
    }
    Ok(Resource::new(schema, data))
}

/// Decode a row of a state ledger SELECT.
pub(crate) fn decode_state(row: &AnyRow, schema: &Schema) -> Result<ResourceState, TransactionError> {
    let kind = schema
        .primary_key_property()
        .map(|p| p.kind)
        .unwrap_or_default();
    let id = match decode_value(row, &schema.primary_key, kind)? {
        Value::String(s) => s,
        other => other.to_string(),
    };
    let int = |column: &str| -> Result<i64, TransactionError> {
        row.try_get::<Option<i64>, _>(column)
            .map(Option::unwrap_or_default)
            .map_err(|e| decode_error(column, e))
    };
    let text = |column: &str| -> Result<String, TransactionError> {
        row.try_get::<Option<String>, _>(column)
            .map(Option::unwrap_or_default)
            .map_err(|e| decode_error(column, e))
    };

    Ok(ResourceState {
        id,
        config_version: int(ledger::CONFIG_VERSION)?,
        state_version: int(ledger::STATE_VERSION)?,
        state_error: text(ledger::STATE_ERROR)?,
        state: text(ledger::STATE)?,
        state_monitoring: text(ledger::STATE_MONITORING)?,
    })
}

/// First column of a COUNT query.
pub(crate) fn decode_count(row: &AnyRow) -> Result<u64, TransactionError> {
    let count: i64 = row.try_get(0).map_err(|e| decode_error("count", e))?;
    Ok(u64::try_from(count).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_counts_every_parameter() {
        let args = bind(vec![
            SqlValue::Null(PropertyKind::Integer),
            SqlValue::Null(PropertyKind::Object),
            SqlValue::Bool(true),
            SqlValue::Int(1),
            SqlValue::Float(0.5),
            SqlValue::Text("x".into()),
        ])
        .unwrap();
        assert_eq!(args.len(), 6);
    }
}
