//! `tabula filter` and `tabula select` command implementations.
//!
//! Both print the SQL a transaction would run, followed by the bind
//! parameters, without touching a database.

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tabula_core::{Dialect, LockPolicy, SchemaRegistry};
use tabula_sql::{Filter, FilterCompiler, Paginator, SqlValue};
use tabula_transaction::ViewOptions;
use tabula_transaction::statements;

/// Options of `tabula select`.
#[derive(Debug, Default)]
pub struct SelectOptions {
    pub details: bool,
    pub fields: Vec<String>,
    pub paginator: Paginator,
    pub lock: LockPolicy,
}

/// Parse a filter given as a JSON object.
pub fn parse_filter(json: &str) -> Result<Filter> {
    match serde_json::from_str(json).context("filter is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("filter must be a JSON object, got {}", other),
    }
}

/// Compile a filter into a WHERE fragment.
pub fn filter(
    registry: &SchemaRegistry,
    dialect: Dialect,
    schema: &str,
    filter: &Filter,
) -> Result<String> {
    let schema = registry.require(schema)?;
    let compiled = FilterCompiler::new(schema, dialect).compile(filter)?;
    if compiled.is_empty() {
        return Ok("-- no conditions\n".to_string());
    }
    Ok(render(&compiled.sql, &compiled.params))
}

/// Build the full SELECT a list operation would run.
pub fn select(
    registry: &SchemaRegistry,
    dialect: Dialect,
    schema: &str,
    filter: &Filter,
    options: &SelectOptions,
) -> Result<String> {
    let schema = registry.require(schema)?;
    let mut view = ViewOptions::default().with_details(options.details);
    if !options.fields.is_empty() {
        view = view.with_fields(options.fields.iter().cloned());
    }
    let (statement, _) = statements::select(
        registry,
        schema,
        filter,
        &view,
        Some(&options.paginator),
        options.lock,
        dialect,
    )?;
    Ok(render(&statement.sql, &statement.params))
}

fn render(sql: &str, params: &[SqlValue]) -> String {
    let mut out = format!("{}\n", sql);
    for (i, param) in params.iter().enumerate() {
        out.push_str(&format!("-- {}: {}\n", i + 1, param));
    }
    out
}
