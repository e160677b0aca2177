//! `tabula ddl` and `tabula alter` command implementations.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tabula_core::{Dialect, SchemaRegistry};
use tabula_sql::{DdlGenerator, TableDefinition};

/// CREATE TABLE and CREATE INDEX statements, for one schema or all of them.
pub fn create(
    registry: &SchemaRegistry,
    dialect: Dialect,
    schema: Option<&str>,
    cascade: bool,
) -> Result<Vec<String>> {
    let generator = DdlGenerator::new(registry, dialect).with_cascade(cascade);
    match schema {
        Some(id) => {
            let schema = registry.require(id)?;
            let (table, indices) = generator
                .create_table(schema)
                .with_context(|| format!("failed to generate DDL for schema '{}'", id))?;
            let mut statements = vec![table];
            statements.extend(indices);
            Ok(statements)
        }
        None => Ok(generator.create_all()?),
    }
}

/// ALTER statements bringing the table described by the DDL in `previous`
/// up to date with `schema`.
pub fn alter(
    registry: &SchemaRegistry,
    dialect: Dialect,
    schema: &str,
    previous: &Path,
    cascade: bool,
) -> Result<Vec<String>> {
    let schema = registry.require(schema)?;
    let sql = fs::read_to_string(previous)
        .with_context(|| format!("failed to read {}", previous.display()))?;
    let existing = TableDefinition::from_ddl(&sql, dialect)
        .with_context(|| format!("failed to parse {}", previous.display()))?;

    let statements = DdlGenerator::new(registry, dialect)
        .with_cascade(cascade)
        .alter_table(schema, &existing)?
        .into_statements();
    tracing::info!(
        schema = %schema.id,
        statements = statements.len(),
        "Computed alterations"
    );
    Ok(statements)
}

/// Join statements into a script, one per line.
pub fn script(statements: &[String]) -> String {
    statements
        .iter()
        .map(|s| format!("{};\n", s))
        .collect()
}
