//! Reading table definitions back from DDL text.

use sqlparser::ast::Statement;
use sqlparser::dialect::{
    Dialect as ParserDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect,
};
use sqlparser::parser::Parser;
use tabula_core::Dialect;
use tracing::debug;

use super::definition::{ColumnDefinition, IndexDefinition, TableDefinition};
use crate::error::DdlError;

/// Parse `CREATE TABLE` and `CREATE INDEX` statements into table
/// definitions, attaching each index to its table.
///
/// Other statements are ignored. Only columns and indices are recovered.
pub fn read_definitions(sql: &str, dialect: Dialect) -> Result<Vec<TableDefinition>, DdlError> {
    let parser_dialect: Box<dyn ParserDialect> = match dialect {
        Dialect::Postgres => Box::new(PostgreSqlDialect {}),
        Dialect::Mysql => Box::new(MySqlDialect {}),
        Dialect::Sqlite => Box::new(SQLiteDialect {}),
    };
    let statements = Parser::parse_sql(parser_dialect.as_ref(), sql)
        .map_err(|e| DdlError::Parse(e.to_string()))?;

    let mut tables: Vec<TableDefinition> = Vec::new();
    let mut indices: Vec<IndexDefinition> = Vec::new();
    for statement in &statements {
        match statement {
            Statement::CreateTable(create) => {
                let columns = create
                    .columns
                    .iter()
                    .map(|column| {
                        let mut def = ColumnDefinition::new(
                            column.name.value.clone(),
                            column.data_type.to_string(),
                        )
                        .nullable();
                        for option in &column.options {
                            let text = option.option.to_string();
                            if text == "NOT NULL" {
                                def.nullable = false;
                            } else if text == "UNIQUE" {
                                def.unique = true;
                            } else if let Some(default) = text.strip_prefix("DEFAULT ") {
                                def.default = Some(default.to_string());
                            }
                        }
                        def
                    })
                    .collect();
                tables.push(TableDefinition {
                    table: unquote_name(&create.name.to_string()),
                    columns,
                    ..TableDefinition::default()
                });
            }
            Statement::CreateIndex(create) => {
                let Some(name) = &create.name else {
                    continue;
                };
                indices.push(IndexDefinition {
                    name: unquote_name(&name.to_string()),
                    table: unquote_name(&create.table_name.to_string()),
                    columns: create
                        .columns
                        .iter()
                        .map(|c| unquote_name(&c.to_string()))
                        .collect(),
                    unique: create.unique,
                });
            }
            _ => {}
        }
    }

    for index in indices {
        match tables.iter_mut().find(|t| t.table == index.table) {
            Some(table) => table.indices.push(index),
            None => {
                return Err(DdlError::Parse(format!(
                    "index '{}' refers to table '{}', which is not defined",
                    index.name, index.table
                )));
            }
        }
    }

    debug!(tables = tables.len(), "Read table definitions from DDL");
    Ok(tables)
}

impl TableDefinition {
    /// Read a single table definition from previously generated DDL.
    pub fn from_ddl(sql: &str, dialect: Dialect) -> Result<Self, DdlError> {
        let mut tables = read_definitions(sql, dialect)?;
        match tables.len() {
            1 => Ok(tables.remove(0)),
            0 => Err(DdlError::Parse("no CREATE TABLE statement found".to_string())),
            n => Err(DdlError::Parse(format!(
                "expected one CREATE TABLE statement, found {}",
                n
            ))),
        }
    }
}

/// Strip identifier quoting from the last segment of a (possibly dotted)
/// name.
fn unquote_name(name: &str) -> String {
    let name = name.trim();
    let last = match name.rsplit_once('.') {
        Some((_, last)) if !is_quoted(name) => last,
        _ => name,
    };
    unquote(last)
}

fn is_quoted(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() >= 2
        && matches!(
            (bytes[0], bytes[bytes.len() - 1]),
            (b'"', b'"') | (b'`', b'`') | (b'[', b']')
        )
}

fn unquote(s: &str) -> String {
    if !is_quoted(s) {
        return s.to_string();
    }
    let quote = &s[..1];
    let inner = &s[1..s.len() - 1];
    match quote {
        "[" => inner.to_string(),
        q => inner.replace(&format!("{}{}", q, q), q),
    }
}
