//! Schema-to-DDL generation.
//!
//! [`DdlGenerator`] derives a [`TableDefinition`] from a schema and renders it
//! as `CREATE TABLE` plus separate `CREATE INDEX` statements. Schema changes
//! are applied with [`DdlGenerator::alter_table`], which diffs the current
//! definition against a previous one: either regenerated from an older
//! schema or read back from DDL text with [`TableDefinition::from_ddl`].
//!
//! Index naming:
//!
//! - `<table>_<column>_idx` for indexed properties;
//! - `<schema id>_unique_<a>_and_<b>...` for unique groups.
//!
//! Schemas carrying `id`, `tenant_id` and `domain_id` get a unique index over
//! the three even when they do not declare that group.

mod definition;
mod reader;

use std::collections::HashSet;

use tabula_core::{Dialect, Property, Schema, SchemaRegistry};
use tracing::debug;

pub use definition::{
    ColumnDefinition, ForeignKeyDefinition, IndexDefinition, TableDefinition, TableDiff,
    default_literal,
};
pub use reader::read_definitions;

use crate::error::DdlError;
use crate::ledger;

/// Unique group added to every schema that has all of its properties.
const OWNERSHIP_GROUP: [&str; 3] = ["id", "tenant_id", "domain_id"];

/// Statements bringing a table up to date with its schema.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AlterStatements {
    /// One `ALTER TABLE ... ADD COLUMN` per new column.
    pub columns: Vec<String>,
    /// `CREATE INDEX` per new index.
    pub indices: Vec<String>,
}

impl AlterStatements {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.indices.is_empty()
    }

    /// Column changes first, then indices.
    pub fn into_statements(self) -> Vec<String> {
        let mut all = self.columns;
        all.extend(self.indices);
        all
    }
}

/// Declared unique groups, followed by the ownership group when the schema
/// has its properties and does not declare it already.
fn unique_groups(schema: &Schema) -> Vec<Vec<String>> {
    let mut groups = schema.unique_groups.clone();
    let declared = groups.iter().any(|g| {
        g.len() == OWNERSHIP_GROUP.len() && OWNERSHIP_GROUP.iter().all(|c| g.iter().any(|d| d == c))
    });
    if !declared && OWNERSHIP_GROUP.iter().all(|c| schema.has_property(c)) {
        groups.push(OWNERSHIP_GROUP.iter().map(|c| c.to_string()).collect());
    }
    groups
}

/// Generates DDL for the schemas of a registry.
#[derive(Debug, Clone, Copy)]
pub struct DdlGenerator<'a> {
    registry: &'a SchemaRegistry,
    dialect: Dialect,
    cascade: bool,
}

impl<'a> DdlGenerator<'a> {
    pub fn new(registry: &'a SchemaRegistry, dialect: Dialect) -> Self {
        Self {
            registry,
            dialect,
            cascade: false,
        }
    }

    /// Add `ON DELETE CASCADE` to every foreign key.
    pub fn with_cascade(mut self, cascade: bool) -> Self {
        self.cascade = cascade;
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Table definition for `schema`.
    pub fn table_definition(&self, schema: &Schema) -> Result<TableDefinition, DdlError> {
        let table = schema.table_name();
        if schema.primary_key_property().is_none() {
            return Err(DdlError::Configuration(format!(
                "schema '{}' has no primary key property '{}'",
                schema.id, schema.primary_key
            )));
        }

        let groups = unique_groups(schema);
        let grouped: HashSet<&str> = groups.iter().flatten().map(String::as_str).collect();
        let referenced = self.referenced_columns(schema);

        let mut columns = Vec::with_capacity(schema.properties.len());
        let mut foreign_keys = Vec::new();
        for property in &schema.properties {
            let is_pk = property.id == schema.primary_key;
            let default = property.non_null_default().and_then(default_literal);
            // MySQL rejects DEFAULT on text columns.
            let keyed = is_pk
                || default.is_some()
                || property.indexed
                || property.unique
                || property.relation.is_some()
                || grouped.contains(property.id.as_str())
                || referenced.contains(property.id.as_str());

            columns.push(ColumnDefinition {
                name: property.id.clone(),
                sql_type: property.sql_type.clone().unwrap_or_else(|| {
                    self.dialect
                        .default_sql_type(property.kind, keyed)
                        .to_string()
                }),
                nullable: property.nullable && !is_pk,
                default,
                unique: property.unique && !is_pk,
            });

            if property.relation.is_some() {
                foreign_keys.push(self.foreign_key(schema, property)?);
            }
        }

        if schema.state_versioning {
            for column in ledger::column_definitions() {
                if schema.has_property(&column.name) {
                    return Err(DdlError::Configuration(format!(
                        "property '{}' of schema '{}' collides with a state column",
                        column.name, schema.id
                    )));
                }
                columns.push(column);
            }
        }

        let mut indices: Vec<IndexDefinition> = schema
            .properties
            .iter()
            .filter(|p| p.indexed && p.id != schema.primary_key)
            .map(|p| IndexDefinition {
                name: format!("{}_{}_idx", table, p.id),
                table: table.to_string(),
                columns: vec![p.id.clone()],
                unique: false,
            })
            .collect();

        for group in &groups {
            if let Some(missing) = group.iter().find(|c| !schema.has_property(c)) {
                return Err(DdlError::Configuration(format!(
                    "unique group of schema '{}' names unknown property '{}'",
                    schema.id, missing
                )));
            }
            indices.push(IndexDefinition {
                name: format!("{}_unique_{}", schema.id, group.join("_and_")),
                table: table.to_string(),
                columns: group.clone(),
                unique: true,
            });
        }

        Ok(TableDefinition {
            table: table.to_string(),
            columns,
            primary_key: Some(schema.primary_key.clone()),
            foreign_keys,
            indices,
        })
    }

    /// `CREATE TABLE` statement and the index statements for `schema`.
    pub fn create_table(&self, schema: &Schema) -> Result<(String, Vec<String>), DdlError> {
        let definition = self.table_definition(schema)?;
        let table = definition.create_sql(self.dialect);
        let indices = definition.index_sql(self.dialect);
        debug!(
            schema = %schema.id,
            dialect = %self.dialect,
            indices = indices.len(),
            "Generated table definition"
        );
        Ok((table, indices))
    }

    /// Statements adding whatever `schema` declares beyond `previous`.
    ///
    /// Columns are never dropped or retyped. A new column is only `NOT NULL`
    /// when it has a default to fill existing rows with.
    pub fn alter_table(
        &self,
        schema: &Schema,
        previous: &TableDefinition,
    ) -> Result<AlterStatements, DdlError> {
        let current = self.table_definition(schema)?;
        let diff = current.diff(previous);
        let table = self.dialect.quote_ident(&current.table);

        let mut out = AlterStatements::default();
        for column in &diff.columns {
            let unique = column.unique;
            let added = ColumnDefinition {
                nullable: column.nullable || column.default.is_none(),
                unique: false,
                ..(*column).clone()
            };

            let mut sql = format!("ALTER TABLE {} ADD COLUMN {}", table, added.render(self.dialect));
            if let Some(fk) = current.foreign_key(&column.name) {
                match self.dialect {
                    // MySQL parses but ignores inline column references.
                    Dialect::Mysql => {
                        sql.push_str(", ADD ");
                        sql.push_str(&fk.render(self.dialect));
                    }
                    Dialect::Postgres | Dialect::Sqlite => {
                        sql.push(' ');
                        sql.push_str(&fk.references_clause(self.dialect));
                    }
                }
            }
            out.columns.push(sql);

            if unique {
                out.indices.push(
                    IndexDefinition {
                        name: format!("{}_{}_key", current.table, column.name),
                        table: current.table.clone(),
                        columns: vec![column.name.clone()],
                        unique: true,
                    }
                    .render(self.dialect),
                );
            }
        }
        out.indices
            .extend(diff.indices.iter().map(|i| i.render(self.dialect)));

        debug!(
            schema = %schema.id,
            columns = out.columns.len(),
            indices = out.indices.len(),
            "Computed table alterations"
        );
        Ok(out)
    }

    /// CREATE statements for every registered schema, each table followed by
    /// its indices, in registration order.
    pub fn create_all(&self) -> Result<Vec<String>, DdlError> {
        let mut statements = Vec::new();
        for schema in self.registry.iter() {
            let (table, indices) = self.create_table(schema)?;
            statements.push(table);
            statements.extend(indices);
        }
        Ok(statements)
    }

    fn foreign_key(
        &self,
        schema: &Schema,
        property: &Property,
    ) -> Result<ForeignKeyDefinition, DdlError> {
        let target_id = property.relation.as_deref().unwrap_or_default();
        let target = self.registry.get(target_id).ok_or_else(|| {
            DdlError::Configuration(format!(
                "property '{}' of schema '{}' relates to unknown schema '{}'",
                property.id, schema.id, target_id
            ))
        })?;
        let ref_column = property
            .relation_column
            .clone()
            .unwrap_or_else(|| target.primary_key.clone());
        if !target.has_property(&ref_column) {
            return Err(DdlError::Configuration(format!(
                "property '{}' of schema '{}' references '{}.{}', which does not exist",
                property.id, schema.id, target.id, ref_column
            )));
        }
        Ok(ForeignKeyDefinition {
            column: property.id.clone(),
            ref_table: target.table_name().to_string(),
            ref_column,
            on_delete_cascade: property.on_delete_cascade || self.cascade,
        })
    }

    /// Columns of `schema` that other schemas reference.
    fn referenced_columns(&self, schema: &Schema) -> HashSet<String> {
        self.registry
            .iter()
            .flat_map(|s| s.relations())
            .filter(|p| p.relation.as_deref() == Some(schema.id.as_str()))
            .filter_map(|p| p.relation_column.clone())
            .collect()
    }
}
