//! Table, column, index and foreign key definitions.

use serde_json::Value;
use tabula_core::Dialect;

/// One column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    pub sql_type: String,
    pub nullable: bool,
    /// Rendered default literal.
    pub default: Option<String>,
    pub unique: bool,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable: false,
            default: None,
            unique: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_default(mut self, literal: impl Into<String>) -> Self {
        self.default = Some(literal.into());
        self
    }

    /// `"name" type [DEFAULT lit] [NOT NULL] [UNIQUE]`
    pub fn render(&self, dialect: Dialect) -> String {
        let mut sql = format!("{} {}", dialect.quote_ident(&self.name), self.sql_type);
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        if self.unique {
            sql.push_str(" UNIQUE");
        }
        sql
    }
}

/// Foreign key from a local column to a column of another table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDefinition {
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
    pub on_delete_cascade: bool,
}

impl ForeignKeyDefinition {
    /// `REFERENCES "t"("c") [ON DELETE CASCADE]`
    pub fn references_clause(&self, dialect: Dialect) -> String {
        let mut sql = format!(
            "REFERENCES {}({})",
            dialect.quote_ident(&self.ref_table),
            dialect.quote_ident(&self.ref_column)
        );
        if self.on_delete_cascade {
            sql.push_str(" ON DELETE CASCADE");
        }
        sql
    }

    /// Table constraint form.
    pub fn render(&self, dialect: Dialect) -> String {
        format!(
            "FOREIGN KEY ({}) {}",
            dialect.quote_ident(&self.column),
            self.references_clause(dialect)
        )
    }
}

/// Secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl IndexDefinition {
    pub fn render(&self, dialect: Dialect) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| dialect.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "CREATE {}INDEX {} ON {}({})",
            if self.unique { "UNIQUE " } else { "" },
            dialect.quote_ident(&self.name),
            dialect.quote_ident(&self.table),
            columns
        )
    }
}

/// Physical layout of one resource table.
///
/// Derived from a schema on demand, or read back from DDL text. Definitions
/// read back from DDL carry columns and indices only.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableDefinition {
    pub table: String,
    pub columns: Vec<ColumnDefinition>,
    pub primary_key: Option<String>,
    pub foreign_keys: Vec<ForeignKeyDefinition>,
    pub indices: Vec<IndexDefinition>,
}

impl TableDefinition {
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_index(&self, name: &str) -> bool {
        self.indices.iter().any(|i| i.name == name)
    }

    pub fn foreign_key(&self, column: &str) -> Option<&ForeignKeyDefinition> {
        self.foreign_keys.iter().find(|f| f.column == column)
    }

    /// `CREATE TABLE` statement.
    pub fn create_sql(&self, dialect: Dialect) -> String {
        let mut parts: Vec<String> = self.columns.iter().map(|c| c.render(dialect)).collect();
        if let Some(pk) = &self.primary_key {
            parts.push(format!("PRIMARY KEY ({})", dialect.quote_ident(pk)));
        }
        parts.extend(self.foreign_keys.iter().map(|f| f.render(dialect)));
        format!(
            "CREATE TABLE {} ({})",
            dialect.quote_ident(&self.table),
            parts.join(", ")
        )
    }

    /// `CREATE INDEX` statements, in declaration order.
    pub fn index_sql(&self, dialect: Dialect) -> Vec<String> {
        self.indices.iter().map(|i| i.render(dialect)).collect()
    }

    /// Columns and indices present here but missing from `previous`.
    ///
    /// Removed columns are never reported.
    pub fn diff<'a>(&'a self, previous: &TableDefinition) -> TableDiff<'a> {
        TableDiff {
            columns: self
                .columns
                .iter()
                .filter(|c| previous.column(&c.name).is_none())
                .collect(),
            indices: self
                .indices
                .iter()
                .filter(|i| !previous.has_index(&i.name))
                .collect(),
        }
    }
}

/// Additions between two table definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDiff<'a> {
    pub columns: Vec<&'a ColumnDefinition>,
    pub indices: Vec<&'a IndexDefinition>,
}

impl TableDiff<'_> {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.indices.is_empty()
    }
}

/// Render a JSON default as a SQL literal.
///
/// Objects and arrays are stored as JSON text. Returns `None` for null.
pub fn default_literal(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(true) => Some("TRUE".to_string()),
        Value::Bool(false) => Some("FALSE".to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(quote_literal(s)),
        other => Some(quote_literal(&other.to_string())),
    }
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
