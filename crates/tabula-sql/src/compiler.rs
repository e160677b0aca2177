//! Filter-to-SQL compilation.
//!
//! Renders a [`Predicate`] into a parameterized WHERE fragment for one
//! dialect. Identifiers are always quoted and literals always bound.
//!
//! | Leaf | eq | neq |
//! |------|----|-----|
//! | scalar | `col = $1` | `col <> $1` |
//! | null | `col IS NULL` | `col IS NOT NULL` |
//! | sequence | `col IN ($1, $2)` | `col NOT IN ($1, $2)` |
//! | empty sequence | `(1=0)` | `(1=1)` |
//! | search | `col LIKE $1` | rejected |
//!
//! Compounds render as `(a AND b)` / `(a OR b)`; an empty AND is `(1=1)` and
//! an empty OR is `(1=0)`. Entries at the root are joined with ` AND `
//! without surrounding parentheses.

use tabula_core::{Dialect, Property, PropertyKind, Schema, dialect::contains_pattern};
use tracing::trace;

use crate::builder::StatementBuilder;
use crate::error::CompileError;
use crate::filter::{CompareOp, Filter, FilterValue, Predicate};
use crate::value::SqlValue;

const TRUE_SQL: &str = "(1=1)";
const FALSE_SQL: &str = "(1=0)";

/// A compiled WHERE fragment and its bind parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledPredicate {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl CompiledPredicate {
    /// True when the filter places no restriction (empty root).
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

/// Compiles filters for one schema and dialect.
#[derive(Debug, Clone, Copy)]
pub struct FilterCompiler<'a> {
    schema: &'a Schema,
    dialect: Dialect,
    qualifier: Option<&'a str>,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(schema: &'a Schema, dialect: Dialect) -> Self {
        Self {
            schema,
            dialect,
            qualifier: None,
        }
    }

    /// Qualify every column with `table`.
    pub fn qualified(mut self, table: &'a str) -> Self {
        self.qualifier = Some(table);
        self
    }

    /// Compile a raw filter into a standalone fragment with placeholders
    /// numbered from one.
    pub fn compile(&self, filter: &Filter) -> Result<CompiledPredicate, CompileError> {
        let mut builder = StatementBuilder::new(self.dialect);
        self.compile_into(filter, &mut builder)?;
        let (sql, params) = builder.finish();
        Ok(CompiledPredicate { sql, params })
    }

    /// Append a raw filter to `builder`, continuing its placeholder
    /// numbering. Returns whether anything was written.
    pub fn compile_into(
        &self,
        filter: &Filter,
        builder: &mut StatementBuilder,
    ) -> Result<bool, CompileError> {
        let predicate = Predicate::parse(self.schema, filter)?;
        self.render_root(&predicate, builder)
    }

    /// Append a typed predicate to `builder`. A root-level AND is rendered
    /// without parentheses, like a parsed filter.
    pub fn render_root(
        &self,
        predicate: &Predicate,
        builder: &mut StatementBuilder,
    ) -> Result<bool, CompileError> {
        predicate.validate(self.schema)?;
        let written = match predicate {
            Predicate::And(children) if children.is_empty() => false,
            Predicate::And(children) => {
                builder.push_separated(children, " AND ", |b, child| self.render(child, b))?;
                true
            }
            other => {
                self.render(other, builder)?;
                true
            }
        };
        trace!(
            schema = %self.schema.id,
            sql = builder.sql(),
            params = builder.params().len(),
            "Compiled filter"
        );
        Ok(written)
    }

    fn render(&self, predicate: &Predicate, b: &mut StatementBuilder) -> Result<(), CompileError> {
        match predicate {
            Predicate::Const(true) => {
                b.push_sql(TRUE_SQL);
            }
            Predicate::Const(false) => {
                b.push_sql(FALSE_SQL);
            }
            Predicate::And(children) => self.render_group(children, " AND ", TRUE_SQL, b)?,
            Predicate::Or(children) => self.render_group(children, " OR ", FALSE_SQL, b)?,
            Predicate::Compare {
                property,
                op,
                value,
            } => {
                let property = self.property(property)?;
                self.render_compare(property, *op, value, b)?;
            }
        }
        Ok(())
    }

    fn render_group(
        &self,
        children: &[Predicate],
        sep: &str,
        empty: &str,
        b: &mut StatementBuilder,
    ) -> Result<(), CompileError> {
        if children.is_empty() {
            b.push_sql(empty);
            return Ok(());
        }
        b.push_sql("(");
        b.push_separated(children, sep, |b, child| self.render(child, b))?;
        b.push_sql(")");
        Ok(())
    }

    fn render_compare(
        &self,
        property: &Property,
        op: CompareOp,
        value: &FilterValue,
        b: &mut StatementBuilder,
    ) -> Result<(), CompileError> {
        match value {
            FilterValue::Search(text) => {
                if property.kind == PropertyKind::String {
                    b.push_column(self.qualifier, &property.id);
                } else {
                    let column = self.column_expr(&property.id);
                    b.push_sql(&self.dialect.text_cast(&column));
                }
                b.push_sql(" LIKE ")
                    .push_param(SqlValue::Text(contains_pattern(text)))
                    .push_sql(self.dialect.like_escape_clause());
            }
            FilterValue::Sequence(items) if items.is_empty() => {
                b.push_sql(match op {
                    CompareOp::Eq => FALSE_SQL,
                    CompareOp::Neq => TRUE_SQL,
                });
            }
            FilterValue::Sequence(items) => {
                let params = items
                    .iter()
                    .map(|v| SqlValue::coerce(property, v))
                    .collect::<Result<Vec<_>, _>>()?;
                b.push_column(self.qualifier, &property.id).push_sql(match op {
                    CompareOp::Eq => " IN (",
                    CompareOp::Neq => " NOT IN (",
                });
                b.push_separated(params, ", ", |b, p| {
                    b.push_param(p);
                    Ok::<_, CompileError>(())
                })?;
                b.push_sql(")");
            }
            FilterValue::Scalar(v) if v.is_null() => {
                b.push_column(self.qualifier, &property.id).push_sql(match op {
                    CompareOp::Eq => " IS NULL",
                    CompareOp::Neq => " IS NOT NULL",
                });
            }
            FilterValue::Scalar(v) => {
                let param = SqlValue::coerce(property, v)?;
                b.push_column(self.qualifier, &property.id)
                    .push_sql(match op {
                        CompareOp::Eq => " = ",
                        CompareOp::Neq => " <> ",
                    })
                    .push_param(param);
            }
        }
        Ok(())
    }

    fn property(&self, id: &str) -> Result<&'a Property, CompileError> {
        self.schema
            .property(id)
            .ok_or_else(|| CompileError::UnknownProperty {
                schema: self.schema.id.clone(),
                property: id.to_string(),
            })
    }

    fn column_expr(&self, column: &str) -> String {
        match self.qualifier {
            Some(table) => self.dialect.qualify(table, column),
            None => self.dialect.quote_ident(column),
        }
    }
}

/// Compile `filter` for `schema` with unqualified columns.
pub fn compile_filter(
    schema: &Schema,
    filter: &Filter,
    dialect: Dialect,
) -> Result<CompiledPredicate, CompileError> {
    FilterCompiler::new(schema, dialect).compile(filter)
}
