//! Incremental SQL statement assembly.

use tabula_core::Dialect;

use crate::value::SqlValue;

/// Accumulates SQL text and positional parameters for one statement.
///
/// Placeholders are numbered by the dialect as parameters are pushed, so the
/// parameter list always lines up with the placeholders in the text.
#[derive(Debug, Clone)]
pub struct StatementBuilder {
    dialect: Dialect,
    sql: String,
    params: Vec<SqlValue>,
}

impl StatementBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn push_sql(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Append a quoted identifier.
    pub fn push_ident(&mut self, ident: &str) -> &mut Self {
        let quoted = self.dialect.quote_ident(ident);
        self.sql.push_str(&quoted);
        self
    }

    /// Append `"table"."column"`, or just the quoted column without a table.
    pub fn push_column(&mut self, table: Option<&str>, column: &str) -> &mut Self {
        let expr = match table {
            Some(table) => self.dialect.qualify(table, column),
            None => self.dialect.quote_ident(column),
        };
        self.sql.push_str(&expr);
        self
    }

    /// Bind `value` and append its placeholder.
    pub fn push_param(&mut self, value: SqlValue) -> &mut Self {
        self.params.push(value);
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
        self
    }

    /// Append `items` separated by `sep`, each written by `write`.
    pub fn push_separated<T, E>(
        &mut self,
        items: impl IntoIterator<Item = T>,
        sep: &str,
        mut write: impl FnMut(&mut Self, T) -> Result<(), E>,
    ) -> Result<&mut Self, E> {
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                self.sql.push_str(sep);
            }
            write(self, item)?;
        }
        Ok(self)
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    pub fn finish(self) -> (String, Vec<SqlValue>) {
        (self.sql, self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    #[test]
    fn test_postgres_numbers_placeholders() {
        let mut b = StatementBuilder::new(Dialect::Postgres);
        b.push_sql("SELECT * FROM ")
            .push_ident("tests")
            .push_sql(" WHERE ")
            .push_column(Some("tests"), "a")
            .push_sql(" = ")
            .push_param(SqlValue::Int(1))
            .push_sql(" AND ")
            .push_column(None, "b")
            .push_sql(" = ")
            .push_param("x".into());

        let (sql, params) = b.finish();
        assert_eq!(
            sql,
            r#"SELECT * FROM "tests" WHERE "tests"."a" = $1 AND "b" = $2"#
        );
        assert_eq!(params, vec![SqlValue::Int(1), SqlValue::Text("x".into())]);
    }

    #[test]
    fn test_push_separated() {
        let mut b = StatementBuilder::new(Dialect::Mysql);
        b.push_separated(["a", "b", "c"], ", ", |b, c| {
            b.push_ident(c);
            Ok::<_, Infallible>(())
        })
        .unwrap();
        assert_eq!(b.sql(), "`a`, `b`, `c`");
    }
}
