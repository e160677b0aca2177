//! Sorting and paging of list queries.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tabula_core::Schema;

use crate::builder::StatementBuilder;
use crate::error::{CompileError, PaginationError};

/// Direction of an ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = PaginationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(PaginationError::InvalidSortOrder(s.to_string())),
        }
    }
}

/// Sort key, order, limit and offset of a list request.
///
/// A limit of `Some(0)` returns no rows while the total is still counted;
/// `None` means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Paginator {
    key: Option<String>,
    order: SortOrder,
    limit: Option<u64>,
    offset: u64,
}

impl Paginator {
    pub fn builder() -> PaginatorBuilder {
        PaginatorBuilder::default()
    }

    /// Parse `sort_key`, `sort_order`, `limit` and `offset` query parameters.
    /// Absent parameters keep their defaults.
    pub fn from_query(params: &HashMap<String, String>) -> Result<Self, PaginationError> {
        let mut builder = Self::builder();
        if let Some(key) = params.get("sort_key").filter(|k| !k.is_empty()) {
            builder = builder.key(key.clone());
        }
        if let Some(order) = params.get("sort_order").filter(|o| !o.is_empty()) {
            builder = builder.order(order.parse()?);
        }
        if let Some(limit) = params.get("limit") {
            builder = builder.limit(parse_number("limit", limit)?);
        }
        if let Some(offset) = params.get("offset") {
            builder = builder.offset(parse_number("offset", offset)?);
        }
        builder.build()
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Append ORDER BY, LIMIT and OFFSET clauses to `builder`.
    ///
    /// The sort key must be a property of `schema`. Columns are qualified with
    /// `table` when given.
    pub fn write_clauses(
        &self,
        schema: &Schema,
        table: Option<&str>,
        builder: &mut StatementBuilder,
    ) -> Result<(), CompileError> {
        if let Some(key) = &self.key {
            if !schema.has_property(key) {
                return Err(CompileError::UnknownSortKey(key.clone()));
            }
            builder
                .push_sql(" ORDER BY ")
                .push_column(table, key)
                .push_sql(" ")
                .push_sql(self.order.as_sql());
        }

        match (self.limit, self.offset) {
            (Some(limit), _) => {
                builder.push_sql(&format!(" LIMIT {}", limit));
            }
            (None, offset) if offset > 0 => {
                // MySQL and SQLite only accept OFFSET after a LIMIT.
                if let Some(unbounded) = builder.dialect().unbounded_limit() {
                    builder.push_sql(&format!(" LIMIT {}", unbounded));
                }
            }
            (None, _) => {}
        }
        if self.offset > 0 {
            builder.push_sql(&format!(" OFFSET {}", self.offset));
        }
        Ok(())
    }
}

impl fmt::Display for Paginator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "sort={} {}", key, self.order.as_sql())?,
            None => f.write_str("sort=none")?,
        }
        match self.limit {
            Some(limit) => write!(f, " limit={}", limit)?,
            None => f.write_str(" limit=none")?,
        }
        write!(f, " offset={}", self.offset)
    }
}

fn parse_number(param: &'static str, value: &str) -> Result<i64, PaginationError> {
    value
        .trim()
        .parse()
        .map_err(|_| PaginationError::InvalidNumber {
            param,
            value: value.to_string(),
        })
}

/// Builder for [`Paginator`]. Limit and offset are validated on
/// [`build`](Self::build).
#[derive(Debug, Clone, Default)]
pub struct PaginatorBuilder {
    key: Option<String>,
    order: SortOrder,
    limit: Option<i64>,
    offset: i64,
}

impl PaginatorBuilder {
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    pub fn build(self) -> Result<Paginator, PaginationError> {
        let limit = match self.limit {
            Some(limit) if limit < 0 => return Err(PaginationError::NegativeLimit(limit)),
            Some(limit) => Some(limit as u64),
            None => None,
        };
        if self.offset < 0 {
            return Err(PaginationError::NegativeOffset(self.offset));
        }
        Ok(Paginator {
            key: self.key,
            order: self.order,
            limit,
            offset: self.offset as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tabula_core::{Dialect, Property, PropertyKind};

    fn schema() -> Schema {
        Schema::new("test", "tests")
            .with_property(Property::new("id", PropertyKind::String))
            .with_property(Property::new("name", PropertyKind::String))
    }

    fn render(p: &Paginator, dialect: Dialect) -> String {
        let mut b = StatementBuilder::new(dialect);
        p.write_clauses(&schema(), Some("tests"), &mut b).unwrap();
        b.sql().to_string()
    }

    #[test]
    fn test_default_renders_nothing() {
        assert_eq!(render(&Paginator::default(), Dialect::Postgres), "");
    }

    #[test]
    fn test_sort_limit_offset() {
        let p = Paginator::builder()
            .key("name")
            .order(SortOrder::Desc)
            .limit(10)
            .offset(20)
            .build()
            .unwrap();
        assert_eq!(
            render(&p, Dialect::Postgres),
            r#" ORDER BY "tests"."name" DESC LIMIT 10 OFFSET 20"#
        );
    }

    #[test]
    fn test_offset_without_limit() {
        let p = Paginator::builder().offset(5).build().unwrap();
        assert_eq!(render(&p, Dialect::Postgres), " OFFSET 5");
        assert_eq!(
            render(&p, Dialect::Mysql),
            " LIMIT 18446744073709551615 OFFSET 5"
        );
        assert_eq!(render(&p, Dialect::Sqlite), " LIMIT -1 OFFSET 5");
    }

    #[test]
    fn test_zero_limit_is_kept() {
        let p = Paginator::builder().limit(0).build().unwrap();
        assert_eq!(p.limit(), Some(0));
        assert_eq!(render(&p, Dialect::Sqlite), " LIMIT 0");
    }

    #[test]
    fn test_negative_values_rejected() {
        assert_eq!(
            Paginator::builder().limit(-1).build().unwrap_err(),
            PaginationError::NegativeLimit(-1)
        );
        assert_eq!(
            Paginator::builder().offset(-3).build().unwrap_err(),
            PaginationError::NegativeOffset(-3)
        );
    }

    #[test]
    fn test_unknown_sort_key() {
        let p = Paginator::builder().key("missing").build().unwrap();
        let mut b = StatementBuilder::new(Dialect::Postgres);
        let err = p.write_clauses(&schema(), None, &mut b).unwrap_err();
        assert_eq!(err, CompileError::UnknownSortKey("missing".into()));
    }

    #[test]
    fn test_from_query() {
        let params: HashMap<String, String> = [
            ("sort_key", "name"),
            ("sort_order", "DESC"),
            ("limit", "5"),
            ("offset", "2"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let p = Paginator::from_query(&params).unwrap();
        assert_eq!(p.key(), Some("name"));
        assert_eq!(p.order(), SortOrder::Desc);
        assert_eq!(p.limit(), Some(5));
        assert_eq!(p.offset(), 2);
        assert_eq!(p.to_string(), "sort=name DESC limit=5 offset=2");
    }

    #[test]
    fn test_from_query_errors() {
        let params = |k: &str, v: &str| HashMap::from([(k.to_string(), v.to_string())]);
        assert!(matches!(
            Paginator::from_query(&params("limit", "ten")),
            Err(PaginationError::InvalidNumber { param: "limit", .. })
        ));
        assert!(matches!(
            Paginator::from_query(&params("sort_order", "up")),
            Err(PaginationError::InvalidSortOrder(_))
        ));
        assert!(matches!(
            Paginator::from_query(&params("offset", "-1")),
            Err(PaginationError::NegativeOffset(-1))
        ));
    }
}
