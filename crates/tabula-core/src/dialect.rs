//! SQL dialect surface.
//!
//! Everything backend-specific that the filter compiler, the DDL generator and
//! the transaction layer emit goes through [`Dialect`]: identifier quoting,
//! placeholder syntax, LIKE escaping, lock clauses and default column types.

use serde::{Deserialize, Serialize};

use crate::schema::{IsolationLevel, LockPolicy, PropertyKind};

/// Supported SQL backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgres,
    Mysql,
    Sqlite,
}

/// Escape character used in LIKE patterns on every backend.
pub const LIKE_ESCAPE: char = '\\';

impl Dialect {
    /// Guess the dialect from a connection URL scheme.
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split(':').next()?.to_ascii_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "mysql" | "mariadb" => Some(Self::Mysql),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }

    pub fn quote_char(self) -> char {
        match self {
            Self::Mysql => '`',
            Self::Postgres | Self::Sqlite => '"',
        }
    }

    /// Quote an identifier, doubling any embedded quote character.
    pub fn quote_ident(self, ident: &str) -> String {
        let q = self.quote_char();
        let mut out = String::with_capacity(ident.len() + 2);
        out.push(q);
        for c in ident.chars() {
            if c == q {
                out.push(q);
            }
            out.push(c);
        }
        out.push(q);
        out
    }

    /// `"table"."column"`
    pub fn qualify(self, table: &str, column: &str) -> String {
        format!("{}.{}", self.quote_ident(table), self.quote_ident(column))
    }

    /// Placeholder for the 1-based parameter `index`.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Self::Postgres => format!("${}", index),
            Self::Mysql | Self::Sqlite => "?".to_string(),
        }
    }

    /// Count the placeholders in a statement emitted for this dialect.
    ///
    /// Only meaningful for generated text, where values never appear inline.
    pub fn count_placeholders(self, sql: &str) -> usize {
        match self {
            Self::Postgres => sql
                .as_bytes()
                .windows(2)
                .filter(|w| w[0] == b'$' && w[1].is_ascii_digit())
                .count(),
            Self::Mysql | Self::Sqlite => sql.matches('?').count(),
        }
    }

    /// Suffix appended after a LIKE operand so that [`LIKE_ESCAPE`] is honored.
    /// Postgres and MySQL already default to backslash.
    pub fn like_escape_clause(self) -> &'static str {
        match self {
            Self::Sqlite => " ESCAPE '\\'",
            Self::Postgres | Self::Mysql => "",
        }
    }

    /// Cast an expression to text so LIKE can be applied to non-string columns.
    pub fn text_cast(self, expr: &str) -> String {
        match self {
            Self::Mysql => format!("CAST({} AS CHAR)", expr),
            Self::Postgres | Self::Sqlite => format!("CAST({} AS TEXT)", expr),
        }
    }

    /// Row-locking clause appended to a SELECT, if the backend has one.
    pub fn lock_clause(self, policy: LockPolicy, table: &str) -> Option<String> {
        let clause = match (self, policy) {
            // SQLite locks the whole database on write.
            (_, LockPolicy::NoLock) | (Self::Sqlite, _) => return None,
            (Self::Postgres, LockPolicy::Shared) => {
                format!("FOR SHARE OF {}", self.quote_ident(table))
            }
            (Self::Postgres, LockPolicy::Exclusive) => {
                format!("FOR UPDATE OF {}", self.quote_ident(table))
            }
            (Self::Postgres, LockPolicy::SkipLocked) => {
                format!("FOR UPDATE OF {} SKIP LOCKED", self.quote_ident(table))
            }
            (Self::Mysql, LockPolicy::Shared) => "LOCK IN SHARE MODE".to_string(),
            (Self::Mysql, LockPolicy::Exclusive) => "FOR UPDATE".to_string(),
            (Self::Mysql, LockPolicy::SkipLocked) => "FOR UPDATE SKIP LOCKED".to_string(),
        };
        Some(clause)
    }

    /// Statements opening a transaction at the given isolation level.
    pub fn begin_statements(self, level: IsolationLevel) -> Vec<String> {
        match self {
            Self::Postgres => vec![format!("BEGIN ISOLATION LEVEL {}", level.as_sql())],
            Self::Mysql => vec![
                format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_sql()),
                "START TRANSACTION".to_string(),
            ],
            Self::Sqlite => vec!["BEGIN".to_string()],
        }
    }

    /// Column type used when a property declares no explicit SQL type.
    ///
    /// `keyed` marks columns that take part in a key or index; those need a
    /// bounded string type on MySQL.
    pub fn default_sql_type(self, kind: PropertyKind, keyed: bool) -> &'static str {
        match kind {
            PropertyKind::String if keyed => "varchar(255)",
            PropertyKind::String | PropertyKind::Object | PropertyKind::Array => "text",
            PropertyKind::Integer => "bigint",
            PropertyKind::Boolean => "boolean",
            PropertyKind::Number => match self {
                Self::Postgres => "double precision",
                Self::Mysql => "double",
                Self::Sqlite => "real",
            },
        }
    }

    /// LIMIT value used when only an OFFSET is requested.
    pub fn unbounded_limit(self) -> Option<&'static str> {
        match self {
            Self::Mysql => Some("18446744073709551615"),
            Self::Sqlite => Some("-1"),
            Self::Postgres => None,
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Escape `%`, `_` and the escape character itself so `value` matches
/// literally inside a LIKE pattern.
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 4);
    for c in value.chars() {
        if c == LIKE_ESCAPE || c == '%' || c == '_' {
            out.push(LIKE_ESCAPE);
        }
        out.push(c);
    }
    out
}

/// Substring pattern `%<escaped>%`.
pub fn contains_pattern(value: &str) -> String {
    format!("%{}%", escape_like(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_url() {
        assert_eq!(Dialect::from_url("postgres://u:p@localhost/db"), Some(Dialect::Postgres));
        assert_eq!(Dialect::from_url("postgresql://localhost/db"), Some(Dialect::Postgres));
        assert_eq!(Dialect::from_url("mysql://root@localhost/db"), Some(Dialect::Mysql));
        assert_eq!(Dialect::from_url("sqlite::memory:"), Some(Dialect::Sqlite));
        assert_eq!(Dialect::from_url("redis://localhost"), None);
    }

    #[test]
    fn test_quote_ident_doubles_quotes() {
        assert_eq!(Dialect::Postgres.quote_ident("tests"), "\"tests\"");
        assert_eq!(Dialect::Postgres.quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(Dialect::Mysql.quote_ident("a`b"), "`a``b`");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
        assert_eq!(Dialect::Mysql.placeholder(3), "?");
        assert_eq!(Dialect::Postgres.count_placeholders("a = $1 AND b IN ($2, $3)"), 3);
        assert_eq!(Dialect::Sqlite.count_placeholders("a = ? AND b IN (?, ?)"), 3);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(contains_pattern("123"), "%123%");
        assert_eq!(contains_pattern("\\1%2_3_a\\b%c"), "%\\\\1\\%2\\_3\\_a\\\\b\\%c%");
    }

    #[test]
    fn test_lock_clauses() {
        assert_eq!(Dialect::Postgres.lock_clause(LockPolicy::NoLock, "tests"), None);
        assert_eq!(
            Dialect::Postgres.lock_clause(LockPolicy::Exclusive, "tests").as_deref(),
            Some("FOR UPDATE OF \"tests\"")
        );
        assert_eq!(
            Dialect::Mysql.lock_clause(LockPolicy::Shared, "tests").as_deref(),
            Some("LOCK IN SHARE MODE")
        );
        assert_eq!(Dialect::Sqlite.lock_clause(LockPolicy::SkipLocked, "tests"), None);
    }

    #[test]
    fn test_begin_statements() {
        assert_eq!(
            Dialect::Postgres.begin_statements(IsolationLevel::Serializable),
            vec!["BEGIN ISOLATION LEVEL SERIALIZABLE".to_string()]
        );
        assert_eq!(Dialect::Mysql.begin_statements(IsolationLevel::RepeatableRead).len(), 2);
    }
}
