//! # tabula-sql
//!
//! SQL generation for Tabula resources. Everything here is pure: functions
//! take schema metadata and return SQL text plus bind parameters.
//!
//! - [`filter`]: raw filter maps and the typed [`Predicate`] tree
//! - [`compiler`]: predicate to parameterized WHERE fragment
//! - [`columns`]: aliased column lists and detail joins
//! - [`ddl`]: CREATE/ALTER TABLE generation and reading DDL back
//! - [`pagination`]: ORDER BY / LIMIT / OFFSET
//!
//! ## Example
//!
//! ```sql
//! -- {"tenant_id": "t1", "__or__": [{"name": "a"}, {"name": {"__search__": "b"}}]}
//! ("name" = $1 OR "name" LIKE $2) AND "tenant_id" = $3
//! ```

pub mod builder;
pub mod columns;
pub mod compiler;
pub mod ddl;
pub mod error;
pub mod filter;
pub mod ledger;
pub mod pagination;
pub mod value;

pub use builder::StatementBuilder;
pub use columns::{JoinSpec, ProjectedColumn, Projection, make_columns};
pub use compiler::{CompiledPredicate, FilterCompiler, compile_filter};
pub use ddl::{AlterStatements, DdlGenerator, TableDefinition};
pub use error::{CompileError, DdlError, PaginationError};
pub use filter::{CompareOp, Filter, FilterValue, Predicate, id_filter, search_field};
pub use pagination::{Paginator, PaginatorBuilder, SortOrder};
pub use value::SqlValue;
